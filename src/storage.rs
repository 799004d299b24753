//! Public upload directory.
//!
//! Multipart temp files are staged in a hidden directory next to the uploads so
//! relocation is normally a plain rename. When the rename fails the file is
//! copied instead, and the temp file is deleted whether or not the copy works.
//! Names are claimed without overwriting, so a taken name moves the suffix on.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};
use tempfile::NamedTempFile;

/// URL prefix the upload directory is served under.
pub const UPLOADS_ROUTE: &str = "/uploads";

const STAGING_DIR: &str = ".incoming";
const DEFAULT_EXTENSION: &str = ".jpg";

#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUpload {
    pub file_name: String,
    pub path: PathBuf,
}

impl UploadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where in-flight multipart temp files are written.
    pub fn staging_dir(&self) -> PathBuf {
        self.dir.join(STAGING_DIR)
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::create_dir_all(self.staging_dir())
    }

    /// Moves a received temp file to `upload-<unix-ms><ext>` in the upload directory.
    pub fn relocate(&self, temp: NamedTempFile, original_name: Option<&str>) -> io::Result<StoredUpload> {
        let extension = upload_extension(original_name);
        let stored = self.claim(temp, &extension, unix_millis())?;
        info!("Stored upload {}", stored.path.display());
        Ok(stored)
    }

    /// Renames `temp` to the first free name at or after `millis`. Existing
    /// files are never overwritten.
    fn claim(&self, mut temp: NamedTempFile, extension: &str, mut millis: u128) -> io::Result<StoredUpload> {
        loop {
            let (file_name, path) = self.candidate(extension, millis);
            match temp.persist_noclobber(&path) {
                Ok(_) => return Ok(StoredUpload { file_name, path }),
                Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => {
                    temp = err.file;
                    millis += 1;
                }
                Err(err) => {
                    debug!("rename into {} failed ({}), copying instead", path.display(), err.error);
                    return self.copy_in(err.file, extension, millis);
                }
            }
        }
    }

    /// Copies `temp` into a newly created file, then deletes `temp`. The temp
    /// file is also deleted on every error path, when it is dropped.
    fn copy_in(&self, temp: NamedTempFile, extension: &str, mut millis: u128) -> io::Result<StoredUpload> {
        loop {
            let (file_name, path) = self.candidate(extension, millis);
            let mut dest = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(dest) => dest,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    millis += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let copied = File::open(temp.path()).and_then(|mut src| io::copy(&mut src, &mut dest));
            if let Err(e) = copied {
                let _ = fs::remove_file(&path);
                return Err(e);
            }
            temp.close()?;
            return Ok(StoredUpload { file_name, path });
        }
    }

    fn candidate(&self, extension: &str, millis: u128) -> (String, PathBuf) {
        let file_name = format!("upload-{}{}", millis, extension);
        let path = self.dir.join(&file_name);
        (file_name, path)
    }
}

/// Extension (with leading dot) kept from the client's file name.
pub fn upload_extension(original_name: Option<&str>) -> String {
    let Some(name) = original_name.filter(|name| !name.is_empty()) else {
        return DEFAULT_EXTENSION.to_string();
    };

    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default()
}

/// Absolute URL under which a stored upload is served.
pub fn public_url(scheme: &str, host: &str, file_name: &str) -> String {
    format!("{}://{}{}/{}", scheme, host, UPLOADS_ROUTE, file_name)
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}
