use std::sync::Arc;

use tera::Tera;

use crate::config::Config;
use crate::model::CompletionBackend;
use crate::storage::UploadStore;

// App state structure
pub struct AppState {
    pub tera: Tera,
    pub model: Arc<dyn CompletionBackend>,
    pub uploads: UploadStore,
    pub config: Config,
}
