use actix_files as fs;
use actix_multipart::form::tempfile::TempFileConfig;
use actix_multipart::form::MultipartFormConfig;
use actix_web::web;

use crate::config::Config;
use crate::storage::{UploadStore, UPLOADS_ROUTE};
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    let uploads = UploadStore::new(&config.upload_dir);

    // Parse failures are turned into the 500 envelope by the handler itself.
    let form_config = MultipartFormConfig::default().total_limit(config.max_upload_bytes);
    let temp_file_config = TempFileConfig::default().directory(uploads.staging_dir());

    cfg.service(
        web::scope("/api").service(
            web::resource("/analyze")
                .app_data(form_config)
                .app_data(temp_file_config)
                .route(web::post().to(handlers::analyze))
                .default_service(web::to(handlers::method_not_allowed)),
        ),
    )
    .route("/", web::get().to(handlers::index))
    .route("/health", web::get().to(handlers::health_check))
    .service(fs::Files::new(UPLOADS_ROUTE, uploads.dir()))
    .service(fs::Files::new("/static", &config.static_dir));
}
