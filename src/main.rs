use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{web::Data, App, HttpServer};
use dotenv::dotenv;
use log::{error, info};
use tera::Tera;

use profdux_radiology::model::OpenAiClient;
use profdux_radiology::storage::UploadStore;
use profdux_radiology::web::routes;
use profdux_radiology::{AppState, Config};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting ProfDux Radiology");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    let uploads = UploadStore::new(&config.upload_dir);
    if let Err(e) = uploads.ensure_dirs() {
        error!(
            "Failed to create upload directory {}: {}",
            uploads.dir().display(),
            e
        );
        std::process::exit(1);
    }

    // Initialize template engine
    let mut tera = match Tera::new(&config.template_glob) {
        Ok(t) => t,
        Err(e) => {
            error!("Template parsing error: {}", e);
            std::process::exit(1);
        }
    };
    tera.autoescape_on(vec![".html"]);

    let model = Arc::new(OpenAiClient::new(&config.api_base_url, &config.api_key));
    info!(
        "Forwarding to model {} with max_tokens {} and a {}-turn context window",
        config.model, config.max_tokens, config.context_window
    );

    let bind = (config.bind_host.clone(), config.port);

    // Create app state
    let app_state = Data::new(AppState {
        tera,
        model,
        uploads,
        config: config.clone(),
    });

    info!("Listening on {}:{}", bind.0, bind.1);

    // Start web server
    HttpServer::new(move || {
        let config = config.clone();
        App::new()
            .wrap(Logger::default())
            .app_data(app_state.clone())
            .configure(move |cfg| routes::configure(cfg, &config))
    })
    .bind(bind)?
    .run()
    .await
}
