use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use foodlens_backend::config::{AppConfig, ModelConfig};
use foodlens_backend::nutrition::{NutritionResolver, provider_from_config};
use foodlens_backend::pipeline::{ModelManager, Pipeline, Validator};
use foodlens_backend::routes::configure_routes;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("configuration error: {e}");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                e.to_string(),
            ));
        }
    };

    let model_config = match ModelConfig::load(&config.model_config_path) {
        Ok(model_config) => model_config,
        Err(e) => {
            log::error!("model configuration error: {e}");
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                e.to_string(),
            ));
        }
    };

    // Eager load: a server that cannot classify must not come up.
    let manager = Arc::new(ModelManager::new(model_config));
    if let Err(e) = manager.ensure_loaded() {
        log::error!("failed to preload model at startup: {}", e.message);
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("model loading failed: {}", e.message),
        ));
    }

    let provider = match provider_from_config(&config) {
        Ok(provider) => provider,
        Err(e) => {
            log::error!("failed to build nutrition client: {e}");
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                e.to_string(),
            ));
        }
    };
    log::info!(
        "nutrition provider: {} (timeout {:?})",
        config.provider,
        config.nutrition_timeout
    );

    let pipeline = web::Data::new(Pipeline::new(
        Validator::new(
            config.max_upload_bytes,
            config.max_dimension,
            config.min_dimension,
        ),
        manager,
        NutritionResolver::new(provider),
        config.confidence_threshold,
    ));
    let config_data = web::Data::new(config.clone());

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(pipeline.clone())
            .app_data(config_data.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
