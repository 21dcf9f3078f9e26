use clap::Parser;
use foodlens_backend::config::{AppConfig, ModelConfig};
use foodlens_backend::nutrition::{NutritionResolver, provider_from_config};
use foodlens_backend::pipeline::{ImageInput, ModelManager, Pipeline, Validator};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Classify a food photo and print its nutrition facts as JSON.
#[derive(Parser)]
#[command(name = "analyze", version)]
struct Args {
    /// Path to a JPEG, PNG or WebP photo
    image: PathBuf,
}

fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));
    dotenv::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::from_env()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let model_config = ModelConfig::load(&config.model_config_path)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;

    let manager = Arc::new(ModelManager::new(model_config));
    if let Err(e) = manager.ensure_loaded() {
        eprintln!("model loading failed: {}", e.message);
        std::process::exit(1);
    }

    let provider = provider_from_config(&config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let pipeline = Pipeline::new(
        Validator::new(
            config.max_upload_bytes,
            config.max_dimension,
            config.min_dimension,
        ),
        manager,
        NutritionResolver::new(provider),
        config.confidence_threshold,
    );

    let bytes = std::fs::read(&args.image)?;
    let input = ImageInput::new(bytes, content_type_for(&args.image));

    let envelope = pipeline.analyze(input).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&envelope).unwrap_or_else(|_| "{}".to_string())
    );

    if envelope.predicted_food.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
