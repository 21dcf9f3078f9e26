use crate::config::AppConfig;
use crate::pipeline::{ImageInput, Pipeline};
use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use foodlens_shared::{ErrorDetail, ErrorKind, HealthStatus, ResultEnvelope};
use futures::{StreamExt, TryStreamExt};
use log::info;
use uuid::Uuid;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/analyze").route(web::post().to(handle_analyze)))
        .service(web::resource("/api/health").route(web::get().to(handle_health)));
}

async fn handle_analyze(
    pipeline: web::Data<Pipeline>,
    config: web::Data<AppConfig>,
    mut payload: Multipart,
) -> HttpResponse {
    let request_id = Uuid::new_v4();

    let mut upload: Option<ImageInput> = None;
    while let Ok(Some(mut field)) = payload.try_next().await {
        let content_type = field
            .content_type()
            .map(|mime| mime.to_string())
            .unwrap_or_default();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let data = match chunk {
                Ok(data) => data,
                Err(e) => {
                    return envelope_response(ResultEnvelope::failure(ErrorDetail::new(
                        ErrorKind::Validation,
                        format!("failed to read upload: {e}"),
                    )));
                }
            };
            if bytes.len() + data.len() > config.max_upload_bytes {
                return envelope_response(ResultEnvelope::failure(
                    ErrorDetail::new(
                        ErrorKind::Validation,
                        format!(
                            "image exceeds the {} byte upload limit",
                            config.max_upload_bytes
                        ),
                    )
                    .with_suggestion("compress or downscale the photo before uploading"),
                ));
            }
            bytes.extend_from_slice(&data);
        }

        if !bytes.is_empty() {
            upload = Some(ImageInput::new(bytes, content_type));
            break;
        }
    }

    let Some(input) = upload else {
        return envelope_response(ResultEnvelope::failure(
            ErrorDetail::new(ErrorKind::Validation, "no image file in request")
                .with_suggestion("send the photo as a multipart form field"),
        ));
    };

    info!(
        "request {}: {} byte upload ({})",
        request_id, input.declared_len, input.content_type
    );

    envelope_response(pipeline.analyze(input).await)
}

/// Every outcome is the same envelope; only the status code varies. A
/// response that carries a prediction is a success even when the nutrition
/// slot holds an error.
fn envelope_response(envelope: ResultEnvelope) -> HttpResponse {
    let status = if envelope.predicted_food.is_some() {
        StatusCode::OK
    } else {
        match envelope.nutrition.error().map(|e| e.kind) {
            Some(ErrorKind::Validation) | Some(ErrorKind::Decode) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    };
    HttpResponse::build(status).json(envelope)
}

async fn handle_health(
    pipeline: web::Data<Pipeline>,
    config: web::Data<AppConfig>,
) -> HttpResponse {
    let status = HealthStatus {
        model_loaded: pipeline.classifier().is_loaded(),
        nutrition_provider: config.provider.to_string(),
        nutrition_configured: !config.api_key.is_empty(),
    };
    if status.model_loaded {
        HttpResponse::Ok().json(status)
    } else {
        HttpResponse::ServiceUnavailable().json(status)
    }
}
