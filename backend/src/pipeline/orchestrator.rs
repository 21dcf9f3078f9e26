use super::{Classifier, ImageInput, Validator};
use crate::nutrition::NutritionResolver;
use foodlens_shared::{ErrorDetail, ErrorKind, ResultEnvelope};
use std::sync::Arc;

pub const LOW_CONFIDENCE_MESSAGE: &str = "skipped due to low confidence";

/// Sequences the pipeline: validate, classify, gate on confidence, enrich.
/// Classification failures end the request; nutrition failures do not — a
/// classified food with a failed lookup is still a successful response.
pub struct Pipeline {
    validator: Validator,
    classifier: Arc<dyn Classifier>,
    resolver: NutritionResolver,
    confidence_threshold: f32,
}

impl Pipeline {
    pub fn new(
        validator: Validator,
        classifier: Arc<dyn Classifier>,
        resolver: NutritionResolver,
        confidence_threshold: f32,
    ) -> Self {
        Self {
            validator,
            classifier,
            resolver,
            confidence_threshold,
        }
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    pub async fn analyze(&self, input: ImageInput) -> ResultEnvelope {
        let validator = self.validator.clone();
        let classifier = Arc::clone(&self.classifier);

        // Decode and inference are CPU-bound; keep them off the executor.
        let classified = tokio::task::spawn_blocking(move || {
            let decoded = validator.validate(&input)?;
            classifier.classify(&decoded)
        })
        .await;

        let prediction = match classified {
            Ok(Ok(prediction)) => prediction,
            Ok(Err(detail)) => return ResultEnvelope::failure(detail),
            Err(join_error) => {
                log::error!("pipeline worker failed: {join_error}");
                return ResultEnvelope::failure(ErrorDetail::new(
                    ErrorKind::Unexpected,
                    "internal pipeline failure",
                ));
            }
        };

        let inference_ms = prediction.duration.as_millis() as u64;
        log::info!(
            "classified {:?} with confidence {:.3} in {}ms",
            prediction.label,
            prediction.confidence,
            inference_ms
        );

        if prediction.confidence < self.confidence_threshold {
            let detail = ErrorDetail::new(ErrorKind::NotFound, LOW_CONFIDENCE_MESSAGE);
            return ResultEnvelope::low_confidence(
                prediction.label,
                prediction.confidence,
                detail,
                inference_ms,
            );
        }

        match self.resolver.resolve(&prediction.label).await {
            Ok(record) => ResultEnvelope::resolved(
                prediction.label,
                prediction.confidence,
                record,
                inference_ms,
            ),
            Err(detail) => {
                log::warn!(
                    "nutrition lookup for {:?} failed: {}",
                    prediction.label,
                    detail.message
                );
                ResultEnvelope::partial(
                    prediction.label,
                    prediction.confidence,
                    detail,
                    inference_ms,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::{FoodItem, Nutrient, NutritionProvider, ProviderError};
    use crate::pipeline::{DecodedImage, Prediction};
    use async_trait::async_trait;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;

    struct StubClassifier {
        label: &'static str,
        confidence: f32,
    }

    impl Classifier for StubClassifier {
        fn classify(&self, _image: &DecodedImage) -> Result<Prediction, ErrorDetail> {
            Ok(Prediction {
                label: self.label.to_string(),
                confidence: self.confidence,
                duration: Duration::from_millis(5),
            })
        }

        fn is_loaded(&self) -> bool {
            true
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(&self, _image: &DecodedImage) -> Result<Prediction, ErrorDetail> {
            Err(ErrorDetail::new(ErrorKind::Inference, "inference failed"))
        }

        fn is_loaded(&self) -> bool {
            true
        }
    }

    struct StubProvider {
        responses: Mutex<Vec<Result<Vec<FoodItem>, ProviderError>>>,
        queries: Mutex<Vec<String>>,
    }

    impl StubProvider {
        fn new(responses: Vec<Result<Vec<FoodItem>, ProviderError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                queries: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NutritionProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn search(&self, query: &str) -> Result<Vec<FoodItem>, ProviderError> {
            self.queries.lock().unwrap().push(query.to_string());
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                Ok(Vec::new())
            } else {
                responses.remove(0)
            }
        }
    }

    fn pizza_item() -> FoodItem {
        FoodItem {
            description: "Pizza, cheese, regular crust".to_string(),
            nutrients: vec![
                Nutrient {
                    name: "Energy".into(),
                    value: 266.0,
                    unit: Some("kcal".into()),
                },
                Nutrient {
                    name: "Protein".into(),
                    value: 11.4,
                    unit: Some("g".into()),
                },
                Nutrient {
                    name: "Carbohydrate, by difference".into(),
                    value: 33.3,
                    unit: Some("g".into()),
                },
                Nutrient {
                    name: "Total lipid (fat)".into(),
                    value: 9.8,
                    unit: Some("g".into()),
                },
            ],
        }
    }

    fn jpeg_input() -> ImageInput {
        let img = RgbImage::from_pixel(320, 240, Rgb([180u8, 120, 60]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, ImageFormat::Jpeg)
            .unwrap();
        ImageInput::new(buf.into_inner(), "image/jpeg")
    }

    fn pipeline_with(
        classifier: Arc<dyn Classifier>,
        provider: Arc<StubProvider>,
    ) -> Pipeline {
        Pipeline::new(
            Validator::new(10 * 1024 * 1024, 2000, 50),
            classifier,
            NutritionResolver::new(provider),
            0.30,
        )
    }

    #[actix_web::test]
    async fn full_round_trip_produces_resolved_envelope() {
        let provider = Arc::new(StubProvider::new(vec![Ok(vec![pizza_item()])]));
        let pipeline = pipeline_with(
            Arc::new(StubClassifier {
                label: "pizza",
                confidence: 0.9,
            }),
            Arc::clone(&provider),
        );

        let envelope = pipeline.analyze(jpeg_input()).await;
        assert_eq!(envelope.predicted_food.as_deref(), Some("pizza"));
        assert_eq!(envelope.confidence, Some(0.9));
        let record = envelope.nutrition.record().expect("nutrition resolved");
        assert_eq!(record.calories, Some(266.0));
        assert_eq!(record.protein_g, Some(11.4));
        assert_eq!(record.carbs_g, Some(33.3));
        assert_eq!(record.fat_g, Some(9.8));
        assert_eq!(record.fiber_g, None);
        assert_eq!(provider.queries.lock().unwrap().as_slice(), ["pizza"]);
    }

    #[actix_web::test]
    async fn confidence_at_threshold_proceeds_to_enrichment() {
        let provider = Arc::new(StubProvider::new(vec![Ok(vec![pizza_item()])]));
        let pipeline = pipeline_with(
            Arc::new(StubClassifier {
                label: "pizza",
                confidence: 0.30,
            }),
            Arc::clone(&provider),
        );

        let envelope = pipeline.analyze(jpeg_input()).await;
        assert!(envelope.warning.is_none());
        assert!(envelope.nutrition.record().is_some());
        assert_eq!(provider.queries.lock().unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn confidence_below_threshold_skips_enrichment() {
        let provider = Arc::new(StubProvider::new(vec![Ok(vec![pizza_item()])]));
        let pipeline = pipeline_with(
            Arc::new(StubClassifier {
                label: "pizza",
                confidence: 0.29,
            }),
            Arc::clone(&provider),
        );

        let envelope = pipeline.analyze(jpeg_input()).await;
        assert_eq!(envelope.predicted_food.as_deref(), Some("pizza"));
        assert!(envelope.warning.is_some());
        let error = envelope.nutrition.error().expect("nutrition skipped");
        assert_eq!(error.kind, ErrorKind::NotFound);
        assert_eq!(error.message, LOW_CONFIDENCE_MESSAGE);
        assert!(provider.queries.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn nutrition_failure_keeps_classification_success() {
        let provider = Arc::new(StubProvider::new(vec![Err(ProviderError::RateLimited)]));
        let pipeline = pipeline_with(
            Arc::new(StubClassifier {
                label: "sushi",
                confidence: 0.8,
            }),
            provider,
        );

        let envelope = pipeline.analyze(jpeg_input()).await;
        assert_eq!(envelope.predicted_food.as_deref(), Some("sushi"));
        assert_eq!(
            envelope.nutrition.error().map(|e| e.kind),
            Some(ErrorKind::UpstreamRateLimit)
        );
    }

    #[actix_web::test]
    async fn validation_failure_stops_before_inference() {
        let provider = Arc::new(StubProvider::new(Vec::new()));
        let pipeline = pipeline_with(Arc::new(FailingClassifier), Arc::clone(&provider));

        let tiny = {
            let img = RgbImage::from_pixel(10, 10, Rgb([0u8, 0, 0]));
            let mut buf = Cursor::new(Vec::new());
            image::DynamicImage::ImageRgb8(img)
                .write_to(&mut buf, ImageFormat::Png)
                .unwrap();
            ImageInput::new(buf.into_inner(), "image/png")
        };

        let envelope = pipeline.analyze(tiny).await;
        assert!(envelope.predicted_food.is_none());
        assert_eq!(
            envelope.nutrition.error().map(|e| e.kind),
            Some(ErrorKind::Validation)
        );
        assert!(provider.queries.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn inference_failure_produces_failure_envelope() {
        let provider = Arc::new(StubProvider::new(Vec::new()));
        let pipeline = pipeline_with(Arc::new(FailingClassifier), provider);

        let envelope = pipeline.analyze(jpeg_input()).await;
        assert!(envelope.predicted_food.is_none());
        assert_eq!(
            envelope.nutrition.error().map(|e| e.kind),
            Some(ErrorKind::Inference)
        );
    }
}
