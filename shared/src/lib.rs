use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Failure taxonomy shared by every stage of the analysis pipeline.
#[derive(Serialize, Deserialize, Display, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    Validation,
    Decode,
    Inference,
    UpstreamAuth,
    UpstreamRateLimit,
    UpstreamTimeout,
    UpstreamUnavailable,
    UpstreamStatus,
    NotFound,
    Unexpected,
}

/// A typed, caller-facing failure. No raw error ever crosses the API
/// boundary; everything is folded into one of these.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub searched_term: Option<String>,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            suggestion: None,
            searched_term: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_searched_term(mut self, term: impl Into<String>) -> Self {
        self.searched_term = Some(term.into());
        self
    }
}

/// Canonical nutrition facts for a single food match. Every nutrient is
/// optional: `None` means the upstream source did not report it, which is
/// distinct from a reported zero.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct NutritionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sugar_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sodium_mg: Option<f64>,
    pub source: String,
}

/// Either a resolved nutrition record or the error that stopped the lookup.
/// Serialized untagged so callers see `{"calories": ...}` on success and
/// `{"error": {...}}` on failure.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum NutritionOutcome {
    Resolved(NutritionRecord),
    Failed { error: ErrorDetail },
}

impl NutritionOutcome {
    pub fn record(&self) -> Option<&NutritionRecord> {
        match self {
            NutritionOutcome::Resolved(record) => Some(record),
            NutritionOutcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorDetail> {
        match self {
            NutritionOutcome::Resolved(_) => None,
            NutritionOutcome::Failed { error } => Some(error),
        }
    }
}

/// The single response shape for every analysis request. Success,
/// low-confidence, and hard failure all use this envelope, so callers only
/// ever parse one schema.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResultEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_food: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub nutrition: NutritionOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inference_time_ms: Option<u64>,
}

impl ResultEnvelope {
    /// Classification and nutrition lookup both succeeded.
    pub fn resolved(
        food: impl Into<String>,
        confidence: f32,
        record: NutritionRecord,
        inference_time_ms: u64,
    ) -> Self {
        Self {
            predicted_food: Some(food.into()),
            confidence: Some(confidence),
            nutrition: NutritionOutcome::Resolved(record),
            warning: None,
            inference_time_ms: Some(inference_time_ms),
        }
    }

    /// Classification succeeded but the nutrition lookup did not. Still a
    /// successful response from the caller's point of view.
    pub fn partial(
        food: impl Into<String>,
        confidence: f32,
        error: ErrorDetail,
        inference_time_ms: u64,
    ) -> Self {
        Self {
            predicted_food: Some(food.into()),
            confidence: Some(confidence),
            nutrition: NutritionOutcome::Failed { error },
            warning: None,
            inference_time_ms: Some(inference_time_ms),
        }
    }

    /// Classification succeeded below the confidence gate; enrichment was
    /// skipped entirely.
    pub fn low_confidence(
        food: impl Into<String>,
        confidence: f32,
        error: ErrorDetail,
        inference_time_ms: u64,
    ) -> Self {
        Self {
            predicted_food: Some(food.into()),
            confidence: Some(confidence),
            nutrition: NutritionOutcome::Failed { error },
            warning: Some("low-confidence prediction; nutrition lookup skipped".to_string()),
            inference_time_ms: Some(inference_time_ms),
        }
    }

    /// The pipeline stopped before producing a prediction.
    pub fn failure(error: ErrorDetail) -> Self {
        Self {
            predicted_food: None,
            confidence: None,
            nutrition: NutritionOutcome::Failed { error },
            warning: None,
            inference_time_ms: None,
        }
    }
}

/// Readiness report for the health endpoint.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthStatus {
    pub model_loaded: bool,
    pub nutrition_provider: String,
    pub nutrition_configured: bool,
}
