pub mod calorieninjas;
pub mod usda;

pub use calorieninjas::CalorieNinjas;
pub use usda::Usda;

use crate::config::{AppConfig, ProviderKind};
use async_trait::async_trait;
use foodlens_shared::{ErrorDetail, ErrorKind, NutritionRecord};
use std::sync::Arc;

/// One nutrient as reported upstream, name untouched. Providers disagree on
/// naming ("Energy", "calories", "Total lipid (fat)", ...), so matching
/// happens later against a canonical substring table.
#[derive(Debug, Clone, PartialEq)]
pub struct Nutrient {
    pub name: String,
    pub value: f64,
    pub unit: Option<String>,
}

/// One food match from a provider, already stripped down to the fields the
/// resolver cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct FoodItem {
    pub description: String,
    pub nutrients: Vec<Nutrient>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("nutrition provider rejected the API key")]
    Auth,
    #[error("nutrition provider rate limit exceeded")]
    RateLimited,
    #[error("nutrition provider timed out")]
    Timeout,
    #[error("nutrition provider unreachable: {0}")]
    Unreachable(String),
    #[error("nutrition provider returned HTTP {0}")]
    Status(u16),
    #[error("unexpected nutrition response shape: {0}")]
    Schema(String),
}

impl ProviderError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_connect() {
            ProviderError::Unreachable(err.to_string())
        } else if err.is_decode() {
            ProviderError::Schema(err.to_string())
        } else {
            ProviderError::Unreachable(err.to_string())
        }
    }

    pub fn from_status(status: reqwest::StatusCode) -> Self {
        match status.as_u16() {
            401 | 403 => ProviderError::Auth,
            429 => ProviderError::RateLimited,
            code => ProviderError::Status(code),
        }
    }

    fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Auth => ErrorKind::UpstreamAuth,
            ProviderError::RateLimited => ErrorKind::UpstreamRateLimit,
            ProviderError::Timeout => ErrorKind::UpstreamTimeout,
            ProviderError::Unreachable(_) => ErrorKind::UpstreamUnavailable,
            ProviderError::Status(_) => ErrorKind::UpstreamStatus,
            ProviderError::Schema(_) => ErrorKind::UpstreamStatus,
        }
    }
}

impl From<ProviderError> for ErrorDetail {
    fn from(err: ProviderError) -> Self {
        ErrorDetail::new(err.kind(), err.to_string())
    }
}

/// A nutrition backend that can be searched by food name. The two production
/// implementations (CalorieNinjas and the USDA FoodData Central) are selected
/// by configuration; tests plug in stubs.
#[async_trait]
pub trait NutritionProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> Result<Vec<FoodItem>, ProviderError>;
}

/// Builds the configured provider with the shared timeout and credentials.
pub fn provider_from_config(
    config: &AppConfig,
) -> Result<Arc<dyn NutritionProvider>, reqwest::Error> {
    Ok(match config.provider {
        ProviderKind::CalorieNinjas => Arc::new(CalorieNinjas::new(
            config.api_key.clone(),
            config.calorieninjas_url.clone(),
            config.nutrition_timeout,
        )?),
        ProviderKind::Usda => Arc::new(Usda::new(
            config.api_key.clone(),
            config.usda_url.clone(),
            config.nutrition_timeout,
        )?),
    })
}

/// Orchestrates the lookup: normalize the label, query, fall back to the
/// first word on an empty result, and fold the best match into the canonical
/// record.
pub struct NutritionResolver {
    provider: Arc<dyn NutritionProvider>,
}

impl NutritionResolver {
    pub fn new(provider: Arc<dyn NutritionProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Classifier labels use underscores ("fried_rice"); providers expect
    /// plain words. Also collapses stray whitespace.
    pub fn normalize_label(label: &str) -> String {
        label
            .replace('_', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn resolve(&self, label: &str) -> Result<NutritionRecord, ErrorDetail> {
        let normalized = Self::normalize_label(label);
        if normalized.is_empty() {
            return Err(ErrorDetail::new(
                ErrorKind::NotFound,
                "empty food label",
            ));
        }

        let mut items = self.provider.search(&normalized).await.map_err(ErrorDetail::from)?;

        if items.is_empty() {
            // Compound labels like "grilled cheese sandwich" often miss;
            // retry exactly once with the first word.
            if let Some(first_word) = normalized
                .split(' ')
                .next()
                .filter(|word| *word != normalized)
            {
                log::info!(
                    "no match for {:?} on {}, retrying with {:?}",
                    normalized,
                    self.provider.name(),
                    first_word
                );
                items = self
                    .provider
                    .search(first_word)
                    .await
                    .map_err(ErrorDetail::from)?;
            }
        }

        match items.into_iter().next() {
            Some(item) => Ok(map_nutrients(&item)),
            None => Err(ErrorDetail::new(
                ErrorKind::NotFound,
                format!("no nutrition data found for {normalized:?}"),
            )
            .with_searched_term(normalized)
            .with_suggestion("try retaking the photo with the food centered and well lit")),
        }
    }
}

/// Canonical nutrient mapping. Needles are matched as case-insensitive
/// substrings, in priority order, because providers never agree on exact
/// field names. A nutrient nobody reports stays `None`.
pub fn map_nutrients(item: &FoodItem) -> NutritionRecord {
    NutritionRecord {
        calories: pick_energy(&item.nutrients),
        protein_g: pick(&item.nutrients, &["protein"]),
        carbs_g: pick(&item.nutrients, &["carbohydrate", "carbs"]),
        fat_g: pick(&item.nutrients, &["lipid", "fat"]),
        fiber_g: pick(&item.nutrients, &["fiber", "fibre"]),
        sugar_g: pick(&item.nutrients, &["sugar"]),
        sodium_mg: pick(&item.nutrients, &["sodium"]),
        source: item.description.clone(),
    }
}

fn pick(nutrients: &[Nutrient], needles: &[&str]) -> Option<f64> {
    needles.iter().find_map(|needle| {
        nutrients
            .iter()
            .find(|n| n.name.to_lowercase().contains(needle))
            .map(|n| n.value)
    })
}

fn pick_energy(nutrients: &[Nutrient]) -> Option<f64> {
    let is_energy = |n: &&Nutrient| {
        let name = n.name.to_lowercase();
        name.contains("energy") || name.contains("calorie")
    };
    // USDA reports both kcal and kJ rows under "Energy"; prefer kcal and
    // never report a kJ figure as calories.
    nutrients
        .iter()
        .filter(is_energy)
        .find(|n| {
            n.unit
                .as_deref()
                .is_some_and(|u| u.eq_ignore_ascii_case("kcal"))
        })
        .or_else(|| {
            nutrients.iter().filter(is_energy).find(|n| {
                !n.unit
                    .as_deref()
                    .is_some_and(|u| u.to_lowercase().contains("kj"))
            })
        })
        .map(|n| n.value)
}
