use super::{FoodItem, Nutrient, NutritionProvider, ProviderError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_URL: &str = "https://api.calorieninjas.com/v1/nutrition";

/// CalorieNinjas nutrition search. Returns per-100g figures as a flat object
/// per item; the field names are flattened into `Nutrient` entries so the
/// canonical mapping treats both providers alike.
pub struct CalorieNinjas {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CalorieNinjas {
    pub fn new(
        api_key: String,
        base_url: String,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Default, Deserialize)]
struct Item {
    #[serde(default)]
    name: String,
    calories: Option<f64>,
    fat_total_g: Option<f64>,
    fat_saturated_g: Option<f64>,
    protein_g: Option<f64>,
    sodium_mg: Option<f64>,
    potassium_mg: Option<f64>,
    cholesterol_mg: Option<f64>,
    carbohydrates_total_g: Option<f64>,
    fiber_g: Option<f64>,
    sugar_g: Option<f64>,
}

impl Item {
    fn into_food_item(self) -> FoodItem {
        let mut nutrients = Vec::new();
        let fields: [(&str, Option<&str>, Option<f64>); 10] = [
            ("calories", Some("kcal"), self.calories),
            ("fat_total_g", Some("g"), self.fat_total_g),
            ("fat_saturated_g", Some("g"), self.fat_saturated_g),
            ("protein_g", Some("g"), self.protein_g),
            ("sodium_mg", Some("mg"), self.sodium_mg),
            ("potassium_mg", Some("mg"), self.potassium_mg),
            ("cholesterol_mg", Some("mg"), self.cholesterol_mg),
            ("carbohydrates_total_g", Some("g"), self.carbohydrates_total_g),
            ("fiber_g", Some("g"), self.fiber_g),
            ("sugar_g", Some("g"), self.sugar_g),
        ];
        for (name, unit, value) in fields {
            if let Some(value) = value {
                nutrients.push(Nutrient {
                    name: name.to_string(),
                    value,
                    unit: unit.map(str::to_string),
                });
            }
        }
        FoodItem {
            description: if self.name.is_empty() {
                "CalorieNinjas match".to_string()
            } else {
                self.name
            },
            nutrients,
        }
    }
}

#[async_trait]
impl NutritionProvider for CalorieNinjas {
    fn name(&self) -> &str {
        "calorieninjas"
    }

    async fn search(&self, query: &str) -> Result<Vec<FoodItem>, ProviderError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("query", query)])
            .header("X-Api-Key", &self.api_key)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::from_status(status));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Schema(e.to_string()))?;
        Ok(body.items.into_iter().map(Item::into_food_item).collect())
    }
}
