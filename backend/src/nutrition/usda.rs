use super::{FoodItem, Nutrient, NutritionProvider, ProviderError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_URL: &str = "https://api.nal.usda.gov/fdc/v1/foods/search";

const PAGE_SIZE: u32 = 5;

/// USDA FoodData Central search. Results come back ranked by relevance with
/// nutrients as a name/value/unit list, which maps straight onto `Nutrient`.
pub struct Usda {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl Usda {
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
    foods: Vec<Food>,
}

#[derive(Debug, Deserialize)]
struct Food {
    #[serde(default)]
    description: String,
    #[serde(default, rename = "foodNutrients")]
    food_nutrients: Vec<FoodNutrient>,
}

#[derive(Debug, Deserialize)]
struct FoodNutrient {
    #[serde(rename = "nutrientName")]
    nutrient_name: Option<String>,
    value: Option<f64>,
    #[serde(rename = "unitName")]
    unit_name: Option<String>,
}

impl Food {
    fn into_food_item(self) -> FoodItem {
        let nutrients = self
            .food_nutrients
            .into_iter()
            .filter_map(|n| match (n.nutrient_name, n.value) {
                (Some(name), Some(value)) => Some(Nutrient {
                    name,
                    value,
                    unit: n.unit_name,
                }),
                // Rows missing a name or value are dropped, not guessed at.
                _ => None,
            })
            .collect();
        FoodItem {
            description: if self.description.is_empty() {
                "USDA match".to_string()
            } else {
                self.description
            },
            nutrients,
        }
    }
}

#[async_trait]
impl NutritionProvider for Usda {
    fn name(&self) -> &str {
        "usda"
    }

    async fn search(&self, query: &str) -> Result<Vec<FoodItem>, ProviderError> {
        let page_size = PAGE_SIZE.to_string();
        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("query", query),
                ("api_key", self.api_key.as_str()),
                ("pageSize", page_size.as_str()),
            ])
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
        Ok(body.foods.into_iter().map(Food::into_food_item).collect())
    }
}
