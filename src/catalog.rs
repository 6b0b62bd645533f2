//! Catalog input: categories of exercises and the unique item list derived from them.

use crate::ScraperError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

const DEFAULT_CATALOG: &str = include_str!("../data/default_catalog.json");

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub exercises: Vec<Exercise>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Exercise {
    pub name: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub benefits: Vec<String>,
}

/// A catalog entry that needs one representative image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub category: String,
}

/// Parse catalog JSON, tolerating text around the top-level array.
///
/// Everything from the first `[` to the last `]` is treated as the array.
pub fn parse_catalog(content: &str) -> Result<Vec<Category>, ScraperError> {
    let (start, end) = match (content.find('['), content.rfind(']')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => {
            return Err(ScraperError::Catalog(
                "could not find a JSON array in the catalog".to_string(),
            ))
        }
    };

    serde_json::from_str(&content[start..=end])
        .map_err(|e| ScraperError::Catalog(format!("malformed catalog: {e}")))
}

pub fn default_catalog() -> Result<Vec<Category>, ScraperError> {
    parse_catalog(DEFAULT_CATALOG)
}

/// Load the catalog from `path`, or the embedded catalog when no path is given.
pub async fn load_catalog(path: Option<&Path>) -> Result<Vec<Category>, ScraperError> {
    match path {
        Some(path) => {
            let content = tokio::fs::read_to_string(path).await.map_err(|e| {
                ScraperError::Catalog(format!("cannot read {}: {e}", path.display()))
            })?;
            info!("Loaded catalog from {}", path.display());
            parse_catalog(&content)
        }
        None => {
            info!("No input file provided, using the embedded catalog");
            default_catalog()
        }
    }
}

/// Flatten categories into items, keeping the first occurrence of each name.
pub fn extract_unique_items(catalog: &[Category]) -> Vec<Item> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();

    for category in catalog {
        for exercise in &category.exercises {
            if seen.insert(exercise.name.as_str()) {
                items.push(Item {
                    name: exercise.name.clone(),
                    category: category.name.clone(),
                });
            }
        }
    }

    info!("Found {} unique items to process", items.len());
    items
}
