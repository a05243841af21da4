//! Request/response types for catalog endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// A catalog product joined with its inventory row, when it has one.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Product {
    pub id: Uuid,
    pub code: String,
    pub images: Vec<String>,
    pub title: String,
    pub description: Option<String>,
    pub stock: Option<i64>,
    pub price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `POST /product` and `PUT /product/{id}`.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Default)]
pub struct ProductInput {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
}

impl ProductInput {
    /// Trim text fields and drop blank images and descriptions.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            code: self.code.trim().to_string(),
            images: self
                .images
                .into_iter()
                .map(|image| image.trim().to_string())
                .filter(|image| !image.is_empty())
                .collect(),
            title: self.title.trim().to_string(),
            description: self
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        }
    }

    /// Name of the first missing required field.
    #[must_use]
    pub fn missing_field(&self) -> Option<&'static str> {
        if self.code.is_empty() {
            Some("code")
        } else if self.title.is_empty() {
            Some("title")
        } else {
            None
        }
    }
}
