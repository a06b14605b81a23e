use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{errors::AppError, store::Document};

// Policy value for a tour nobody has rated yet
pub const DEFAULT_RATINGS_AVERAGE: f64 = 4.5;

pub const RATINGS_COUNT_FIELD: &str = "ratingsCount";
pub const RATINGS_AVERAGE_FIELD: &str = "ratingsAverage";
pub const START_DATES_FIELD: &str = "startDates";

// Filter fields that may be repeated in a query string to match any of the values
pub const REPEATABLE_FILTER_FIELDS: [&str; 6] = [
    "duration",
    RATINGS_AVERAGE_FIELD,
    RATINGS_COUNT_FIELD,
    "maxGroupSize",
    "difficulty",
    "price",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Difficult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tour {
    pub id: Uuid,
    pub name: String,
    pub duration: u32,
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    // Empty lists are stored as null or not at all
    #[serde(
        default,
        deserialize_with = "nullable_dates",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub start_dates: Vec<DateTime<Utc>>,
    pub ratings_count: u64,
    pub ratings_average: f64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "__v", default)]
    pub version: u64,
}

impl Tour {
    pub fn from_document(doc: Document) -> Result<Self, AppError> {
        serde_json::from_value(Value::Object(doc))
            .map_err(|e| AppError::Deserialization(format!("Invalid tour document: {}", e)))
    }

    pub fn to_document(&self) -> Result<Document, AppError> {
        to_document(self)
    }

    pub fn ratings(&self) -> RatingsSummary {
        RatingsSummary {
            ratings_count: self.ratings_count,
            ratings_average: self.ratings_average,
        }
    }
}

// The denormalized review summary; only AggregateSync writes it
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingsSummary {
    pub ratings_count: u64,
    pub ratings_average: f64,
}

impl RatingsSummary {
    pub fn unrated() -> Self {
        Self {
            ratings_count: 0,
            ratings_average: DEFAULT_RATINGS_AVERAGE,
        }
    }

    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        doc.insert(RATINGS_COUNT_FIELD.into(), Value::from(self.ratings_count));
        doc.insert(RATINGS_AVERAGE_FIELD.into(), Value::from(self.ratings_average));
        doc
    }
}

impl Default for RatingsSummary {
    fn default() -> Self {
        Self::unrated()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTour {
    pub name: String,
    pub duration: u32,
    pub max_group_size: u32,
    pub difficulty: Difficulty,
    pub price: f64,
    pub price_discount: Option<f64>,
    pub summary: String,
    pub description: Option<String>,
    #[serde(default)]
    pub start_dates: Vec<DateTime<Utc>>,
}

impl NewTour {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_name(&self.name)?;
        if self.duration == 0 {
            return Err(AppError::BadRequest("A tour must have a duration".into()));
        }
        if self.max_group_size == 0 {
            return Err(AppError::BadRequest("A tour must have a group size".into()));
        }
        validate_price(self.price, self.price_discount)?;
        if self.summary.trim().is_empty() {
            return Err(AppError::BadRequest("A tour must have a summary".into()));
        }
        Ok(())
    }

    pub fn into_tour(self) -> Tour {
        Tour {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            duration: self.duration,
            max_group_size: self.max_group_size,
            difficulty: self.difficulty,
            price: self.price,
            price_discount: self.price_discount,
            summary: self.summary.trim().to_string(),
            description: self.description.map(|d| d.trim().to_string()),
            start_dates: self.start_dates,
            ratings_count: 0,
            ratings_average: DEFAULT_RATINGS_AVERAGE,
            created_at: Utc::now(),
            version: 0,
        }
    }
}

// Partial update. No rating fields: unknown keys are dropped on deserialize.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TourPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_group_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub difficulty: Option<Difficulty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_discount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_dates: Option<Vec<DateTime<Utc>>>,
}

impl TourPatch {
    pub fn validate(&self, current: &Tour) -> Result<(), AppError> {
        if let Some(name) = &self.name {
            validate_name(name)?;
        }
        if self.duration == Some(0) || self.max_group_size == Some(0) {
            return Err(AppError::BadRequest(
                "Duration and group size must be positive".into(),
            ));
        }
        if let Some(summary) = &self.summary {
            if summary.trim().is_empty() {
                return Err(AppError::BadRequest("A tour must have a summary".into()));
            }
        }
        let price = self.price.unwrap_or(current.price);
        let discount = self.price_discount.or(current.price_discount);
        validate_price(price, discount)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.duration.is_none()
            && self.max_group_size.is_none()
            && self.difficulty.is_none()
            && self.price.is_none()
            && self.price_discount.is_none()
            && self.summary.is_none()
            && self.description.is_none()
            && self.start_dates.is_none()
    }

    pub fn to_document(&self) -> Result<Document, AppError> {
        let mut doc = to_document(self)?;
        if self.start_dates.as_ref().is_some_and(Vec::is_empty) {
            doc.insert(START_DATES_FIELD.to_string(), Value::Null);
        }
        Ok(doc)
    }
}

fn nullable_dates<'de, D>(deserializer: D) -> Result<Vec<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<DateTime<Utc>>>::deserialize(deserializer)?.unwrap_or_default())
}

fn validate_name(name: &str) -> Result<(), AppError> {
    let len = name.trim().chars().count();
    if !(10..=40).contains(&len) {
        return Err(AppError::BadRequest(
            "A tour name must have between 10 and 40 characters".into(),
        ));
    }
    Ok(())
}

fn validate_price(price: f64, discount: Option<f64>) -> Result<(), AppError> {
    if !price.is_finite() || price < 0.0 {
        return Err(AppError::BadRequest("A tour must have a valid price".into()));
    }
    if let Some(discount) = discount {
        if !discount.is_finite() || discount < 0.0 || discount >= price {
            return Err(AppError::BadRequest(format!(
                "Discount price ({discount}) should be below regular price"
            )));
        }
    }
    Ok(())
}

pub(crate) fn to_document<T: Serialize>(value: &T) -> Result<Document, AppError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::Serialization("Expected a JSON object".into())),
        Err(e) => Err(AppError::Serialization(e.to_string())),
    }
}
