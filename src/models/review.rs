use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{errors::AppError, models::tour::to_document, store::Document};

pub const TOUR_FIELD: &str = "tour";
pub const USER_FIELD: &str = "user";
pub const RATING_FIELD: &str = "rating";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: Uuid,
    #[serde(rename = "review")]
    pub text: String,
    pub rating: u8,
    pub created_at: DateTime<Utc>,
    pub tour: Uuid,
    pub user: Uuid,
    #[serde(rename = "__v", default)]
    pub version: u64,
}

impl Review {
    pub fn from_document(doc: Document) -> Result<Self, AppError> {
        serde_json::from_value(Value::Object(doc))
            .map_err(|e| AppError::Deserialization(format!("Invalid review document: {}", e)))
    }

    pub fn to_document(&self) -> Result<Document, AppError> {
        to_document(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
    pub review: String,
    pub rating: u8,
    // Only read on the flat /reviews route; nested routes take the tour from the path
    pub tour: Option<Uuid>,
}

impl NewReview {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_text(&self.review)?;
        validate_rating(self.rating)
    }

    pub fn into_review(self, tour: Uuid, user: Uuid) -> Review {
        Review {
            id: Uuid::new_v4(),
            text: sanitize_text(&self.review),
            rating: self.rating,
            created_at: Utc::now(),
            tour,
            user,
            version: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
}

impl ReviewPatch {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.review.is_none() && self.rating.is_none() {
            return Err(AppError::BadRequest("Nothing to update".into()));
        }
        if let Some(text) = &self.review {
            validate_text(text)?;
        }
        if let Some(rating) = self.rating {
            validate_rating(rating)?;
        }
        Ok(())
    }

    pub fn to_document(&self) -> Result<Document, AppError> {
        let sanitized = ReviewPatch {
            review: self.review.as_deref().map(sanitize_text),
            rating: self.rating,
        };
        to_document(&sanitized)
    }
}

pub fn validate_rating(rating: u8) -> Result<(), AppError> {
    if !(1..=5).contains(&rating) {
        return Err(AppError::BadRequest(
            "Rating must be between 1 and 5".into(),
        ));
    }
    Ok(())
}

fn validate_text(text: &str) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Err(AppError::BadRequest("Review cannot be empty".into()));
    }
    Ok(())
}

fn sanitize_text(text: &str) -> String {
    html_escape::encode_text(text.trim()).into_owned()
}
