#![allow(dead_code)]

use std::sync::Arc;

use tours_be::{
    db::tour::create_tour,
    models::{
        Tour,
        review::NewReview,
        tour::{Difficulty, NewTour},
    },
    store::{MemoryStore, SharedStore},
};

pub fn memory_store() -> SharedStore {
    Arc::new(MemoryStore::new())
}

pub fn new_tour(name: &str, price: f64, difficulty: Difficulty) -> NewTour {
    NewTour {
        name: name.to_string(),
        duration: 5,
        max_group_size: 25,
        difficulty,
        price,
        price_discount: None,
        summary: "Breathtaking hike through the Canadian Banff National Park".to_string(),
        description: None,
        start_dates: Vec::new(),
    }
}

pub async fn seed_tour(store: &SharedStore, name: &str, price: f64, difficulty: Difficulty) -> Tour {
    create_tour(new_tour(name, price, difficulty), store.clone())
        .await
        .expect("tour should be created")
}

pub fn new_review(rating: u8) -> NewReview {
    NewReview {
        review: "Amazing guides and great views".to_string(),
        rating,
        tour: None,
    }
}
