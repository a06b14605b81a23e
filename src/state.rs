use std::sync::Arc;

use crate::{config::Config, db::AggregateSync, store::SharedStore};

#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub ratings: AggregateSync,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: SharedStore, config: Config) -> Self {
        Self {
            ratings: AggregateSync::new(store.clone()),
            store,
            config: Arc::new(config),
        }
    }
}
