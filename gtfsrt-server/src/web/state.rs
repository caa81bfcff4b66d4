//! Application state for the web layer.

use std::sync::Arc;

use crate::feed::FeedAggregator;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Aggregated feed served to clients
    pub aggregator: Arc<FeedAggregator>,
}

impl AppState {
    pub fn new(aggregator: Arc<FeedAggregator>) -> Self {
        Self { aggregator }
    }
}
