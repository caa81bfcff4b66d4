//! HTTP surface: the encoded feed plus health and status endpoints.

pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
