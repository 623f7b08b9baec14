//! HTTP API layer

pub mod cache;
pub mod health;
pub mod middleware;
pub mod router;
pub mod search;
pub mod state;
pub mod sync;
pub mod types;

pub use router::create_router_with_state;
pub use state::AppState;
