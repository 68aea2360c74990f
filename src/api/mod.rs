//! API layer - HTTP endpoint handlers.

mod events;
mod health;
mod metrics;
mod routes;

pub use events::{online_users, push_message, push_message_deleted};
pub use health::{health, stats};
pub use metrics::prometheus_metrics;
pub use routes::api_routes;
