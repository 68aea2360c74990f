// Infrastructure (shared components)
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

// Core: presence tracking and message-delivery fan-out
pub mod presence;
pub mod registry;
pub mod router;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod tasks;
