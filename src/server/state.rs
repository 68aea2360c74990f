use std::sync::Arc;
use std::time::Instant;

use crate::auth::JwtValidator;
use crate::config::Settings;
use crate::presence::PresenceBroadcaster;
use crate::registry::{ConnectionLimits, ConnectionRegistry};
use crate::router::EventRouter;

/// Composition root: owns the single registry instance and the components
/// that read it. Injected everywhere instead of being ambient global state.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub jwt_validator: Option<Arc<JwtValidator>>,
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<EventRouter>,
    pub broadcaster: Arc<PresenceBroadcaster>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        let jwt_validator = JwtValidator::from_config(&settings.jwt).map(Arc::new);
        let registry = Arc::new(ConnectionRegistry::with_limits(ConnectionLimits {
            max_connections: settings.websocket.max_connections,
            max_connections_per_user: settings.websocket.max_connections_per_user,
        }));
        let router = Arc::new(EventRouter::new(registry.clone()));
        let broadcaster = Arc::new(PresenceBroadcaster::new(registry.clone()));

        Self {
            settings: Arc::new(settings),
            jwt_validator,
            registry,
            router,
            broadcaster,
            start_time: Instant::now(),
        }
    }
}
