//! Event router: point-to-point delivery of routable events to whatever live
//! connections the recipient currently has.

mod event;
#[allow(clippy::module_inception)]
mod router;

pub use event::RoutableEvent;
pub use router::{EventRouter, RouteOutcome, RouterStats, RouterStatsSnapshot};

pub(crate) use router::send_to_connections;
