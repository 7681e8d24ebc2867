//! HTTP API handlers for vigil-rd
//!
//! Thin adapter over [`RiskEngine`](crate::engine::RiskEngine): REST for
//! assessment and operator actions, SSE for live events.

pub mod alerts;
pub mod assess;
pub mod health;
pub mod sse;
pub mod taxonomy;
pub mod users;

pub use alerts::alert_routes;
pub use assess::assess_routes;
pub use health::health_routes;
pub use sse::event_stream;
pub use taxonomy::taxonomy_routes;
pub use users::user_routes;
