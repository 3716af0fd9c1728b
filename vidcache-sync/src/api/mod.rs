//! HTTP API handlers for vidcache-sync
//!
//! REST endpoints for scan control, settings and schedule, plus the SSE
//! progress stream.

pub mod health;
pub mod scan;
pub mod schedule;
pub mod settings;
pub mod sse;

pub use health::health_routes;
pub use scan::scan_routes;
pub use schedule::schedule_routes;
pub use settings::settings_routes;
pub use sse::scan_event_stream;
