//! Server-Sent Events (SSE) for scan progress streaming
//!
//! Each connection receives, in order:
//! 1. `connected` with its connection id and the live subscriber count
//! 2. The cached last event, if any (replay slot, not a log)
//! 3. Every broadcast event, with `event:` set to the event type
//!
//! A `heartbeat` is sent every [`HEARTBEAT_INTERVAL`] per connection.

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use chrono::Utc;
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vidcache_common::events::ScanEvent;

use crate::AppState;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

fn to_sse(event: &ScanEvent) -> Option<Event> {
    let event_type = event.event_type();
    match serde_json::to_string(event) {
        Ok(json) => Some(Event::default().event(event_type).data(json)),
        Err(e) => {
            warn!("SSE: Failed to serialize event {}: {}", event_type, e);
            None
        }
    }
}

/// GET /api/scan/events
pub async fn scan_event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let event_bus = state.event_bus.clone();
    let (mut rx, replay) = event_bus.subscribe();
    let connection_id = Uuid::new_v4();
    info!(%connection_id, active_connections = event_bus.subscriber_count(), "SSE client connected");

    let stream = async_stream::stream! {
        let connected = ScanEvent::Connected {
            connection_id,
            active_connections: event_bus.subscriber_count(),
            timestamp: Utc::now(),
        };
        if let Some(event) = to_sse(&connected) {
            yield Ok(event);
        }

        if let Some(event) = replay.as_ref().and_then(to_sse) {
            debug!(%connection_id, "SSE: Replaying cached event");
            yield Ok(event);
        }

        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
            HEARTBEAT_INTERVAL,
        );

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    let beat = ScanEvent::Heartbeat {
                        active_connections: event_bus.subscriber_count(),
                        timestamp: Utc::now(),
                    };
                    if let Some(event) = to_sse(&beat) {
                        yield Ok(event);
                    }
                }

                received = rx.recv() => match received {
                    Ok(event) => {
                        if let Some(sse) = to_sse(&event) {
                            yield Ok(sse);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%connection_id, skipped, "SSE: Subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        info!(%connection_id, "SSE: Event stream closed");
    };

    Sse::new(stream)
}
