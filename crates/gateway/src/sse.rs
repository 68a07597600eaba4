//! Wraps an `EventStream` as an axum SSE response. Grounded directly on
//! `gateway/src/api/runs.rs`'s `make_run_event_stream`/`run_events_sse`:
//! one SSE record per `Event`, JSON-encoded, with keep-alive pings
//! between events and a clean close once the stream is drained.

use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use futures_util::StreamExt;

use agentrun_domain::stream::EventStream;

/// Framing per spec §6.2: status 200, `text/event-stream`, one SSE
/// `data:` record per wire `Event`, stream closes normally after the
/// last event (the coordinator's own terminal/empty-stream guarantees
/// decide when that happens — this layer only encodes).
pub fn to_sse_response(events: EventStream) -> impl IntoResponse {
    let stream = events.map(|event| {
        let payload = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
        Ok::<_, std::convert::Infallible>(SseEvent::default().data(payload))
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
