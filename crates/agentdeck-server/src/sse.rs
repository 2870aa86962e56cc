use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use agentdeck_core::Subscription;

use crate::state::{AppState, ConnectionGuard};

/// GET /api/events/stream: the live channel as server-sent events, `init`
/// first. A client that goes away is pruned on the next broadcast.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, StatusCode> {
    let max_sse = state.config.limits.max_sse_subscribers;
    let current = state.sse_subscriber_count.load(Ordering::Relaxed);
    if current >= max_sse {
        tracing::warn!(current, max = max_sse, "SSE subscriber limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    let guard = ConnectionGuard::new(Arc::clone(&state.sse_subscriber_count));
    let Subscription { id, rx } = state.dashboard.write().await.subscribe();
    tracing::debug!(subscriber = id, "SSE stream opened");

    let stream = ReceiverStream::new(rx).map(move |payload| {
        let _guard = &guard;
        Ok(SseEvent::default().data(payload.as_ref()))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
