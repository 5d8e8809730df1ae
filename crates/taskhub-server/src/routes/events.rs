use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Extension;
use std::convert::Infallible;
use taskhub_core::access::Actor;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;

use crate::state::AppState;

/// GET /api/notifications/stream — SSE stream of the caller's new
/// notifications, one `notification` event each.
pub async fn notification_stream(
    State(app): State<AppState>,
    Extension(actor): Extension<Actor>,
) -> impl axum::response::IntoResponse {
    let rx = app.notify_tx.subscribe();
    let user_id = actor.user_id;
    let stream = BroadcastStream::new(rx).filter_map(move |msg| {
        let n = msg.ok().filter(|n| n.user_id == user_id)?;
        Event::default()
            .event("notification")
            .id(n.id.clone())
            .json_data(&n)
            .ok()
            .map(Ok::<Event, Infallible>)
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
