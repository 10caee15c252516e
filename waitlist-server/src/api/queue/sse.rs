//! SSE 实时推送
//!
//! 每个流以一条 `QUEUE_UPDATE` 快照开始 (附带 `retry_ms` 和
//! `poll_interval_secs`)，之后转发广播主题中的事件。订阅者落后时
//! 发送 `resync: true` 的 `QUEUE_UPDATE`，客户端应重新拉取。

use std::convert::Infallible;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use serde_json::json;
use shared::queue::{QueueEventType, QueueSseEvent};
use shared::util::now_millis;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use crate::core::{Config, ServerState};
use crate::queue::{EventReceiver, QueueError};
use crate::utils::AppResult;

/// Restaurant topic: every event of the venue (staff dashboards)
pub async fn restaurant_events(
    State(state): State<ServerState>,
    Path(restaurant_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // Subscribe before the snapshot so nothing committed in between is lost
    let rx = state.broadcaster.subscribe_restaurant(&restaurant_id);
    let snapshot = state
        .manager
        .get_restaurant_queue(&restaurant_id, None)
        .await?;
    let version = state
        .manager
        .store()
        .queue_version(&restaurant_id)
        .await
        .map_err(QueueError::from)?;

    let initial = QueueSseEvent::new(
        QueueEventType::QueueUpdate,
        restaurant_id.as_str(),
        None,
        json!({
            "queue": snapshot,
            "retry_ms": state.config.sse_retry_ms,
            "poll_interval_secs": state.config.poll_interval_secs,
        }),
        now_millis(),
        version,
    );
    tracing::debug!(restaurant_id = %restaurant_id, "SSE restaurant subscriber connected");
    Ok(event_stream(&state.config, initial, rx))
}

/// Entry topic: events of one party (customer page)
pub async fn entry_events(
    State(state): State<ServerState>,
    Path(entry_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let rx = state.broadcaster.subscribe_entry(&entry_id);
    let status = state.manager.get_queue_status(&entry_id).await?;
    let restaurant_id = status.queue_entry.restaurant_id.clone();
    let version = state
        .manager
        .store()
        .queue_version(&restaurant_id)
        .await
        .map_err(QueueError::from)?;

    let initial = QueueSseEvent::new(
        QueueEventType::QueueUpdate,
        restaurant_id,
        Some(entry_id.clone()),
        json!({
            "status": status,
            "retry_ms": state.config.sse_retry_ms,
            "poll_interval_secs": state.config.poll_interval_secs,
        }),
        now_millis(),
        version,
    );
    tracing::debug!(entry_id = %entry_id, "SSE entry subscriber connected");
    Ok(event_stream(&state.config, initial, rx))
}

fn event_stream(
    config: &Config,
    initial: QueueSseEvent,
    rx: EventReceiver,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + use<>> {
    let first = to_sse(&initial).retry(Duration::from_millis(config.sse_retry_ms));
    let live = live_events(rx, &initial).map(|event| Ok(to_sse(&event)));

    let stream = stream::once(async move { Ok(first) }).chain(live);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(config.sse_keepalive_secs))
            .text("keep-alive"),
    )
}

/// Broadcast events in order; a lag turns into one resync hint
fn live_events(
    rx: EventReceiver,
    initial: &QueueSseEvent,
) -> impl Stream<Item = QueueSseEvent> + use<> {
    let restaurant_id = initial.restaurant_id.clone();
    let entry_id = initial.queue_entry_id.clone();
    let mut last_sequence = initial.sequence;

    BroadcastStream::new(rx).map(move |item| match item {
        Ok(event) => {
            last_sequence = last_sequence.max(event.sequence);
            event
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(
                restaurant_id = %restaurant_id,
                entry_id = ?entry_id,
                skipped,
                "SSE subscriber lagged, asking client to resync"
            );
            resync_event(&restaurant_id, entry_id.clone(), last_sequence, skipped)
        }
    })
}

fn resync_event(
    restaurant_id: &str,
    entry_id: Option<String>,
    sequence: u64,
    skipped: u64,
) -> QueueSseEvent {
    QueueSseEvent::new(
        QueueEventType::QueueUpdate,
        restaurant_id,
        entry_id,
        json!({ "resync": true, "skipped": skipped }),
        now_millis(),
        sequence,
    )
}

/// `event:` = type, `id:` = sequence, `data:` = the JSON event
fn to_sse(event: &QueueSseEvent) -> Event {
    let base = Event::default()
        .event(event.event_type.as_str())
        .id(event.sequence.to_string());
    match base.json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize SSE event");
            Event::default().comment("serialization error")
        }
    }
}
