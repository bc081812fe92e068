use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout};
use warp::ws::{Message, WebSocket};

use crate::config::ViewerConfig;
use crate::hub::{Frame, HubHandle, Topic, ViewerControl, ViewerId};

/// Bridges one websocket to the hub until either side gives up.
///
/// The reader runs on this task and the writer on its own. Only the reader
/// unregisters, exactly once, whichever side ended first.
pub async fn handle_viewer_socket(websocket: WebSocket, hub: HubHandle, config: ViewerConfig) {
    let (ws_sender, ws_receiver) = websocket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(config.queue_capacity);
    let viewer_id = hub.register(outbound_tx);
    tracing::info!(viewer_id, "Viewer connected");

    let mut writer = tokio::spawn(write_duty(ws_sender, outbound_rx, config.clone()));
    let writer_finished = read_duty(ws_receiver, &hub, viewer_id, &config, &mut writer).await;

    hub.unregister(viewer_id);

    // The hub drops the queue on unregister, which ends the writer.
    if !writer_finished && timeout(config.write_wait * 2, &mut writer).await.is_err() {
        tracing::warn!(viewer_id, "Viewer writer did not stop, aborting");
        writer.abort();
    }

    tracing::info!(viewer_id, "Viewer disconnected");
}

/// Returns true when it stopped because the writer had already exited.
async fn read_duty(
    mut stream: SplitStream<WebSocket>,
    hub: &HubHandle,
    viewer_id: ViewerId,
    config: &ViewerConfig,
    writer: &mut JoinHandle<()>,
) -> bool {
    loop {
        tokio::select! {
            _ = &mut *writer => return true,
            next = timeout(config.pong_wait, stream.next()) => {
                let message = match next {
                    Err(_) => {
                        tracing::info!(viewer_id, "Viewer idle past pong wait");
                        return false;
                    }
                    Ok(None) => return false,
                    Ok(Some(Err(e))) => {
                        tracing::debug!(viewer_id, error = %e, "Viewer transport error");
                        return false;
                    }
                    Ok(Some(Ok(message))) => message,
                };

                if message.is_close() {
                    return false;
                }
                // Pongs and other frames only count as traffic.
                if let Ok(text) = message.to_str() {
                    apply_control(hub, viewer_id, text);
                }
            }
        }
    }
}

fn apply_control(hub: &HubHandle, viewer_id: ViewerId, raw: &str) {
    match ViewerControl::parse(raw) {
        Some(ViewerControl::SubscribeAll) => hub.subscribe(viewer_id, Topic::All),
        Some(ViewerControl::SubscribeSession { session_code }) if !session_code.is_empty() => {
            hub.subscribe(viewer_id, Topic::session(session_code))
        }
        Some(ViewerControl::UnsubscribeSession { session_code }) => {
            hub.unsubscribe(viewer_id, Topic::session(session_code))
        }
        _ => tracing::trace!(viewer_id, "Ignoring viewer frame"),
    }
}

async fn write_duty(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<Frame>,
    config: ViewerConfig,
) {
    let mut keepalive = interval(config.ping_period);
    keepalive.reset();

    loop {
        tokio::select! {
            frame = queue.recv() => {
                let Some(first) = frame else {
                    let _ = timeout(config.write_wait, sink.send(Message::close())).await;
                    break;
                };

                let batch = coalesce(&first, &mut queue);
                match timeout(config.write_wait, sink.send(Message::text(batch))).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        tracing::debug!(error = %e, "Viewer write failed");
                        break;
                    }
                    Err(_) => {
                        tracing::warn!("Viewer write timed out");
                        break;
                    }
                }
            }
            _ = keepalive.tick() => {
                if !matches!(timeout(config.write_wait, sink.send(Message::ping(Vec::new()))).await, Ok(Ok(()))) {
                    break;
                }
            }
        }
    }

    let _ = timeout(config.write_wait, sink.close()).await;
}

/// Joins `first` with whatever is already queued, newline-delimited.
fn coalesce(first: &str, queue: &mut mpsc::Receiver<Frame>) -> String {
    let mut batch = String::from(first);
    while let Ok(next) = queue.try_recv() {
        batch.push('\n');
        batch.push_str(&next);
    }
    batch
}
