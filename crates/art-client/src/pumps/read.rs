//! WebSocket read pump: updates art mode and resolves pending requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use frameart_protocol::{ArtMode, ChannelMessage, ServiceEvent};

use crate::channel::PumpState;
use crate::correlator::PendingRequests;

tokio::task_local! {
    /// Epoch of the connection whose read pump is running on this task.
    pub(crate) static CURRENT_EPOCH: u64;
}

/// Counts one read pump from spawn until the pump is dropped, aborted
/// pumps included.
pub(crate) struct ReceiveLoop(Arc<AtomicUsize>);

impl ReceiveLoop {
    pub(crate) fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(counter))
    }
}

impl Drop for ReceiveLoop {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Reads messages from the WebSocket until it ends or `cancel` fires.
///
/// On exit the connection is marked dead and the requests registered
/// while it was live are cancelled, so the next request reopens the
/// channel. A pump whose epoch was already superseded leaves the table
/// alone.
pub(crate) async fn read_pump<S>(
    mut read: S,
    state: PumpState,
    epoch: u64,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
    _receive_loop: ReceiveLoop,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = read.next() => {
                match msg {
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        handle_text_message(&text, &state.pending, &state.art_mode);
                    }
                    Some(Ok(tungstenite::Message::Ping(data))) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                    }
                    Some(Ok(tungstenite::Message::Close(frame))) => {
                        debug!(?frame, "device closed the control channel");
                        break;
                    }
                    Some(Ok(_)) => {} // Binary, Pong
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    cancel.cancel();
    let mark = state.pending.generation();
    if state
        .live_epoch
        .compare_exchange(epoch, 0, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        state.pending.cancel_through(mark);
    }
    debug!(epoch, "read pump stopped");
}

/// Handles a text message from the WebSocket.
pub(crate) fn handle_text_message(
    text: &str,
    pending: &PendingRequests,
    art_mode: &watch::Sender<Option<ArtMode>>,
) {
    let envelope = match ChannelMessage::parse(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse message: {e}");
            return;
        }
    };
    trace!(event = %envelope.event, "received message");

    let msg = match envelope.service_payload() {
        Ok(Some(msg)) => msg,
        Ok(None) => return,
        Err(e) => {
            debug!(error = %e, "undecodable service message");
            return;
        }
    };

    let event = msg.event();
    if let Some(mode) = event.art_mode_update() {
        debug!(%mode, "art mode updated from event");
        art_mode.send_replace(Some(mode));
    }
    if let ServiceEvent::Error { code } = &event {
        debug!(?code, "device error event");
    }

    let sub_event = msg.sub_event().to_owned();
    if !pending.resolve(msg) {
        trace!(%sub_event, "no waiter for message");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::time::Duration;

    use futures_util::stream;
    use serde_json::json;

    fn service(inner: serde_json::Value) -> String {
        json!({"event": "d2d_service_message", "data": inner.to_string()}).to_string()
    }

    fn state() -> PumpState {
        let (art_mode, _) = watch::channel(None);
        PumpState {
            pending: PendingRequests::new(),
            art_mode: Arc::new(art_mode),
            live_epoch: Arc::new(AtomicU64::new(1)),
            receive_loops: Arc::new(AtomicUsize::new(0)),
        }
    }

    #[tokio::test]
    async fn routes_response_to_pending() {
        let s = state();
        let waiter = s.pending.register("r-1").unwrap();
        handle_text_message(
            &service(json!({"event": "get_artmode_status", "value": "on", "request_id": "r-1"})),
            &s.pending,
            &s.art_mode,
        );
        let msg = waiter.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(msg.get_str("value"), Some("on"));
        assert_eq!(*s.art_mode.borrow(), Some(ArtMode::On));
    }

    #[test]
    fn standby_forces_art_mode_off() {
        let s = state();
        s.art_mode.send_replace(Some(ArtMode::On));
        handle_text_message(&service(json!({"event": "go_to_standby"})), &s.pending, &s.art_mode);
        assert_eq!(*s.art_mode.borrow(), Some(ArtMode::Off));
    }

    #[test]
    fn ignores_non_service_and_malformed() {
        let s = state();
        let _w = s.pending.register("ms.channel.clientConnect").unwrap();
        handle_text_message(
            r#"{"event":"ms.channel.clientConnect","data":{}}"#,
            &s.pending,
            &s.art_mode,
        );
        handle_text_message("not valid json {{{", &s.pending, &s.art_mode);
        handle_text_message(
            r#"{"event":"d2d_service_message","data":"{broken"}"#,
            &s.pending,
            &s.art_mode,
        );
        assert_eq!(s.pending.len(), 1);
        assert_eq!(*s.art_mode.borrow(), None);
    }

    #[tokio::test]
    async fn stream_end_cancels_pending_and_clears_epoch() {
        let s = state();
        let waiter = s.pending.register("r-2").unwrap();
        let (write_tx, _write_rx) = mpsc::channel(16);
        let empty = stream::empty::<Result<tungstenite::Message, tungstenite::Error>>();

        let counter = ReceiveLoop::enter(&s.receive_loops);
        read_pump(empty, s.clone(), 1, write_tx, CancellationToken::new(), counter).await;

        assert!(matches!(
            waiter.wait(Duration::from_secs(1)).await,
            Err(crate::error::RequestError::Cancelled)
        ));
        assert_eq!(s.live_epoch.load(Ordering::Acquire), 0);
        assert_eq!(s.receive_loops.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn stale_pump_leaves_newer_epoch() {
        let s = state();
        s.live_epoch.store(2, Ordering::Release);
        let (write_tx, _write_rx) = mpsc::channel(16);
        let empty = stream::empty::<Result<tungstenite::Message, tungstenite::Error>>();

        let waiter = s.pending.register("r-3").unwrap();

        let counter = ReceiveLoop::enter(&s.receive_loops);
        read_pump(empty, s.clone(), 1, write_tx, CancellationToken::new(), counter).await;
        assert_eq!(s.live_epoch.load(Ordering::Acquire), 2);
        assert!(s.pending.contains("r-3"));
        assert_eq!(s.receive_loops.load(Ordering::Acquire), 0);
        drop(waiter);
    }

    #[tokio::test]
    async fn aborted_pump_releases_receive_loop() {
        let s = state();
        let (write_tx, _write_rx) = mpsc::channel(16);
        let silent = stream::pending::<Result<tungstenite::Message, tungstenite::Error>>();

        let counter = ReceiveLoop::enter(&s.receive_loops);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(read_pump(silent, s.clone(), 1, write_tx, cancel, counter));
        assert_eq!(s.receive_loops.load(Ordering::Acquire), 1);
        handle.abort();
        let _ = handle.await;

        assert_eq!(s.receive_loops.load(Ordering::Acquire), 0);
    }

    #[tokio::test]
    async fn answers_ping() {
        let s = state();
        let (write_tx, mut write_rx) = mpsc::channel(16);
        let msgs = stream::iter(vec![Ok::<_, tungstenite::Error>(
            tungstenite::Message::Ping(vec![1, 2].into()),
        )]);

        let counter = ReceiveLoop::enter(&s.receive_loops);
        read_pump(msgs, s, 1, write_tx, CancellationToken::new(), counter).await;
        assert!(matches!(write_rx.recv().await, Some(tungstenite::Message::Pong(_))));
    }
}
