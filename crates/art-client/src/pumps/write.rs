//! Control-channel write pump.

use std::time::Duration;

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Longest wait for the close frame once the pump is stopping.
const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Drains `queue` into `sink` until the queue closes, a send fails or
/// `cancel` fires, then sends a close frame.
///
/// A send stuck on a device that stopped reading is abandoned as soon as
/// `cancel` fires.
pub(crate) async fn write_pump<S>(
    mut sink: S,
    mut queue: mpsc::Receiver<Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<Message, Error = tungstenite::Error> + Unpin,
{
    let mut written = 0u64;
    let reason = loop {
        let msg = tokio::select! {
            biased;
            _ = cancel.cancelled() => break "cancelled",
            msg = queue.recv() => msg,
        };
        let Some(msg) = msg else {
            break "queue closed";
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break "cancelled during send",
            sent = sink.send(msg) => {
                if let Err(e) = sent {
                    warn!(error = %e, "control channel write failed");
                    break "write failed";
                }
                written += 1;
            }
        }
    };
    debug!(reason, written, "write pump stopping");

    match tokio::time::timeout(CLOSE_FRAME_TIMEOUT, sink.send(Message::Close(None))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "close frame not sent"),
        Err(_) => debug!("close frame timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    fn capture() -> (
        impl SinkExt<Message, Error = tungstenite::Error> + Unpin,
        mpsc::Receiver<Message>,
    ) {
        let (sink_tx, sink_rx) = mpsc::channel::<Message>(16);
        let sink = sink::unfold(sink_tx, |tx, msg: Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        });
        (Box::pin(sink), sink_rx)
    }

    #[tokio::test]
    async fn idle_pump_closes_on_cancel() {
        let (sink, mut frames) = capture();
        let (_queue_tx, queue) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(write_pump(sink, queue, cancel.clone()));
        cancel.cancel();
        handle.await.unwrap();

        assert!(matches!(frames.recv().await, Some(Message::Close(None))));
    }

    #[tokio::test]
    async fn forwards_in_order_then_closes() {
        let (sink, mut frames) = capture();
        let (queue_tx, queue) = mpsc::channel(16);
        queue_tx.send(Message::Text("a".into())).await.unwrap();
        queue_tx.send(Message::Text("b".into())).await.unwrap();
        drop(queue_tx);

        write_pump(sink, queue, CancellationToken::new()).await;

        let mut sent = Vec::new();
        while let Ok(m) = frames.try_recv() {
            sent.push(m);
        }
        assert_eq!(sent.len(), 3);
        assert!(matches!(&sent[0], Message::Text(t) if t.as_str() == "a"));
        assert!(matches!(&sent[1], Message::Text(t) if t.as_str() == "b"));
        assert!(matches!(sent[2], Message::Close(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_abandons_stalled_send() {
        let stalled = sink::unfold((), |_: (), _msg: Message| async move {
            std::future::pending::<()>().await;
            Ok::<_, tungstenite::Error>(())
        });
        let (queue_tx, queue) = mpsc::channel(4);
        queue_tx.send(Message::Text("stuck".into())).await.unwrap();
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(write_pump(Box::pin(stalled), queue, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("pump should stop within the close-frame timeout")
            .unwrap();
    }
}
