//! Control channel: the long-lived WebSocket to the device's art app.
//!
//! One socket, one read pump, one write pump. Requests are multiplexed
//! over it and matched to responses through [`PendingRequests`]. The
//! channel opens lazily on the first request and reopens transparently
//! after the device drops it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{Connector, tungstenite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use frameart_data_channel::tls::insecure_client_config;
use frameart_protocol::constants::{
    HANDSHAKE_MAX_EVENTS, MS_CHANNEL_CONNECT_EVENT, MS_CHANNEL_READY_EVENT,
    MS_CHANNEL_UNAUTHORIZED_EVENT,
};
use frameart_protocol::{
    ArtMode, ArtRequest, ChannelMessage, OutboundCommand, ServiceEvent, ServiceMessage,
};

use crate::config::ArtConfig;
use crate::correlator::{PendingRequests, Waiter};
use crate::error::{ChannelError, RequestError};
use crate::pumps::read::{CURRENT_EPOCH, ReceiveLoop, read_pump};

/// Largest control message accepted (16 MiB).
const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Outbound queue depth.
const WRITE_QUEUE: usize = 64;

/// State shared between the channel and its read pump.
#[derive(Clone)]
pub(crate) struct PumpState {
    pub(crate) pending: PendingRequests,
    pub(crate) art_mode: Arc<watch::Sender<Option<ArtMode>>>,
    /// Epoch of the live connection, 0 when none.
    pub(crate) live_epoch: Arc<AtomicU64>,
    pub(crate) receive_loops: Arc<AtomicUsize>,
}

struct Live {
    epoch: u64,
    write_tx: mpsc::Sender<tungstenite::Message>,
    read_handle: JoinHandle<()>,
    write_handle: JoinHandle<()>,
    cancel: CancellationToken,
}

/// WebSocket control channel to one device.
pub struct ControlChannel {
    config: ArtConfig,
    live: Mutex<Option<Live>>,
    state: PumpState,
    connect_count: AtomicU64,
}

impl ControlChannel {
    pub fn new(config: ArtConfig) -> Self {
        let (art_mode, _) = watch::channel(None);
        Self {
            config,
            live: Mutex::new(None),
            state: PumpState {
                pending: PendingRequests::new(),
                art_mode: Arc::new(art_mode),
                live_epoch: Arc::new(AtomicU64::new(0)),
                receive_loops: Arc::new(AtomicUsize::new(0)),
            },
            connect_count: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ArtConfig {
        &self.config
    }

    /// Opens the channel if it is not already open.
    pub async fn open(&self) -> Result<(), ChannelError> {
        let mut live = self.live.lock().await;
        if let Some(current) = live.as_ref()
            && self.state.live_epoch.load(Ordering::Acquire) == current.epoch
        {
            return Ok(());
        }
        if let Some(stale) = live.take() {
            debug!(epoch = stale.epoch, "discarding dropped connection");
            stale.cancel.cancel();
            stale.write_handle.abort();
        }

        let host = &self.config.host;
        let port = self.config.port;
        debug!(%host, port, "opening control channel");

        let connect = tokio::time::timeout(self.config.timeout, connect(&self.config)).await;
        let ws = match connect {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                warn!(%host, port, error = %e, "control channel connect failed");
                return Err(e);
            }
            Err(_) => {
                warn!(%host, port, "control channel connect timed out");
                return Err(ChannelError::ConnectTimeout);
            }
        };

        let (mut write, mut read) = ws.split();
        if let Err(e) = await_ready(&mut read, self.config.timeout).await {
            warn!(%host, port, error = %e, "control channel handshake failed");
            let _ = write.close().await;
            return Err(e);
        }

        let epoch = self.connect_count.fetch_add(1, Ordering::AcqRel) + 1;
        let cancel = CancellationToken::new();
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(WRITE_QUEUE);

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        self.state.live_epoch.store(epoch, Ordering::Release);
        let read_handle = {
            let state = self.state.clone();
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            let receive_loop = ReceiveLoop::enter(&self.state.receive_loops);
            tokio::spawn(CURRENT_EPOCH.scope(
                epoch,
                read_pump(read, state, epoch, write_tx, cancel, receive_loop),
            ))
        };

        *live = Some(Live {
            epoch,
            write_tx,
            read_handle,
            write_handle,
            cancel,
        });
        info!(%host, port, epoch, "control channel open");
        Ok(())
    }

    /// Closes the channel and cancels every pending request. Idempotent.
    ///
    /// Holds the lifecycle lock until the pumps have stopped, so an
    /// `open` issued meanwhile starts a fresh connection afterwards.
    pub async fn close(&self) {
        let mut guard = self.live.lock().await;
        let Some(live) = guard.take() else {
            return;
        };

        live.cancel.cancel();
        let grace = self.config.timeout;
        let inside_read_pump = CURRENT_EPOCH
            .try_with(|epoch| *epoch == live.epoch)
            .unwrap_or(false);
        if !inside_read_pump {
            join_or_abort(live.read_handle, grace).await;
        }
        join_or_abort(live.write_handle, grace).await;

        let _ = self.state.live_epoch.compare_exchange(
            live.epoch,
            0,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.state.pending.cancel_all();
        drop(guard);
        info!(host = %self.config.host, epoch = live.epoch, "control channel closed");
    }

    /// `true` while a handshaken socket and its read pump are alive.
    pub fn is_connected(&self) -> bool {
        self.state.live_epoch.load(Ordering::Acquire) != 0
    }

    /// Number of read pumps currently running.
    pub fn active_receive_loops(&self) -> usize {
        self.state.receive_loops.load(Ordering::Acquire)
    }

    /// Number of successful opens so far.
    pub fn connect_count(&self) -> u64 {
        self.connect_count.load(Ordering::Acquire)
    }

    /// Last art mode seen on the channel, if any.
    pub fn art_mode(&self) -> Option<ArtMode> {
        *self.state.art_mode.borrow()
    }

    pub fn subscribe_art_mode(&self) -> watch::Receiver<Option<ArtMode>> {
        self.state.art_mode.subscribe()
    }

    pub(crate) fn record_art_mode(&self, mode: ArtMode) {
        self.state.art_mode.send_replace(Some(mode));
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.state.pending
    }

    /// Registers a waiter for an unsolicited sub-event.
    ///
    /// Register before triggering the action that produces the event.
    pub fn expect_event(&self, key: &str) -> Result<Waiter, RequestError> {
        self.state.pending.register(key)
    }

    /// Sends `request` and waits for its response.
    ///
    /// The response is matched by request id, or by the `wait_for`
    /// sub-event when given. An `error` sub-event becomes
    /// [`RequestError::Device`].
    pub async fn request(
        &self,
        mut request: ArtRequest,
        wait_for: Option<&str>,
        timeout: Duration,
    ) -> Result<ServiceMessage, RequestError> {
        self.open().await?;

        let id = request.ensure_id(|| uuid::Uuid::new_v4().to_string());
        let key = wait_for.unwrap_or(&id);
        let waiter = self.state.pending.register(key)?;

        self.send(&request).await?;
        let msg = waiter.wait(timeout).await?;

        if let ServiceEvent::Error { code } = msg.event() {
            debug!(request = %request.kind(), ?code, "device returned an error");
            return Err(RequestError::Device { code });
        }
        Ok(msg)
    }

    /// Sends `request` without waiting for anything.
    pub async fn send(&self, request: &ArtRequest) -> Result<(), RequestError> {
        let json = OutboundCommand::emit(request)?.to_json()?;
        let write_tx = self
            .live
            .lock()
            .await
            .as_ref()
            .map(|live| live.write_tx.clone())
            .ok_or(ChannelError::Closed)?;

        write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| ChannelError::Closed)?;
        debug!(request = %request.kind(), id = ?request.id(), "request sent");
        Ok(())
    }
}

impl Drop for ControlChannel {
    fn drop(&mut self) {
        if let Some(live) = self.live.get_mut().take() {
            live.cancel.cancel();
            live.read_handle.abort();
            live.write_handle.abort();
        }
        self.state.pending.cancel_all();
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(config: &ArtConfig) -> Result<WsStream, ChannelError> {
    let mut ws_config = WebSocketConfig::default();
    ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

    let connector = if config.is_secure() {
        let tls = insecure_client_config().map_err(|e| ChannelError::Tls(e.to_string()))?;
        Some(Connector::Rustls(tls))
    } else {
        Some(Connector::Plain)
    };

    let (ws, _) = tokio_tungstenite::connect_async_tls_with_config(
        config.websocket_url(),
        Some(ws_config),
        false,
        connector,
    )
    .await?;
    Ok(ws)
}

/// Reads up to [`HANDSHAKE_MAX_EVENTS`] messages waiting for the ready event.
pub(crate) async fn await_ready<S>(read: &mut S, timeout: Duration) -> Result<(), ChannelError>
where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    for _ in 0..HANDSHAKE_MAX_EVENTS {
        let msg = match tokio::time::timeout(timeout, read.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => return Err(e.into()),
            Ok(None) => return Err(ChannelError::Closed),
            Err(_) => return Err(ChannelError::Handshake("timed out waiting for ready".into())),
        };

        let text = match msg {
            tungstenite::Message::Text(text) => text,
            tungstenite::Message::Close(_) => {
                return Err(ChannelError::Handshake("closed by device".into()));
            }
            _ => continue,
        };

        let envelope = match ChannelMessage::parse(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(error = %e, "unparseable handshake message");
                continue;
            }
        };
        match envelope.event.as_str() {
            MS_CHANNEL_READY_EVENT => return Ok(()),
            MS_CHANNEL_CONNECT_EVENT => debug!("channel connect received, waiting for ready"),
            MS_CHANNEL_UNAUTHORIZED_EVENT => {
                return Err(ChannelError::Handshake("unauthorized".into()));
            }
            other => debug!(event = %other, "ignoring event during handshake"),
        }
    }
    Err(ChannelError::Handshake("no ready event".into()))
}

async fn join_or_abort(mut handle: JoinHandle<()>, grace: Duration) {
    if tokio::time::timeout(grace, &mut handle).await.is_err() {
        handle.abort();
    }
}
