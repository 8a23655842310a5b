//! Side-channel client.
//!
//! Opens the ephemeral socket a device announces in a `conn_info` reply,
//! then either drains a batch of frames (thumbnails) or writes a single
//! frame (upload). Every socket is shut down after one transfer.

use std::pin::Pin;
use std::time::Duration;

use frameart_protocol::ConnInfo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::DataChannelError;
use crate::tls::insecure_client_config;
use crate::wire::{Frame, FrameHeader, read_batch, write_frame};
use crate::{SIDE_BUFFER_SIZE, SIDE_CONNECT_TIMEOUT, SIDE_TRANSFER_TIMEOUT};

/// Byte stream of an open side channel, plain TCP or TLS.
pub trait SideStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SideStream for T {}

pub type BoxedStream = Pin<Box<dyn SideStream>>;

/// Transfer client with its timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SideChannel {
    /// Bound on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Bound on reading or writing the frames once connected.
    pub transfer_timeout: Duration,
}

impl Default for SideChannel {
    fn default() -> Self {
        Self {
            connect_timeout: SIDE_CONNECT_TIMEOUT,
            transfer_timeout: SIDE_TRANSFER_TIMEOUT,
        }
    }
}

impl SideChannel {
    pub fn new(connect_timeout: Duration, transfer_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            transfer_timeout,
        }
    }

    /// Connects to the announced endpoint, over TLS when `secured` is set.
    pub async fn connect(
        &self,
        info: &ConnInfo,
        cancel: &CancellationToken,
    ) -> Result<BoxedStream, DataChannelError> {
        let addr = info.addr();
        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(DataChannelError::Cancelled);
            }
            result = tokio::time::timeout(self.connect_timeout, open_stream(info)) => {
                match result {
                    Ok(Ok(s)) => s,
                    Ok(Err(e)) => return Err(e),
                    Err(_) => return Err(DataChannelError::Timeout),
                }
            }
        };
        debug!(%addr, secured = info.secured, "side channel connected");
        Ok(stream)
    }

    /// Reads one batch of frames from the announced endpoint.
    pub async fn download(
        &self,
        info: &ConnInfo,
        cancel: &CancellationToken,
    ) -> Result<Vec<Frame>, DataChannelError> {
        let mut stream = self.connect(info, cancel).await?;

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DataChannelError::Cancelled),
            result = tokio::time::timeout(self.transfer_timeout, read_batch(&mut stream)) => {
                result.unwrap_or(Err(DataChannelError::Timeout))
            }
        };

        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "side channel: shutdown after download failed");
        }

        if let Ok(frames) = &result {
            let bytes: usize = frames.iter().map(|f| f.payload.len()).sum();
            info!(addr = %info.addr(), frames = frames.len(), bytes, "side channel: batch received");
        }
        result
    }

    /// Writes `payload` as a single frame and closes the socket.
    pub async fn upload(
        &self,
        info: &ConnInfo,
        header: &FrameHeader,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), DataChannelError> {
        let stream = self.connect(info, cancel).await?;
        let mut writer = BufWriter::with_capacity(SIDE_BUFFER_SIZE, stream);

        let send = async {
            write_frame(&mut writer, header, payload).await?;
            writer.flush().await?;
            writer.shutdown().await?;
            Ok::<_, DataChannelError>(())
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DataChannelError::Cancelled),
            result = tokio::time::timeout(self.transfer_timeout, send) => {
                result.unwrap_or(Err(DataChannelError::Timeout))?;
            }
        }

        info!(addr = %info.addr(), bytes = payload.len(), "side channel: upload sent");
        Ok(())
    }
}

async fn open_stream(info: &ConnInfo) -> Result<BoxedStream, DataChannelError> {
    let tcp = TcpStream::connect((info.ip.as_str(), info.port)).await?;
    tcp.set_nodelay(true)?;
    if !info.secured {
        return Ok(Box::pin(tcp));
    }

    let server_name = ServerName::try_from(info.ip.clone())
        .map_err(|e| DataChannelError::Tls(format!("invalid server name {}: {e}", info.ip)))?;
    let connector = TlsConnector::from(insecure_client_config()?);
    let tls = connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| DataChannelError::Tls(e.to_string()))?;
    Ok(Box::pin(tls))
}
