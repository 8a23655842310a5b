//! Side-channel wire format.
//!
//! # Wire format
//!
//! ```text
//! PER FRAME:
//!   [4 bytes BE: header_len]
//!   [header_len bytes: UTF-8 JSON header]
//!   [fileLength bytes: raw payload]
//! ```
//!
//! A download is a batch of frames; the header's `total` says how many.
//! Uploads are a single frame whose header carries the session key.

use frameart_protocol::constants::{UPLOAD_FILE_NAME, UPLOAD_HEADER_VERSION};
use frameart_protocol::json::lenient;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::DataChannelError;

/// Largest header accepted from a device (1 MiB).
pub const MAX_HEADER_LEN: usize = 1024 * 1024;

/// Largest payload accepted from a device (64 MiB).
pub const MAX_PAYLOAD_LEN: u64 = 64 * 1024 * 1024;

/// JSON header preceding each payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameHeader {
    #[serde(default, deserialize_with = "lenient::u32")]
    pub num: u32,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub total: u32,
    #[serde(rename = "fileLength", deserialize_with = "lenient::u64")]
    pub file_length: u64,
    #[serde(rename = "fileID", default, skip_serializing_if = "Option::is_none")]
    pub file_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<String>,
    #[serde(rename = "fileType", default, skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
    #[serde(rename = "fileName", default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(rename = "secKey", default, skip_serializing_if = "Option::is_none")]
    pub sec_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl FrameHeader {
    /// Header of a single-frame upload.
    pub fn upload(file_length: u64, file_type: &str, sec_key: Option<String>) -> Self {
        Self {
            num: 0,
            total: 1,
            file_length,
            file_type: Some(file_type.to_owned()),
            file_name: Some(UPLOAD_FILE_NAME.into()),
            sec_key,
            version: Some(UPLOAD_HEADER_VERSION.into()),
            ..Default::default()
        }
    }

    /// Key under which a downloaded frame is stored: `{id}.{type}`.
    pub fn file_name(&self) -> String {
        let id = self
            .file_id
            .as_deref()
            .or(self.content_id.as_deref())
            .unwrap_or("unknown");
        let ext = self.file_type.as_deref().unwrap_or("jpg");
        format!("{id}.{ext}")
    }
}

/// A header and its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

/// Serializes `header` with its 4-byte big-endian length prefix.
pub fn encode_header(header: &FrameHeader) -> Result<Vec<u8>, DataChannelError> {
    let json = serde_json::to_vec(header)?;
    let len = u32::try_from(json.len())
        .map_err(|_| DataChannelError::Protocol(format!("header too long: {} bytes", json.len())))?;
    let mut buf = Vec::with_capacity(4 + json.len());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&json);
    Ok(buf)
}

/// Fills `buf` completely, reporting how far a short read got.
async fn read_full<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<(), DataChannelError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(DataChannelError::Incomplete {
                expected: buf.len(),
                received: filled,
            });
        }
        filled += n;
    }
    Ok(())
}

/// Reads one length-prefixed JSON header.
pub async fn read_header<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<FrameHeader, DataChannelError> {
    let mut len_buf = [0u8; 4];
    read_full(reader, &mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_HEADER_LEN {
        return Err(DataChannelError::Protocol(format!(
            "header too long: {len} bytes (max {MAX_HEADER_LEN})"
        )));
    }

    let mut json = vec![0u8; len];
    read_full(reader, &mut json).await?;
    Ok(serde_json::from_slice(&json)?)
}

/// Reads a header and exactly `fileLength` payload bytes.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Frame, DataChannelError> {
    let header = read_header(reader).await?;
    if header.file_length > MAX_PAYLOAD_LEN {
        return Err(DataChannelError::Protocol(format!(
            "payload too long: {} bytes (max {MAX_PAYLOAD_LEN})",
            header.file_length
        )));
    }

    let mut payload = vec![0u8; header.file_length as usize];
    read_full(reader, &mut payload).await?;
    debug!(
        num = header.num,
        total = header.total,
        size = payload.len(),
        "side channel: frame read"
    );
    Ok(Frame { header, payload })
}

/// Reads frames until as many as the latest declared `total` have arrived.
///
/// `num` is not used for termination, so out-of-order frames are fine.
pub async fn read_batch<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Vec<Frame>, DataChannelError> {
    let mut frames = Vec::new();
    let mut total = 1usize;
    while frames.len() < total {
        let frame = read_frame(reader).await?;
        total = (frame.header.total as usize).max(1);
        frames.push(frame);
    }
    Ok(frames)
}

/// Writes the length-prefixed header followed by `payload`.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &FrameHeader,
    payload: &[u8],
) -> Result<(), DataChannelError> {
    if header.file_length != payload.len() as u64 {
        return Err(DataChannelError::Protocol(format!(
            "fileLength {} does not match payload of {} bytes",
            header.file_length,
            payload.len()
        )));
    }
    writer.write_all(&encode_header(header)?).await?;
    writer.write_all(payload).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thumb(num: u32, total: u32, id: &str, payload: &[u8]) -> (FrameHeader, Vec<u8>) {
        let header = FrameHeader {
            num,
            total,
            file_length: payload.len() as u64,
            file_id: Some(id.into()),
            file_type: Some("jpg".into()),
            ..Default::default()
        };
        (header, payload.to_vec())
    }

    #[tokio::test]
    async fn header_prefix_is_big_endian_length() {
        let header = FrameHeader::upload(12_345, "png", Some("k1".into()));
        let buf = encode_header(&header).unwrap();
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, buf.len() - 4);

        let json: serde_json::Value = serde_json::from_slice(&buf[4..]).unwrap();
        assert_eq!(json["fileLength"], 12_345);
        assert_eq!(json["secKey"], "k1");
        assert_eq!(json["fileName"], "dummy");
        assert_eq!(json["version"], "0.0.1");
        assert_eq!(json["num"], 0);
        assert_eq!(json["total"], 1);

        let mut cursor = &buf[..];
        assert_eq!(read_header(&mut cursor).await.unwrap(), header);
    }

    #[tokio::test]
    async fn numeric_strings_accepted() {
        let json = br#"{"num":"0","total":"1","fileLength":"3","content_id":"SAM-1"}"#;
        let mut buf = (json.len() as u32).to_be_bytes().to_vec();
        buf.extend_from_slice(json);
        buf.extend_from_slice(b"abc");

        let mut cursor = &buf[..];
        let frame = read_frame(&mut cursor).await.unwrap();
        assert_eq!(frame.payload, b"abc");
        assert_eq!(frame.header.file_name(), "SAM-1.jpg");
    }

    #[tokio::test]
    async fn batch_reads_declared_total() {
        let mut buf = Vec::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let (h, p) = thumb(i as u32, 3, id, id.as_bytes());
            write_frame(&mut buf, &h, &p).await.unwrap();
        }
        // Trailing bytes belong to nothing and must be left unread.
        buf.extend_from_slice(b"junk");

        let mut cursor = &buf[..];
        let frames = read_batch(&mut cursor).await.unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].header.file_name(), "c.jpg");
        assert_eq!(cursor, b"junk");
    }

    #[tokio::test]
    async fn batch_tolerates_out_of_order_indices() {
        let mut buf = Vec::new();
        for (num, id) in [(1, "second"), (0, "first")] {
            let (h, p) = thumb(num, 2, id, b"x");
            write_frame(&mut buf, &h, &p).await.unwrap();
        }
        let mut cursor = &buf[..];
        let frames = read_batch(&mut cursor).await.unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].header.file_id.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn short_payload_is_incomplete() {
        let (h, _) = thumb(0, 1, "a", &[0u8; 10]);
        let mut buf = encode_header(&h).unwrap();
        buf.extend_from_slice(&[1, 2, 3, 4]);

        let mut cursor = &buf[..];
        let err = read_frame(&mut cursor).await.unwrap_err();
        assert!(matches!(
            err,
            DataChannelError::Incomplete { expected: 10, received: 4 }
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn truncated_prefix_is_incomplete() {
        let mut cursor: &[u8] = &[0, 0];
        let err = read_header(&mut cursor).await.unwrap_err();
        assert!(err.is_partial_read());
    }

    #[tokio::test]
    async fn oversized_header_rejected() {
        let mut cursor: &[u8] = &((MAX_HEADER_LEN as u32 + 1).to_be_bytes());
        let err = read_header(&mut cursor).await.unwrap_err();
        assert!(matches!(err, DataChannelError::Protocol(_)));
    }

    #[tokio::test]
    async fn malformed_header_json() {
        let mut buf = 5u32.to_be_bytes().to_vec();
        buf.extend_from_slice(b"{oops");
        let mut cursor = &buf[..];
        let err = read_header(&mut cursor).await.unwrap_err();
        assert!(matches!(err, DataChannelError::Json(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn write_frame_checks_length() {
        let header = FrameHeader::upload(5, "png", None);
        let mut buf = Vec::new();
        assert!(write_frame(&mut buf, &header, b"abc").await.is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn file_name_defaults() {
        assert_eq!(FrameHeader::default().file_name(), "unknown.jpg");
        let h = FrameHeader {
            content_id: Some("MY_F1".into()),
            file_type: Some("png".into()),
            ..Default::default()
        };
        assert_eq!(h.file_name(), "MY_F1.png");
    }
}
