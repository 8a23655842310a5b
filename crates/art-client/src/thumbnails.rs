//! Thumbnail downloads over the side channel.

use std::collections::HashMap;
use std::time::Duration;

use tracing::debug;

use frameart_data_channel::Frame;
use frameart_protocol::constants::{
    CATEGORY_FAVOURITES, DEFAULT_TIMEOUT, LIST_TIMEOUT, THUMBNAIL_TIMEOUT, is_store_content,
};
use frameart_protocol::types::ConnInfoRequest;
use frameart_protocol::{ArtRequest, RequestKind};

use crate::art::{ArtClient, content_id_list};
use crate::error::ArtError;

/// Pause after the store warm-up request.
const WARM_UP_DELAY: Duration = Duration::from_millis(100);

impl ArtClient {
    /// Thumbnails keyed by `{id}.{type}`. Empty on any failure.
    pub async fn get_thumbnail_list(&self, content_ids: &[&str]) -> HashMap<String, Vec<u8>> {
        match self.fetch_thumbnail_list(content_ids).await {
            Ok(thumbnails) => thumbnails,
            Err(e) => {
                debug!(count = content_ids.len(), error = %e, "thumbnail list failed");
                HashMap::new()
            }
        }
    }

    pub async fn fetch_thumbnail_list(
        &self,
        content_ids: &[&str],
    ) -> Result<HashMap<String, Vec<u8>>, ArtError> {
        let frames = self.download(list_request(content_ids), LIST_TIMEOUT).await?;
        Ok(frames
            .into_iter()
            .map(|frame| (frame.header.file_name(), frame.payload))
            .collect())
    }

    pub async fn get_thumbnail(&self, content_id: &str) -> Option<Vec<u8>> {
        match self.fetch_thumbnail(content_id).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!(content_id, error = %e, "no thumbnail");
                None
            }
        }
    }

    /// Fetches one thumbnail: list form first, legacy form as fallback.
    ///
    /// Store content is warmed up with a favourites listing and its list
    /// transfer is retried on reset or short read.
    pub async fn fetch_thumbnail(&self, content_id: &str) -> Result<Vec<u8>, ArtError> {
        let store = is_store_content(content_id);
        if store {
            debug!(content_id, "warming up store content");
            let warm_up = ArtRequest::new(RequestKind::GetContentList)
                .with("category", CATEGORY_FAVOURITES);
            let _ = self.call(warm_up, None, DEFAULT_TIMEOUT).await;
            tokio::time::sleep(WARM_UP_DELAY).await;
        }

        match self.thumbnail_via_list(content_id, store).await {
            Ok(bytes) if !bytes.is_empty() => return Ok(bytes),
            Ok(_) => debug!(content_id, "thumbnail list came back empty"),
            Err(e) => debug!(content_id, error = %e, "thumbnail list failed, trying get_thumbnail"),
        }

        let request = ArtRequest::new(RequestKind::GetThumbnail).with("content_id", content_id);
        let frames = self.download(request, THUMBNAIL_TIMEOUT).await?;
        first_payload(frames).ok_or_else(|| ArtError::Empty(content_id.to_owned()))
    }

    async fn thumbnail_via_list(&self, content_id: &str, store: bool) -> Result<Vec<u8>, ArtError> {
        let retry = self.config().store_retry;
        let mut attempt = 0;
        loop {
            match self.download(list_request(&[content_id]), LIST_TIMEOUT).await {
                Ok(frames) => return Ok(first_payload(frames).unwrap_or_default()),
                Err(e) if store && e.is_retryable() && attempt < retry.max_retries => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    debug!(content_id, attempt, ?delay, error = %e, "retrying store thumbnail");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends `request` with a fresh `conn_info` and reads the announced batch.
    async fn download(&self, request: ArtRequest, timeout: Duration) -> Result<Vec<Frame>, ArtError> {
        let id = uuid::Uuid::new_v4().to_string();
        let request = request.with_conn_info(ConnInfoRequest::new(id));
        let reply = self.channel.request(request, None, timeout).await?;
        let info = reply.conn_info()?;
        let frames = self
            .config()
            .side_channel
            .download(&info, &self.transfer_token())
            .await?;
        Ok(frames)
    }
}

fn list_request(content_ids: &[&str]) -> ArtRequest {
    ArtRequest::new(RequestKind::GetThumbnailList)
        .with("content_id_list", content_id_list(content_ids))
}

fn first_payload(frames: Vec<Frame>) -> Option<Vec<u8>> {
    frames
        .into_iter()
        .next()
        .map(|frame| frame.payload)
        .filter(|payload| !payload.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use frameart_data_channel::FrameHeader;

    #[test]
    fn list_request_carries_ids() {
        let req = list_request(&["MY_F1", "SAM-S2"]);
        assert_eq!(req.kind(), RequestKind::GetThumbnailList);
        assert_eq!(
            req.get("content_id_list"),
            Some(&serde_json::json!([{"content_id": "MY_F1"}, {"content_id": "SAM-S2"}]))
        );
    }

    #[test]
    fn first_payload_skips_empty_batches() {
        assert_eq!(first_payload(Vec::new()), None);
        let empty = Frame {
            header: FrameHeader::default(),
            payload: Vec::new(),
        };
        assert_eq!(first_payload(vec![empty]), None);
        let full = Frame {
            header: FrameHeader::default(),
            payload: vec![1, 2, 3],
        };
        assert_eq!(first_payload(vec![full]), Some(vec![1, 2, 3]));
    }
}
