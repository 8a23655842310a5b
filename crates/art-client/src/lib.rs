//! Async client for the art app of Samsung Frame TVs.
//!
//! Provides the WebSocket control channel with request correlation,
//! side-channel thumbnail and upload transfers, and the [`ArtClient`]
//! facade exposing the art-mode operations.

pub mod art;
pub mod channel;
pub mod config;
pub mod correlator;
pub mod error;
pub mod policy;
pub mod probe;
mod pumps;
mod thumbnails;
pub mod upload;

pub use art::ArtClient;
pub use channel::ControlChannel;
pub use config::{ArtConfig, RetryPolicy};
pub use correlator::{PendingRequests, Waiter};
pub use error::{ArtError, ChannelError, ProbeError, RequestError};
pub use policy::{FetchOutcome, FetchVerdict, ThumbnailFetchPolicy};
pub use probe::DeviceProbe;
pub use upload::UploadOptions;

pub use frameart_data_channel::SideChannel;
pub use frameart_protocol::{ArtMode, ContentItem, CurrentArtwork, DeviceInfo, MatteList, SlideshowConfig};
