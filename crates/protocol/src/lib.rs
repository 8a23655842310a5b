//! Wire protocol types for the Frame Art control channel.
//!
//! Covers the outer `ms.channel.*` envelopes, the inner art-app requests and
//! responses carried inside them, and the connection descriptors used to set
//! up side-channel transfers. Nothing in this crate performs I/O.

pub mod constants;
pub mod envelope;
pub mod json;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::RequestKind;
pub use envelope::{ChannelMessage, OutboundCommand};
pub use json::{ProtocolError, decode_if_string};
pub use messages::{ArtRequest, ServiceEvent, ServiceMessage};
pub use types::{
    ArtMode, ConnInfo, ConnInfoRequest, ContentItem, CurrentArtwork, DeviceInfo, DeviceStatus,
    MatteList, SlideshowConfig,
};
