//! Socket pumps of the control channel.

pub(crate) mod read;
pub(crate) mod write;
