//! Protobuf decoder for the realtime transit feed.

use prost::Message;

use crate::error::DecodeError;
use crate::gtfs_rt::FeedMessage;

/// Decodes a protobuf-encoded [`FeedMessage`] from raw bytes.
///
/// Pure and deterministic: identical bytes always yield an identical message.
/// Unknown fields are skipped per protobuf rules, so feeds may add fields
/// without breaking us; [`DecodeError`] is reserved for structurally invalid
/// input.
pub fn decode(bytes: &[u8]) -> Result<FeedMessage, DecodeError> {
    Ok(FeedMessage::decode(bytes)?)
}
