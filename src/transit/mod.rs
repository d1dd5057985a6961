//! Realtime transit feed: authenticated fetch, protobuf decode, and the
//! domain entities the snapshot carries.

pub mod client;
pub mod decode;
pub mod model;

pub use client::TransitClient;
pub use decode::decode;
pub use model::{ServiceAlert, TripStatus};
