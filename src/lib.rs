pub mod config;
pub mod error;
pub mod fetch;
pub mod scheduler;
pub mod snapshot;
pub mod transit;
pub mod weather;

pub mod gtfs_rt {
    include!(concat!(env!("OUT_DIR"), "/transit_realtime.rs"));
}
