//! Camera registry
//!
//! The registry maps source identifiers to camera sessions. The first request
//! for a source creates its session; later requests share it. Sessions leave
//! the registry only through an explicit stop or idle eviction.
//!
//! # Locking
//!
//! The registry lock guards the map only. Session internals (frame slot,
//! lifecycle, counters) carry their own synchronisation, so one slow camera
//! never serialises the others. Sessions are removed from the map under the
//! lock and shut down after it is released.

pub mod config;
pub mod store;

pub use config::RegistryConfig;
pub use store::CameraRegistry;
