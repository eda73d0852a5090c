//! Live-video gateway
//!
//! `camgate` pulls frames from network cameras (RTSP/RTMP, HTTP, local files or
//! webcam indices) and re-exposes each source as a browser-friendly
//! `multipart/x-mixed-replace` JPEG stream.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<CameraRegistry>
//!                 ┌─────────────────────────────┐
//!                 │ sessions: HashMap<SourceId,  │
//!                 │   Arc<CameraSession> {       │
//!                 │     slot: FrameSlot,         │
//!                 │     capture task + token,    │
//!                 │   }                          │
//!                 │ >                            │
//!                 └──────────────┬──────────────┘
//!                                │
//!        ┌───────────────────────┼───────────────────────┐
//!        ▼                       ▼                       ▼
//!  [capture task]          [viewer stream]         [viewer stream]
//!  handle.read()           slot.get_frame()        slot.get_frame()
//!        │                       │                       │
//!        └──► encode ──► slot.publish()          ──► --frame parts ──► HTTP
//! ```
//!
//! The idle reaper runs beside the registry and evicts sessions nobody has
//! looked at for a while.

pub mod capture;
pub mod codec;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod stream;
pub mod testpattern;

pub use capture::{SourceKind, SourceOpener};
pub use error::{Error, Result};
pub use registry::{CameraRegistry, RegistryConfig};
pub use server::{GatewayServer, ServerConfig};
pub use session::{CameraSession, CaptureState, Frame, SessionConfig, SourceId, StreamStatus};
