//! MeshPilot host transport — framed, single-flight TCP to Blender.
//!
//! Wire format: concatenated top-level JSON objects, no length prefix.
//! Requests look like `{"type": "<command>", "params": {...}}`; responses
//! are routed to the single pending request.

pub mod client;
pub mod framing;

pub use client::{HostClient, HostClientConfig, LinkState};
pub use framing::{FrameBuffer, FramingError, MAX_IDLE_BUFFER};
