//! Client SDK for the hush chat relay.
//!
//! Provides the per-line frame cipher shared by clients and the server,
//! plus a small async client suitable for bots, tooling, and tests.

pub mod client;
pub mod frame;

pub use client::Client;
pub use frame::{FrameCipher, FrameError, FRAME_PREFIX};
