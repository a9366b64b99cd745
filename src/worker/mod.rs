//! The render worker: one long-lived thread that owns a copy of the audio
//! and renders tiles on request, plus the client that talks to it.

mod client;
pub mod protocol;
mod render_thread;

pub use client::{TileReply, WorkerClient};
pub use protocol::{RequestId, WorkerRequest, WorkerResponse};
