//! Messages across the worker boundary. Both directions are closed enums;
//! payloads are moved, never shared.

use spectile_core::{TileBitmap, TileGenerationParams};

/// Correlates a `GetTile` with its reply. Increments per client instance.
pub type RequestId = u64;

#[derive(Debug)]
pub enum WorkerRequest {
    /// Replace the worker's audio. The samples are moved into the worker.
    Init { samples: Vec<f32>, sample_rate: u32 },
    /// Palette bytes applied to every subsequent render.
    SetPalette { palette: Vec<u8> },
    /// Render one tile; answered by exactly one `TileReady` or `Error`.
    GetTile { req_id: RequestId, params: TileGenerationParams },
}

#[derive(Debug)]
pub enum WorkerResponse {
    /// Ownership of the bitmap passes to the client.
    TileReady { req_id: RequestId, bitmap: TileBitmap },
    Error { req_id: RequestId, message: String },
}

impl WorkerResponse {
    pub fn req_id(&self) -> RequestId {
        match self {
            WorkerResponse::TileReady { req_id, .. } | WorkerResponse::Error { req_id, .. } => *req_id,
        }
    }
}
