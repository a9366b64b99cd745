use thiserror::Error;

/// Why a tile request did not produce a bitmap.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TileError {
    /// The worker reported an ERROR for this request.
    #[error("tile generation failed: {0}")]
    Generation(String),
    /// The client was torn down before the response arrived.
    #[error("request cancelled by worker teardown")]
    Cancelled,
    /// There is no worker to ask (unsupported environment or a dead thread).
    #[error("render worker unavailable")]
    WorkerUnavailable,
    #[error("batch of {requested} tiles exceeds cache capacity {capacity}")]
    BatchTooLarge { requested: usize, capacity: usize },
    #[error("tile {0} missing from cache after batch request")]
    Missing(usize),
    #[error("timed out waiting for {0} tile(s)")]
    Timeout(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
