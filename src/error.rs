// THEORY:
// A single error type for the whole library. Every fallible step (loading a
// stack, writing artifacts, parsing a config, driving the batch workers)
// reports through `FlickerError`, so callers can use `?` across module
// boundaries. The binary wraps these in `anyhow` for context.
//
// Note what is *not* an error here: a constant frame stack, a run that ends
// with zero validated flickers, or a flicker with a perfectly flat masked
// region. Those are legitimate analysis outcomes and are modelled as values.

use std::path::PathBuf;

/// The flicker_vision error type.
#[derive(thiserror::Error, Debug)]
pub enum FlickerError {
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
    #[error("TIFF error: {source}")]
    Tiff {
        #[from]
        source: tiff::TiffError,
    },
    #[error("JSON serialization error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
    #[error("TOML deserialization error: {source}")]
    TomlDe {
        #[from]
        source: toml::de::Error,
    },
    #[error("frame stack is empty")]
    EmptyStack,
    #[error("frame dimensions {width}x{height} do not match expected {expected_width}x{expected_height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        expected_width: u32,
        expected_height: u32,
    },
    #[error("buffer of {len} samples is not a whole number of {width}x{height} frames")]
    RaggedBuffer { len: usize, width: u32, height: u32 },
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("frame {frame} submitted after frame {last}; frames must arrive in index order")]
    OutOfOrderFrame { frame: usize, last: usize },
    #[error("reference image {} could not be loaded: {source}", path.display())]
    Reference {
        path: PathBuf,
        source: Box<FlickerError>,
    },
    #[error("worker pool failure: {0}")]
    WorkerPool(String),
}

pub type Result<T> = std::result::Result<T, FlickerError>;
