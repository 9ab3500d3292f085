use crate::image::FrameShape;

pub type Result<T> = std::result::Result<T, TrackError>;

#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("frame shape mismatch: session is {expected}, got {found}")]
    DimensionMismatch {
        expected: FrameShape,
        found: FrameShape,
    },

    #[error("unsupported channel count {0}, expected 1 or 3")]
    UnsupportedChannels(usize),

    #[error("frame buffer holds {len} bytes, expected {expected} for {shape}")]
    InvalidFrame {
        shape: FrameShape,
        len: usize,
        expected: usize,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
