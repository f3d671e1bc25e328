/// Errors produced while turning audio into features, training a predictor, and
/// rendering generated sequences.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not enough time-frames to form a single window and its target.
    #[error("insufficient data: {frames} frames cannot fill a window of {sequence_length} plus a target")]
    InsufficientData {
        frames: usize,
        sequence_length: usize,
    },

    /// A normalization divisor came out as zero.
    #[error("degenerate input: maximum absolute value of {what} is zero")]
    DegenerateInput { what: &'static str },

    /// A window, vector, or matrix had the wrong shape.
    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    /// Invalid parameter value.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// Decoding produced no samples.
    #[error("audio data is empty")]
    EmptyAudio,

    /// The input file is not a format we can decode.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The audio decoder rejected the input.
    #[error("failed to decode audio: {0}")]
    Decode(String),

    /// The model backend failed.
    #[error("model error: {0}")]
    Model(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Midi(#[from] midly::Error),
}

impl Error {
    pub(crate) fn shape(expected: impl ToString, got: impl ToString) -> Error {
        Error::ShapeMismatch {
            expected: expected.to_string(),
            got: got.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
