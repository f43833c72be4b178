use thiserror::Error;

/// Coarse classification of [`CkksError`], used by callers that only need to
/// know whether a run failed because of its parameters, its depth budget, a
/// mis-sequenced operation or a key mix-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    DepthExhaustion,
    Alignment,
    Key,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CkksError {
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Input too long: got {got}, max {max}")]
    InputTooLong { got: usize, max: usize },

    #[error("Rotation by {steps} exceeds slot count {slots}")]
    RotationOutOfRange { steps: i64, slots: usize },

    #[error("No rotation key for step {step}")]
    MissingRotationKey { step: i64 },

    #[error(
        "Depth exhausted at level {level}: {required} more level(s) required, {available} available"
    )]
    DepthExhausted {
        level: usize,
        required: usize,
        available: usize,
    },

    #[error("Scale 2^{scale_bits:.2} exceeds the 2^{modulus_bits} modulus at level {level}")]
    ScaleOutOfBounds {
        level: usize,
        scale_bits: f64,
        modulus_bits: u32,
    },

    #[error("Level mismatch: expected {expected}, got {actual}")]
    LevelMismatch { expected: usize, actual: usize },

    #[error("Scale mismatch: expected {expected:.2}, got {actual:.2}")]
    ScaleMismatch { expected: f64, actual: f64 },

    #[error("Cannot mod-switch from level {current} up to level {target}")]
    InvalidModSwitch { current: usize, target: usize },

    #[error("Ciphertext of size {size} must be relinearized first")]
    NotRelinearized { size: usize },

    #[error("Ciphertext was produced under a different key set")]
    KeyMismatch,
}

impl CkksError {
    pub fn invalid(message: impl Into<String>) -> Self {
        CkksError::InvalidParameter {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CkksError::InvalidParameter { .. }
            | CkksError::InputTooLong { .. }
            | CkksError::RotationOutOfRange { .. }
            | CkksError::MissingRotationKey { .. } => ErrorKind::Configuration,
            CkksError::DepthExhausted { .. } | CkksError::ScaleOutOfBounds { .. } => {
                ErrorKind::DepthExhaustion
            }
            CkksError::LevelMismatch { .. }
            | CkksError::ScaleMismatch { .. }
            | CkksError::InvalidModSwitch { .. }
            | CkksError::NotRelinearized { .. } => ErrorKind::Alignment,
            CkksError::KeyMismatch => ErrorKind::Key,
        }
    }
}

pub type CkksResult<T> = Result<T, CkksError>;
