use std::fmt;

/// Errors raised by hashing, address and recovery helpers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    InvalidLength { expected: usize, got: usize },
    ExtraTooShort { min: usize, got: usize },
    InvalidSignature,
    RecoveryFailed,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoError::InvalidLength { expected, got } => {
                write!(f, "invalid byte length: expected {expected}, got {got}")
            }
            CryptoError::ExtraTooShort { min, got } => {
                write!(f, "header extra too short: need at least {min} bytes, got {got}")
            }
            CryptoError::InvalidSignature => write!(f, "malformed signature bytes"),
            CryptoError::RecoveryFailed => write!(f, "signature recovery failed"),
        }
    }
}

impl std::error::Error for CryptoError {}
