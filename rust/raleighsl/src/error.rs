// raleighsl: store error kinds

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

/// Error kinds surfaced by store operations. `Truncated` never reaches a
/// client; the framing layer consumes it as "keep reading".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("allocation failed")]
    NoMemory,
    #[error("object or name not found")]
    NotFound,
    #[error("name already exists")]
    AlreadyExists,
    #[error("operation not supported")]
    NotSupported,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("concurrent update conflict")]
    ConcurrencyConflict,
    #[error("more data required")]
    Truncated,
    #[error("validation failed: {0}")]
    Corrupt(String),
    #[error("device failure: {0}")]
    Io(String),
}

impl StoreError {
    /// Stable numeric code carried in response error fields.
    pub fn code(&self) -> u16 {
        match self {
            StoreError::NoMemory => 1,
            StoreError::NotFound => 2,
            StoreError::AlreadyExists => 3,
            StoreError::NotSupported => 4,
            StoreError::InvalidArgument(_) => 5,
            StoreError::ConcurrencyConflict => 6,
            StoreError::Truncated => 7,
            StoreError::Corrupt(_) => 8,
            StoreError::Io(_) => 9,
        }
    }

    pub fn from_code(code: u16) -> Option<StoreError> {
        match code {
            1 => Some(StoreError::NoMemory),
            2 => Some(StoreError::NotFound),
            3 => Some(StoreError::AlreadyExists),
            4 => Some(StoreError::NotSupported),
            5 => Some(StoreError::InvalidArgument(String::new())),
            6 => Some(StoreError::ConcurrencyConflict),
            7 => Some(StoreError::Truncated),
            8 => Some(StoreError::Corrupt(String::new())),
            9 => Some(StoreError::Io(String::new())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for code in 1..=9u16 {
            let err = StoreError::from_code(code).unwrap();
            assert_eq!(err.code(), code);
        }
        assert_eq!(StoreError::from_code(0), None);
        assert_eq!(StoreError::from_code(100), None);
    }
}
