use thiserror::Error;

/// Failures of a position store backend. The cache layer downgrades every
/// one of these to a miss (on read) or a no-op (on write).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("position store unavailable: {0}")]
    Unavailable(String),

    #[error("position store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("position store payload is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Raised when two path descriptors cannot be morphed into one another.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("subpath count differs ({from} vs {to})")]
    SubpathMismatch { from: usize, to: usize },

    #[error("path does not start with a move command")]
    MissingMove,
}

/// Raised when topology input cannot be read at all.
#[derive(Error, Debug)]
pub enum TopologyError {
    #[error("failed to read topology: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse topology: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let errors = vec![
            (
                StoreError::Unavailable("locked".into()).to_string(),
                "position store unavailable: locked",
            ),
            (PathError::Empty.to_string(), "path is empty"),
            (
                PathError::SubpathMismatch { from: 1, to: 2 }.to_string(),
                "subpath count differs (1 vs 2)",
            ),
        ];

        for (actual, expected) in errors {
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn topology_error_from_json() {
        let parsed: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let error: TopologyError = parsed.unwrap_err().into();
        assert!(matches!(error, TopologyError::Parse(_)));
    }
}
