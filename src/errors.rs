/// Domain-specific error types for the chain engine.
/// Tick application never surfaces these: it reports a `TickOutcome` instead.
/// The engine must:
/// - Keep draining and applying ticks on recoverable errors
/// - Refuse to start a chain that has no instruments
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("instrument list error: {0}")]
    Instruments(String),

    #[error("no instruments found for index {index}")]
    EmptyChain { index: String },

    #[error("malformed tick: {0}")]
    MalformedTick(String),

    #[error("io error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        EngineError::Parse(e.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let json_err = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        assert!(matches!(EngineError::from(json_err), EngineError::Parse(_)));

        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = EngineError::from(io_err);
        assert_eq!(err.to_string(), "io error: gone");

        let empty = EngineError::EmptyChain { index: "SENSEX".into() };
        assert_eq!(empty.to_string(), "no instruments found for index SENSEX");
    }
}
