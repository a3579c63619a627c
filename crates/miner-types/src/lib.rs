//! Shared types, errors, resources and geometry capability for the miner engine.
//!
//! This crate provides the foundational types used across the other miner crates:
//! - `MinerError`: unified error taxonomy
//! - `Keyword` / `KeywordMap`: case-insensitive, multi-valued attribute storage
//! - `Resource` / `ResourceList`: shared records with handle-local discard status
//! - `Geometry` / `GeometryFactory`: the geometry capability consumed by strategies

pub mod geometry;
pub mod keyword;
pub mod resource;

pub use geometry::{Bounds, Geometry, GeometryFactory, SharedGeometry};
pub use keyword::{is_null_value, Keyword, KeywordMap};
pub use resource::{Asset, Resource, ResourceList, SharedResource};

/// Unified error type for all miner subsystems.
#[derive(Debug, thiserror::Error)]
pub enum MinerError {
    // === Configuration ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("PVL parse error at line {line}, col {col}: {message}")]
    ParseError {
        line: usize,
        col: usize,
        message: String,
        source_snippet: Option<String>,
    },

    // === Lookup ===
    #[error("Not found: {0}")]
    NotFound(String),

    // === Per-record failures ===
    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Command '{command}' failed: {message}")]
    ExternalProcess { command: String, message: String },

    // === Origin context ===
    #[error("Strategy '{name}' ({strategy_type}) failed: {message}")]
    Strategy {
        name: String,
        strategy_type: String,
        message: String,
    },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl MinerError {
    /// Taxonomy name of the error.
    pub fn kind(&self) -> &'static str {
        match self {
            MinerError::Config(_) => "ConfigError",
            MinerError::ParseError { .. } => "ParseError",
            MinerError::NotFound(_) => "NotFoundError",
            MinerError::Geometry(_) => "GeometryError",
            MinerError::Evaluation(_) => "EvaluationError",
            MinerError::ExternalProcess { .. } => "ExternalProcessError",
            MinerError::Strategy { .. } => "StrategyError",
            MinerError::Io(_) => "IoError",
            MinerError::Json(_) => "JsonError",
            MinerError::Other(_) => "Error",
        }
    }

    /// Returns `true` for failures that discard a single record rather than
    /// aborting the run.
    pub fn is_contained(&self) -> bool {
        matches!(
            self,
            MinerError::Geometry(_) | MinerError::Evaluation(_) | MinerError::ExternalProcess { .. }
        )
    }

    /// Returns `true` for errors raised while building a run.
    pub fn is_config(&self) -> bool {
        matches!(self, MinerError::Config(_) | MinerError::ParseError { .. })
    }

    /// Attach the originating strategy to this error. Errors that already
    /// carry an origin are returned unchanged so the innermost strategy wins.
    pub fn in_strategy(self, name: &str, strategy_type: &str) -> MinerError {
        match self {
            err @ MinerError::Strategy { .. } => err,
            other => MinerError::Strategy {
                name: name.to_string(),
                strategy_type: strategy_type.to_string(),
                message: format!("{} [{}]", other, other.kind()),
            },
        }
    }
}

/// A convenience alias for `Result<T, MinerError>`.
pub type Result<T> = std::result::Result<T, MinerError>;

/// Parse a configuration boolean (`true/false`, `yes/no`, `on/off`, `1/0`).
pub fn to_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" | "t" | "y" => Ok(true),
        "false" | "no" | "off" | "0" | "f" | "n" => Ok(false),
        other => Err(MinerError::Config(format!(
            "'{other}' is not a valid boolean value"
        ))),
    }
}

/// Parse a numeric attribute value.
pub fn to_double(value: &str) -> Result<f64> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| MinerError::Evaluation(format!("'{value}' is not a numeric value")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_config() {
        let err = MinerError::Config("missing Keyword".into());
        assert_eq!(err.to_string(), "Configuration error: missing Keyword");
        assert_eq!(err.kind(), "ConfigError");
    }

    #[test]
    fn error_display_parse_error() {
        let err = MinerError::ParseError {
            line: 3,
            col: 7,
            message: "expected End_Object".into(),
            source_snippet: None,
        };
        assert_eq!(
            err.to_string(),
            "PVL parse error at line 3, col 7: expected End_Object"
        );
    }

    #[test]
    fn error_display_external_process() {
        let err = MinerError::ExternalProcess {
            command: "false".into(),
            message: "exit status 1".into(),
        };
        assert_eq!(err.to_string(), "Command 'false' failed: exit status 1");
        assert_eq!(err.kind(), "ExternalProcessError");
    }

    #[test]
    fn contained_errors() {
        assert!(MinerError::Evaluation("x".into()).is_contained());
        assert!(MinerError::Geometry("x".into()).is_contained());
        assert!(!MinerError::Config("x".into()).is_contained());
        assert!(!MinerError::NotFound("x".into()).is_contained());
    }

    #[test]
    fn in_strategy_wraps_with_origin() {
        let err = MinerError::NotFound("keyword Area".into()).in_strategy("Sorter", "NumericalSort");
        match &err {
            MinerError::Strategy {
                name,
                strategy_type,
                message,
            } => {
                assert_eq!(name, "Sorter");
                assert_eq!(strategy_type, "NumericalSort");
                assert!(message.contains("keyword Area"));
                assert!(message.contains("NotFoundError"));
            }
            other => panic!("expected Strategy error, got {other:?}"),
        }
    }

    #[test]
    fn in_strategy_keeps_innermost_origin() {
        let inner = MinerError::Config("bad".into()).in_strategy("Inner", "Filter");
        let outer = inner.in_strategy("Outer", "Sidebar");
        assert!(matches!(outer, MinerError::Strategy { ref name, .. } if name == "Inner"));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MinerError = io_err.into();
        assert!(matches!(err, MinerError::Io(_)));
    }

    #[test]
    fn bool_parsing() {
        assert!(to_bool("True").unwrap());
        assert!(to_bool("yes").unwrap());
        assert!(!to_bool("FALSE").unwrap());
        assert!(!to_bool("0").unwrap());
        assert!(to_bool("maybe").is_err());
    }

    #[test]
    fn double_parsing() {
        assert_eq!(to_double(" 2.5 ").unwrap(), 2.5);
        assert!(matches!(to_double("abc"), Err(MinerError::Evaluation(_))));
    }
}
