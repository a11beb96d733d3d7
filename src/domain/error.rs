//! Domain error types.

/// Top-level error type for stockcast.
#[derive(Debug, thiserror::Error)]
pub enum StockcastError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("market data source unavailable for {instrument}: {reason}")]
    SourceUnavailable { instrument: String, reason: String },

    #[error("insufficient data for {instrument}: {reason}")]
    InsufficientData { instrument: String, reason: String },

    #[error("model error: {reason}")]
    Model { reason: String },
}

impl From<&StockcastError> for std::process::ExitCode {
    fn from(err: &StockcastError) -> Self {
        let code: u8 = match err {
            StockcastError::ConfigParse { .. }
            | StockcastError::ConfigMissing { .. }
            | StockcastError::ConfigInvalid { .. } => 2,
            StockcastError::Database { .. } | StockcastError::DatabaseQuery { .. } => 3,
            StockcastError::Model { .. } => 4,
            StockcastError::SourceUnavailable { .. } | StockcastError::InsufficientData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_message_names_instrument() {
        let err = StockcastError::InsufficientData {
            instrument: "AAPL".into(),
            reason: "30 rows, need 50".into(),
        };
        assert_eq!(
            err.to_string(),
            "insufficient data for AAPL: 30 rows, need 50"
        );
    }

    #[test]
    fn exit_codes_follow_error_class() {
        use std::process::ExitCode;

        let cases = [
            (
                StockcastError::ConfigMissing {
                    section: "store".into(),
                    key: "path".into(),
                },
                ExitCode::from(2),
            ),
            (
                StockcastError::Database {
                    reason: "down".into(),
                },
                ExitCode::from(3),
            ),
            (
                StockcastError::Model {
                    reason: "empty".into(),
                },
                ExitCode::from(4),
            ),
            (
                StockcastError::SourceUnavailable {
                    instrument: "AAPL".into(),
                    reason: "missing file".into(),
                },
                ExitCode::from(5),
            ),
        ];

        for (err, expected) in &cases {
            assert_eq!(format!("{:?}", ExitCode::from(err)), format!("{:?}", expected));
        }
    }
}
