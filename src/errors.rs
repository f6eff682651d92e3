use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Parse float error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Exchange error {code}: {msg}")]
    Exchange { code: i64, msg: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Price unavailable for {0}")]
    PriceUnavailable(String),

    #[error("Invalid triangle: {0}")]
    InvalidTriangle(String),

    #[error("Quantity {quantity} for {symbol} rounds to zero at step {step_size}")]
    QuantityTooSmall {
        symbol: String,
        quantity: f64,
        step_size: f64,
    },

    #[error("Other: {0}")]
    Other(String),
}

impl AppError {
    /// Failures of the collaborator itself, as opposed to bad input or a rejected order.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Http(_) | AppError::Timeout(_) | AppError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_error_display_carries_code_and_message() {
        let err = AppError::Exchange {
            code: -2010,
            msg: "Account has insufficient balance".into(),
        };
        assert_eq!(
            err.to_string(),
            "Exchange error -2010: Account has insufficient balance"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn timeout_is_transient() {
        assert!(AppError::Timeout("ticker BTCUSDT".into()).is_transient());
        assert!(!AppError::PriceUnavailable("BTCUSDT".into()).is_transient());
    }
}
