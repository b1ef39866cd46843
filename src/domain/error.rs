//! Domain error types.

use chrono::NaiveDateTime;

/// Coarse classification of a failure, used for exit codes and for deciding
/// whether a batch operation may continue past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    DataUnavailable,
    InvalidParameters,
    Simulation,
    Config,
    Io,
}

/// Top-level error type for the backtester.
#[derive(Debug, thiserror::Error)]
pub enum BacktestError {
    #[error("no data for {symbol} ({timeframe})")]
    NoData { symbol: String, timeframe: String },

    #[error("price feed unavailable: {reason}")]
    FeedUnavailable { reason: String },

    #[error("invalid price series: {reason}")]
    InvalidSeries { reason: String },

    #[error("invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("simulation failed{}: {reason}", at_suffix(.timestamp))]
    Simulation {
        timestamp: Option<NaiveDateTime>,
        reason: String,
    },

    #[error("none of the {tried} parameter combinations produced a result")]
    NoViableCombination { tried: usize },

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

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

fn at_suffix(timestamp: &Option<NaiveDateTime>) -> String {
    match timestamp {
        Some(ts) => format!(" at {ts}"),
        None => String::new(),
    }
}

impl BacktestError {
    pub fn invalid_parameters(reason: impl Into<String>) -> Self {
        BacktestError::InvalidParameters {
            reason: reason.into(),
        }
    }

    pub fn simulation(timestamp: Option<NaiveDateTime>, reason: impl Into<String>) -> Self {
        BacktestError::Simulation {
            timestamp,
            reason: reason.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            BacktestError::NoData { .. }
            | BacktestError::FeedUnavailable { .. }
            | BacktestError::InvalidSeries { .. } => ErrorCategory::DataUnavailable,
            BacktestError::InvalidParameters { .. } => ErrorCategory::InvalidParameters,
            BacktestError::Simulation { .. } | BacktestError::NoViableCombination { .. } => {
                ErrorCategory::Simulation
            }
            BacktestError::ConfigParse { .. }
            | BacktestError::ConfigMissing { .. }
            | BacktestError::ConfigInvalid { .. } => ErrorCategory::Config,
            BacktestError::Io(_) | BacktestError::Csv(_) | BacktestError::Json(_) => {
                ErrorCategory::Io
            }
        }
    }

    /// True when the price series could not be obtained at all.
    pub fn is_data_unavailable(&self) -> bool {
        self.category() == ErrorCategory::DataUnavailable
    }
}

impl From<&BacktestError> for std::process::ExitCode {
    fn from(err: &BacktestError) -> Self {
        let code: u8 = match err.category() {
            ErrorCategory::Io => 1,
            ErrorCategory::Config => 2,
            ErrorCategory::InvalidParameters => 3,
            ErrorCategory::Simulation => 4,
            ErrorCategory::DataUnavailable => 5,
        };
        std::process::ExitCode::from(code)
    }
}
