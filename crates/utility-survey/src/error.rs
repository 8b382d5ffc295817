use std::path::PathBuf;
use utility_survey_lib::SurveyError;

/// Errors that make the inputs unusable
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Failed to load {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: SurveyError,
    },

    #[error("Invalid spacing {0}: must be finite and > 0")]
    InvalidSpacing(f64),

    #[error(transparent)]
    Survey(#[from] SurveyError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
