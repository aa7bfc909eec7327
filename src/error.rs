use thiserror::Error;

/// Errors raised while running publish plugins.
///
/// `Validation` is the only non-fatal kind: it stops the current check and
/// the run carries on. Everything else aborts the remainder of the run.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("{message}")]
    Validation {
        message: String,
        invalid: Vec<String>,
        details: String,
    },

    #[error("{0}")]
    Fatal(String),

    #[error("database error: {0}")]
    Database(#[source] anyhow::Error),

    #[error("'{owner}' is missing required data '{key}'")]
    MissingData { owner: String, key: String },

    #[error("failed to write attribute on '{node}': {source}")]
    Scene {
        node: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PublishError {
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PublishError::Validation { .. })
    }
}

impl From<anyhow::Error> for PublishError {
    fn from(error: anyhow::Error) -> Self {
        PublishError::Database(error)
    }
}
