use thiserror::Error;

/// Failure to turn a transport payload into a pipeline value.
/// Always terminal for the message; never persisted for retry.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("unsupported content type '{0}'")]
    UnsupportedContentType(String),
}

/// Error returned by a pipeline function.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("function '{function}' expected {expected}, received {received}")]
    UnexpectedType {
        function: String,
        expected: &'static str,
        received: String,
    },

    #[error("function '{function}' received no data")]
    NoData { function: String },

    #[error("export failed: {0}")]
    Export(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
