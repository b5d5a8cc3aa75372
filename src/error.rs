//! Error types for inbox triage.

/// Top-level error type for a triage run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mailbox (IMAP) and outbound (SMTP) errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to connect to {host}: {reason}")]
    ConnectFailed { host: String, reason: String },

    #[error("Authentication failed for {user}")]
    AuthFailed { user: String },

    #[error("Mailbox command {command} failed: {reason}")]
    CommandFailed { command: String, reason: String },

    #[error("Failed to fetch message {id}: {reason}")]
    FetchFailed { id: String, reason: String },

    #[error("Malformed message {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("Failed to send mail to {recipient}: {reason}")]
    SendFailed { recipient: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Statistical classifier errors.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Failed to load model from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Unknown label in model output: {0}")]
    UnknownLabel(String),

    #[error("Model returned an empty distribution")]
    EmptyDistribution,

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),
}

/// Batch pipeline errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Mailbox search failed: {0}")]
    Search(#[source] ChannelError),

    #[error("Batch aborted on message {id} ({stage}): {reason}")]
    Aborted {
        id: String,
        stage: String,
        reason: String,
    },
}

/// Result type alias for triage runs.
pub type Result<T> = std::result::Result<T, Error>;
