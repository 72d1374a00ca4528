//! Error types for dm-autopilot.

/// Top-level error type for the service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Outbound delivery errors (Graph API send).
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Send to {recipient} failed with status {status}: {body}")]
    Rejected {
        recipient: String,
        status: u16,
        body: String,
    },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Invalid response from platform: {0}")]
    InvalidResponse(String),
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Classification failed: {0}")]
    Classification(String),

    #[error("Message {0} not found")]
    MessageNotFound(String),

    #[error("Message {0} has no reply text to send")]
    NoReplyText(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Job queue errors.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {message_id} failed: {reason}")]
    Failed { message_id: String, reason: String },

    #[error("Job worker panicked: {0}")]
    Panicked(String),
}
