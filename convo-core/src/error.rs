use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvoError {
    #[error("Store error: {0}")]
    Store(String),

    #[error("Load failed: {0}")]
    Load(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Empty message content")]
    EmptyContent,

    #[error("No authenticated user")]
    Identity,
}

pub type Result<T> = std::result::Result<T, ConvoError>;
