use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecsError>;

#[derive(Error, Debug)]
pub enum RecsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Handler error: {0}")]
    Handler(String),

    #[error("Vector index is full: capacity {0} reached")]
    IndexCapacity(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod config;
pub mod database;
pub mod embeddings;
pub mod engine;
pub mod index;
pub mod tracker;
pub mod worker;
