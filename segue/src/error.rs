//! Error types for segue

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegueError {
    #[error("Audio device error: {0}")]
    AudioDevice(String),

    #[error("Audio format error: {0}")]
    AudioFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Media error: {0}")]
    Media(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Seek error: {0}")]
    Seek(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, SegueError>;
