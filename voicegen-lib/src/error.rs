//! Error types for voicegen

use thiserror::Error;

/// Voicegen result type
pub type Result<T> = std::result::Result<T, VoicegenError>;

/// Main error type for voicegen operations
#[derive(Error, Debug)]
pub enum VoicegenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("ElevenLabs API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("No dialogue found for {0}")]
    NoDialogue(String),

    #[error("Audio error: {0}")]
    Audio(String),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Command execution failed: {command} - {error}")]
    CommandExecution { command: String, error: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
