//! Voicegen Library
//!
//! Core library for turning spreadsheet dialogue lists into voice files
//! with the ElevenLabs text-to-speech API.

pub mod audio;
pub mod batch;
pub mod cache;
pub mod config;
pub mod elevenlabs;
pub mod error;
pub mod preview;
pub mod toolchain;
pub mod workbook;

pub use crate::batch::{BatchReport, BatchRunner, DialogueTask, VoiceAssignment};
pub use crate::cache::SpeechCache;
pub use crate::config::{Config, Settings};
pub use crate::elevenlabs::{ElevenLabsClient, Voice, VoiceCatalog};
pub use crate::error::{Result, VoicegenError};
pub use crate::preview::Previewer;
pub use crate::workbook::{ColumnLayout, DialogueLine, Sheet, Workbook};
