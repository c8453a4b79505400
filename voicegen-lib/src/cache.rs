//! On-disk cache of synthesized speech
//!
//! Entries are keyed by a SHA-256 over everything that affects the audio,
//! so editing a line or switching voices always misses.

use crate::elevenlabs::ElevenLabsClient;
use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Speech cache
#[derive(Debug, Clone)]
pub struct SpeechCache {
    cache_dir: PathBuf,
}

impl SpeechCache {
    /// Create a cache rooted at `cache_dir`
    pub fn new(cache_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        Ok(Self { cache_dir })
    }

    /// Cache key for one synthesis request
    pub fn key(client: &ElevenLabsClient, voice_id: &str, text: &str) -> String {
        let settings = client.voice_settings();
        let mut hasher = Sha256::new();
        for part in [
            voice_id,
            client.model_id(),
            &settings.stability.to_string(),
            &settings.similarity_boost.to_string(),
            text,
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Get cached file path
    pub fn get_cached_path(&self, key: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.mp3", key))
    }

    /// Check if an entry is cached
    pub fn is_cached(&self, key: &str) -> bool {
        self.get_cached_path(key).exists()
    }

    /// Read a cached entry, if present
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        let path = self.get_cached_path(key);
        match std::fs::read(&path) {
            Ok(bytes) if !bytes.is_empty() => {
                debug!("Speech cache hit: {:?}", path);
                Some(bytes)
            }
            _ => None,
        }
    }

    /// Store an entry, writing through a temp file so readers never see half a file
    pub fn put(&self, key: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.get_cached_path(key);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.cache_dir)?;
        std::io::Write::write_all(&mut tmp, bytes)?;
        tmp.persist(&path).map_err(|e| e.error)?;
        Ok(path)
    }

    /// Synthesize through the cache
    pub async fn synthesize(
        &self,
        client: &ElevenLabsClient,
        voice_id: &str,
        text: &str,
    ) -> Result<Vec<u8>> {
        let key = Self::key(client, voice_id, text);
        if let Some(bytes) = self.get(&key) {
            return Ok(bytes);
        }

        let bytes = client.generate_speech(text, voice_id).await?;
        if let Err(e) = self.put(&key, &bytes) {
            warn!("Failed to cache speech for voice {}: {}", voice_id, e);
        }
        Ok(bytes)
    }

    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }
}
