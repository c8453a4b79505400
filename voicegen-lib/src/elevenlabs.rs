//! ElevenLabs text-to-speech API client

use crate::config::{Config, Settings};
use crate::error::{Result, VoicegenError};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const API_KEY_HEADER: &str = "xi-api-key";
const CONNECT_TIMEOUT_SECS: u64 = 30;
const REQUEST_TIMEOUT_SECS: u64 = 180;
const MAX_ERROR_MESSAGE_CHARS: usize = 300;

/// A voice available to the account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,

    /// premade, cloned, generated, ...
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<Voice>,
}

/// Voice tuning sent with every synthesis request
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VoiceSettings {
    pub stability: f32,
    pub similarity_boost: f32,
}

impl From<&Settings> for VoiceSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            stability: settings.stability,
            similarity_boost: settings.similarity_boost,
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

/// ElevenLabs API client
#[derive(Debug, Clone)]
pub struct ElevenLabsClient {
    client: Client,
    base_url: String,
    api_key: String,
    model_id: String,
    voice_settings: VoiceSettings,
}

impl ElevenLabsClient {
    /// Create a client for the given key using the model and tuning in `settings`
    pub fn new(api_key: &str, settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("voicegen/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model_id: settings.model_id.clone(),
            voice_settings: VoiceSettings::from(settings),
        })
    }

    /// Create a client from the loaded configuration (requires an API key)
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.require_api_key()?, &config.settings)
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn voice_settings(&self) -> VoiceSettings {
        self.voice_settings
    }

    /// Fetch the voices available to this account
    pub async fn get_voices(&self) -> Result<Vec<Voice>> {
        let url = format!("{}/voices", self.base_url);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .send()
            .await?;

        let response = check_status(response).await?;
        let body: VoicesResponse = response.json().await?;
        Ok(body.voices)
    }

    /// Synthesize `text` with `voice_id`, returning the MP3 body
    pub async fn generate_speech(&self, text: &str, voice_id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/text-to-speech/{}", self.base_url, voice_id);
        debug!("POST {} ({} chars)", url, text.chars().count());

        let request = SpeechRequest {
            text,
            model_id: &self.model_id,
            voice_settings: self.voice_settings,
        };

        let response = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&request)
            .send()
            .await?;

        let response = check_status(response).await?;
        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(VoicegenError::Audio(format!(
                "API returned no audio for voice {}",
                voice_id
            )));
        }
        Ok(bytes.to_vec())
    }
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(VoicegenError::Api {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pull a readable message out of an API error body.
///
/// The API answers with `{"detail": {"message": ...}}` or `{"detail": "..."}`;
/// anything else is returned as-is, truncated.
fn error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(body).ok();
    let detail = parsed.as_ref().and_then(|value| value.get("detail"));

    let message = match detail {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Object(map)) => map
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        _ => body.trim().to_string(),
    };

    if message.is_empty() {
        return "empty response body".to_string();
    }
    if message.chars().count() > MAX_ERROR_MESSAGE_CHARS {
        let truncated: String = message.chars().take(MAX_ERROR_MESSAGE_CHARS).collect();
        return format!("{}...", truncated);
    }
    message
}

/// Voices fetched from the account, looked up by display name
#[derive(Debug, Clone, Default)]
pub struct VoiceCatalog {
    voices: Vec<Voice>,
}

impl VoiceCatalog {
    pub fn new(voices: Vec<Voice>) -> Self {
        Self { voices }
    }

    /// Fetch the catalog from the API
    pub async fn fetch(client: &ElevenLabsClient) -> Result<Self> {
        Ok(Self::new(client.get_voices().await?))
    }

    /// Find a voice by display name (first match wins), falling back to its id
    pub fn resolve(&self, name_or_id: &str) -> Result<&Voice> {
        let wanted = name_or_id.trim();
        self.voices
            .iter()
            .find(|voice| voice.name == wanted)
            .or_else(|| self.voices.iter().find(|voice| voice.voice_id == wanted))
            .ok_or_else(|| VoicegenError::VoiceNotFound(wanted.to_string()))
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}
