//! Voice preview playback

use crate::cache::SpeechCache;
use crate::config::Config;
use crate::elevenlabs::{ElevenLabsClient, Voice};
use crate::error::{Result, VoicegenError};
use crate::toolchain::{self, FFPLAY};
use crate::workbook::{ColumnLayout, Sheet};
use std::ffi::{OsStr, OsString};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info};

const PREVIEW_CHARS: usize = 30;

/// Shorten a line for status output: first 30 characters plus `...`
pub fn preview_text(line: &str) -> String {
    if line.chars().count() > PREVIEW_CHARS {
        let head: String = line.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        line.to_string()
    }
}

/// PATH for the player process when a custom FFmpeg folder is configured.
///
/// The entry is the folder ffplay was actually found in, which may be
/// `ffmpeg_dir/bin` rather than `ffmpeg_dir` itself.
fn child_path_var(
    ffplay: &Path,
    ffmpeg_dir: Option<&Path>,
    current: Option<&OsStr>,
) -> Result<Option<OsString>> {
    let Some(dir) = ffmpeg_dir else {
        return Ok(None);
    };
    let tool_dir = ffplay.parent().unwrap_or(dir);
    toolchain::path_with_entry(current, tool_dir).map(Some)
}

/// Plays a character's first line with a chosen voice
pub struct Previewer {
    client: ElevenLabsClient,
    cache: Option<SpeechCache>,
    ffplay: PathBuf,
    ffmpeg_dir: Option<PathBuf>,
}

impl Previewer {
    /// Fails straight away when ffplay cannot be found, before any API call
    pub fn new(client: ElevenLabsClient, cache: Option<SpeechCache>, config: &Config) -> Result<Self> {
        let ffmpeg_dir = config.settings.ffmpeg_dir.clone();
        let ffplay = toolchain::find_tool(FFPLAY, ffmpeg_dir.as_deref())?;
        Ok(Self {
            client,
            cache,
            ffplay,
            ffmpeg_dir,
        })
    }

    /// First line `character` speaks in the sheet
    pub fn first_line(sheet: &Sheet, layout: &ColumnLayout, character: &str) -> Result<String> {
        sheet
            .rows_for_character(layout, character)?
            .into_iter()
            .next()
            .map(|line| line.dialogue)
            .ok_or_else(|| VoicegenError::NoDialogue(character.to_string()))
    }

    pub async fn preview(
        &self,
        sheet: &Sheet,
        layout: &ColumnLayout,
        character: &str,
        voice: &Voice,
    ) -> Result<()> {
        let line = Self::first_line(sheet, layout, character)?;
        info!("Generating preview: \"{}\"", preview_text(&line));

        let mp3 = match self.cache {
            Some(ref cache) => cache.synthesize(&self.client, &voice.voice_id, &line).await?,
            None => self.client.generate_speech(&line, &voice.voice_id).await?,
        };

        let mut tmp = tempfile::Builder::new()
            .prefix("voicegen-preview-")
            .suffix(".mp3")
            .tempfile()?;
        tmp.write_all(&mp3)?;
        tmp.flush()?;
        // Close our handle so the player can open the file on every platform
        let tmp_path = tmp.into_temp_path();

        info!("Playing: {} - {}", character, voice.name);
        self.play(&tmp_path).await
    }

    /// Play an audio file with ffplay and wait for it to finish
    pub async fn play(&self, path: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.ffplay);
        cmd.args(["-nodisp", "-autoexit", "-loglevel", "error"])
            .arg(path);

        let current = std::env::var_os("PATH");
        if let Some(path_var) =
            child_path_var(&self.ffplay, self.ffmpeg_dir.as_deref(), current.as_deref())?
        {
            cmd.env("PATH", path_var);
        }

        debug!("Running {:?} on {:?}", self.ffplay, path);
        let status = cmd
            .status()
            .await
            .map_err(|e| VoicegenError::CommandExecution {
                command: format!("{} {}", self.ffplay.display(), path.display()),
                error: e.to_string(),
            })?;

        if !status.success() {
            return Err(VoicegenError::CommandExecution {
                command: format!("{} {}", self.ffplay.display(), path.display()),
                error: format!("exit code {:?}", status.code()),
            });
        }
        Ok(())
    }
}
