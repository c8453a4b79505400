//! External tool discovery (ffplay/ffmpeg) and environment checks

use crate::config::Config;
use crate::error::{Result, VoicegenError};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use tracing::debug;
use which::which;

pub const FFPLAY: &str = "ffplay";
pub const FFMPEG: &str = "ffmpeg";

/// Locate a tool, checking `ffmpeg_dir` and `ffmpeg_dir/bin` before PATH
pub fn find_tool(name: &str, ffmpeg_dir: Option<&Path>) -> Result<PathBuf> {
    let exe = format!("{}{}", name, std::env::consts::EXE_SUFFIX);

    if let Some(dir) = ffmpeg_dir {
        for candidate in [dir.join(&exe), dir.join("bin").join(&exe)] {
            if candidate.is_file() {
                debug!("Found {} at {:?}", name, candidate);
                return Ok(candidate);
            }
        }
    }

    which(name).map_err(|_| {
        VoicegenError::ToolNotFound(format!(
            "{} not found in PATH{}",
            name,
            ffmpeg_dir
                .map(|d| format!(" or {}", d.display()))
                .unwrap_or_default()
        ))
    })
}

fn same_entry(a: &Path, b: &Path) -> bool {
    fn normalize(p: &Path) -> String {
        let s = p.to_string_lossy();
        let trimmed = s.trim_end_matches(['/', '\\']);
        if cfg!(windows) {
            trimmed.to_lowercase()
        } else {
            trimmed.to_string()
        }
    }
    normalize(a) == normalize(b)
}

/// PATH value with `dir` prepended, unless an equal entry is already present
pub fn path_with_entry(current: Option<&OsStr>, dir: &Path) -> Result<OsString> {
    let mut entries: Vec<PathBuf> = current
        .map(|value| std::env::split_paths(value).collect())
        .unwrap_or_default();

    if entries.iter().any(|entry| same_entry(entry, dir)) {
        return Ok(current.map(OsStr::to_os_string).unwrap_or_default());
    }

    entries.insert(0, dir.to_path_buf());
    std::env::join_paths(entries)
        .map_err(|e| VoicegenError::Config(format!("Invalid PATH entry {:?}: {}", dir, e)))
}

/// Availability of one external tool
#[derive(Debug, Clone)]
pub struct ToolStatus {
    pub name: &'static str,
    pub path: Option<PathBuf>,
    pub required: bool,
}

/// Result of an environment check
#[derive(Debug, Clone)]
pub struct DoctorReport {
    pub config_file: PathBuf,
    pub config_exists: bool,
    pub api_key: bool,
    pub tools: Vec<ToolStatus>,
}

impl DoctorReport {
    /// Everything needed for generation and preview is present
    pub fn is_ready(&self) -> bool {
        self.api_key
            && self
                .tools
                .iter()
                .all(|tool| !tool.required || tool.path.is_some())
    }

    /// Human-readable problems, one per line
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.api_key {
            problems.push(
                "No ElevenLabs API key configured (voicegen config set-key <KEY>)".to_string(),
            );
        }
        for tool in &self.tools {
            if tool.required && tool.path.is_none() {
                problems.push(format!(
                    "{} not found; install FFmpeg or set ffmpeg_dir in the config file",
                    tool.name
                ));
            }
        }
        problems
    }
}

/// Check the configuration and the tools voicegen shells out to
pub fn doctor(config: &Config) -> DoctorReport {
    let ffmpeg_dir = config.settings.ffmpeg_dir.as_deref();
    let tools = [(FFPLAY, true), (FFMPEG, false)]
        .into_iter()
        .map(|(name, required)| ToolStatus {
            name,
            path: find_tool(name, ffmpeg_dir).ok(),
            required,
        })
        .collect();

    DoctorReport {
        config_file: config.config_file.clone(),
        config_exists: config.config_file.exists(),
        api_key: config.require_api_key().is_ok(),
        tools,
    }
}
