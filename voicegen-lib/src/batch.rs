//! Batch generation of voice files

use crate::audio;
use crate::cache::SpeechCache;
use crate::elevenlabs::{ElevenLabsClient, VoiceCatalog};
use crate::error::{Result, VoicegenError};
use crate::workbook::{ColumnLayout, Sheet};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A character mapped to a voice, written `Character=Voice` on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceAssignment {
    pub character: String,

    /// Voice display name or id
    pub voice: String,
}

impl FromStr for VoiceAssignment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (character, voice) = s
            .split_once('=')
            .ok_or_else(|| format!("Expected CHARACTER=VOICE, got {:?}", s))?;
        let character = character.trim();
        let voice = voice.trim();
        if character.is_empty() || voice.is_empty() {
            return Err(format!("Expected CHARACTER=VOICE, got {:?}", s));
        }
        Ok(Self {
            character: character.to_string(),
            voice: voice.to_string(),
        })
    }
}

/// One file to generate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueTask {
    pub character: String,
    pub voice_id: String,
    pub dialogue: String,
    pub filename: String,
}

/// Append `.wav` unless the name already ends with it (any case)
pub fn output_file_name(name: &str) -> String {
    if name.to_lowercase().ends_with(".wav") {
        name.to_string()
    } else {
        format!("{}.wav", name)
    }
}

/// Resolve where a task's file goes, refusing names that escape `output_dir`
pub fn output_path(output_dir: &Path, filename: &str) -> Result<PathBuf> {
    let name = output_file_name(filename);
    let relative = Path::new(&name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(VoicegenError::Config(format!(
            "Output file name must stay inside the output folder: {:?}",
            filename
        )));
    }
    Ok(output_dir.join(relative))
}

/// Build the task list for the assigned characters.
///
/// Characters are processed in the order they were first assigned; assigning
/// the same character twice keeps the later voice.
pub fn plan(
    sheet: &Sheet,
    layout: &ColumnLayout,
    catalog: &VoiceCatalog,
    assignments: &[VoiceAssignment],
) -> Result<Vec<DialogueTask>> {
    let mut resolved: Vec<(String, String)> = Vec::new();
    for assignment in assignments {
        let voice_id = catalog.resolve(&assignment.voice)?.voice_id.clone();
        match resolved
            .iter_mut()
            .find(|(character, _)| *character == assignment.character)
        {
            Some(entry) => entry.1 = voice_id,
            None => resolved.push((assignment.character.clone(), voice_id)),
        }
    }

    let mut tasks = Vec::new();
    for (character, voice_id) in resolved {
        let lines = sheet.rows_for_character(layout, &character)?;
        if lines.is_empty() {
            warn!("No dialogue found for {}", character);
        }
        tasks.extend(lines.into_iter().map(|line| DialogueTask {
            character: character.clone(),
            voice_id: voice_id.clone(),
            dialogue: line.dialogue,
            filename: line.filename,
        }));
    }
    Ok(tasks)
}

/// A task that could not be generated
#[derive(Debug, Clone)]
pub struct TaskFailure {
    pub character: String,
    pub filename: String,
    pub error: String,
}

/// Outcome of a batch run
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub succeeded: Vec<PathBuf>,
    pub failures: Vec<TaskFailure>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failures.len()
    }

    pub fn all_failed(&self) -> bool {
        self.total() > 0 && self.succeeded.is_empty()
    }
}

/// Generates tasks one at a time, carrying on past individual failures
pub struct BatchRunner {
    client: ElevenLabsClient,
    cache: Option<SpeechCache>,
    progress: bool,
}

impl BatchRunner {
    pub fn new(client: ElevenLabsClient, cache: Option<SpeechCache>) -> Self {
        Self {
            client,
            cache,
            progress: false,
        }
    }

    /// Show a progress bar on stderr
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    pub async fn run(&self, tasks: &[DialogueTask], output_dir: &Path) -> Result<BatchReport> {
        let start_time = Instant::now();
        std::fs::create_dir_all(output_dir)?;

        let pb = if self.progress {
            let pb = ProgressBar::new(tasks.len() as u64);
            let style = ProgressStyle::default_bar()
                .template("{msg} {bar:40.cyan/blue} {pos}/{len} {eta}")
                .map_err(|e| {
                    VoicegenError::Config(format!("Progress bar template error: {}", e))
                })?;
            pb.set_style(style);
            Some(pb)
        } else {
            None
        };

        let mut report = BatchReport::default();

        for (i, task) in tasks.iter().enumerate() {
            info!(
                "Generating ({}/{}): {} [{}]",
                i + 1,
                tasks.len(),
                task.filename,
                task.character
            );
            if let Some(ref pb) = pb {
                pb.set_message(task.filename.clone());
            }

            match self.render(task, output_dir).await {
                Ok(path) => report.succeeded.push(path),
                Err(e) => {
                    warn!("Error generating {}: {}", task.filename, e);
                    report.failures.push(TaskFailure {
                        character: task.character.clone(),
                        filename: task.filename.clone(),
                        error: e.to_string(),
                    });
                }
            }

            if let Some(ref pb) = pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = pb {
            pb.finish_with_message("Done");
        }

        info!(
            "Batch finished in {:.1}s: {} succeeded, {} failed",
            start_time.elapsed().as_secs_f32(),
            report.succeeded.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn render(&self, task: &DialogueTask, output_dir: &Path) -> Result<PathBuf> {
        let path = output_path(output_dir, &task.filename)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mp3 = match self.cache {
            Some(ref cache) => {
                cache
                    .synthesize(&self.client, &task.voice_id, &task.dialogue)
                    .await?
            }
            None => {
                self.client
                    .generate_speech(&task.dialogue, &task.voice_id)
                    .await?
            }
        };

        let target = path.clone();
        let written = tokio::task::spawn_blocking(move || audio::mp3_to_wav(&mp3, &target))
            .await
            .map_err(|e| VoicegenError::Audio(format!("Conversion task failed: {}", e)))??;
        debug!("Wrote {:?} ({:.2}s)", path, written.duration_secs());

        Ok(path)
    }
}
