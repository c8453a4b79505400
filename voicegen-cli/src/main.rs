//! Voicegen CLI

use clap::{Args, Parser, Subcommand};
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, info};
use voicegen_lib::batch::{self, BatchRunner, VoiceAssignment};
use voicegen_lib::toolchain;
use voicegen_lib::{
    ColumnLayout, Config, ElevenLabsClient, Previewer, Result, Sheet, SpeechCache, VoiceCatalog,
    VoicegenError, Workbook,
};

#[derive(Parser)]
#[command(name = "voicegen")]
#[command(about = "Generate voice files from a spreadsheet dialogue list with ElevenLabs")]
#[command(version)]
#[command(long_about = r#"Voicegen - batch voice generation for dialogue spreadsheets

Reads characters, lines and file names from an Excel sheet, assigns an
ElevenLabs voice to each character and writes one WAV file
(16-bit, 44.1 kHz, stereo) per line.

TYPICAL WORKFLOW:
    voicegen config set-key <KEY>                 # store the API key
    voicegen test-connection                      # check the key
    voicegen sheets script.xlsx                   # pick a sheet
    voicegen columns script.xlsx -s Scene1        # see the columns
    voicegen characters script.xlsx -s Scene1     # list the characters
    voicegen preview script.xlsx -s Scene1 --character Alice --voice Rachel
    voicegen generate script.xlsx -s Scene1 -a Alice=Rachel -a Bob=Adam -o out/"#)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Increase log output (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Don't ask any questions
    #[arg(short = 'q', long, global = true)]
    unattended: bool,

    /// Always call the API instead of reusing cached speech
    #[arg(long, global = true)]
    no_cache: bool,

    /// Use a different settings file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or change the stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Check the API key by listing the account's voices
    TestConnection,
    /// List available voices
    Voices,
    /// List the sheets of a workbook
    Sheets {
        /// Excel workbook (.xlsx, .xlsm, .xls, .ods)
        workbook: PathBuf,
    },
    /// List the columns and row count of a sheet
    Columns {
        #[command(flatten)]
        sheet: SheetArgs,
    },
    /// List the characters found in a sheet
    Characters {
        #[command(flatten)]
        sheet: SheetArgs,
        #[command(flatten)]
        layout: LayoutArgs,
    },
    /// Play a character's first line with a voice
    Preview {
        #[command(flatten)]
        sheet: SheetArgs,
        #[command(flatten)]
        layout: LayoutArgs,
        /// Character whose first line is spoken
        #[arg(long)]
        character: String,
        /// Voice name or id
        #[arg(long)]
        voice: String,
    },
    /// Generate WAV files for the assigned characters
    Generate {
        #[command(flatten)]
        sheet: SheetArgs,
        #[command(flatten)]
        layout: LayoutArgs,
        /// CHARACTER=VOICE (repeatable)
        #[arg(short = 'a', long = "assign", required = true, value_name = "CHARACTER=VOICE")]
        assignments: Vec<VoiceAssignment>,
        /// Output folder
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Check configuration and external tools
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the current settings
    Show,
    /// Store the ElevenLabs API key
    SetKey { key: String },
    /// Print the settings file location
    Path,
}

#[derive(Args)]
struct SheetArgs {
    /// Excel workbook (.xlsx, .xlsm, .xls, .ods)
    workbook: PathBuf,

    /// Sheet to read (defaults to the first sheet)
    #[arg(short, long)]
    sheet: Option<String>,
}

#[derive(Args)]
struct LayoutArgs {
    /// Column holding character names
    #[arg(long, default_value = "A")]
    char_col: String,

    /// Column holding the lines
    #[arg(long, default_value = "B")]
    dialogue_col: String,

    /// Column holding output file names
    #[arg(long, default_value = "C")]
    filename_col: String,

    /// First data row (2 when row 1 is a header)
    #[arg(long, default_value_t = 2)]
    start_row: usize,
}

impl LayoutArgs {
    fn layout(&self) -> ColumnLayout {
        ColumnLayout {
            character: self.char_col.to_uppercase(),
            dialogue: self.dialogue_col.to_uppercase(),
            filename: self.filename_col.to_uppercase(),
            start_row: self.start_row,
        }
    }
}

fn open_sheet(args: &SheetArgs) -> Result<Sheet> {
    let mut workbook = Workbook::open(&args.workbook)?;
    let name = match args.sheet {
        Some(ref name) => name.clone(),
        None => workbook
            .sheet_names()
            .into_iter()
            .next()
            .ok_or_else(|| VoicegenError::Workbook("Workbook has no sheets".into()))?,
    };
    workbook.sheet(&name)
}

fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim().to_lowercase().starts_with('y'))
}

fn speech_cache(config: &Config) -> Result<Option<SpeechCache>> {
    if config.use_cache {
        Ok(Some(SpeechCache::new(config.speech_cache_dir())?))
    } else {
        Ok(None)
    }
}

fn show_config(config: &Config) {
    let settings = &config.settings;
    println!("Settings file:     {}", config.config_file.display());
    println!(
        "API key:           {}",
        config
            .masked_api_key()
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!("API base URL:      {}", settings.base_url);
    println!("Model:             {}", settings.model_id);
    println!("Stability:         {}", settings.stability);
    println!("Similarity boost:  {}", settings.similarity_boost);
    println!(
        "FFmpeg folder:     {}",
        settings
            .ffmpeg_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_else(|| "(PATH)".to_string())
    );
    println!("Speech cache:      {}", config.speech_cache_dir().display());
}

async fn generate(
    config: &Config,
    sheet_args: &SheetArgs,
    layout: ColumnLayout,
    assignments: &[VoiceAssignment],
    output: &Path,
    progress: bool,
) -> Result<()> {
    let client = ElevenLabsClient::from_config(config)?;
    let catalog = VoiceCatalog::fetch(&client).await?;
    let sheet = open_sheet(sheet_args)?;

    let tasks = batch::plan(&sheet, &layout, &catalog, assignments)?;
    if tasks.is_empty() {
        return Err(VoicegenError::NoDialogue(
            "the assigned characters".to_string(),
        ));
    }

    println!(
        "{} voice file(s) will be written to {}",
        tasks.len(),
        output.display()
    );
    if !config.unattended && !confirm(&format!("Generate {} voice file(s)?", tasks.len()))? {
        println!("Cancelled.");
        return Ok(());
    }

    let runner = BatchRunner::new(client, speech_cache(config)?).with_progress(progress);
    let report = runner.run(&tasks, output).await?;

    println!(
        "Voice generation finished. Succeeded: {}  Errors: {}",
        report.succeeded.len(),
        report.failures.len()
    );
    for failure in &report.failures {
        eprintln!(
            "  {} ({}): {}",
            failure.filename, failure.character, failure.error
        );
    }

    if report.all_failed() {
        process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "voicegen={},voicegen_lib={}",
            log_level, log_level
        ))
        .with_writer(io::stderr)
        .init();

    let mut config = match cli.config {
        Some(ref path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.unattended = cli.unattended;
    config.use_cache = !cli.no_cache;
    config.ensure_dirs()?;

    debug!("Using settings file {:?}", config.config_file);

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Show => show_config(&config),
            ConfigAction::SetKey { key } => {
                config.set_api_key(&key)?;
                config.save()?;
                println!("API key saved to {}", config.config_file.display());
            }
            ConfigAction::Path => println!("{}", config.config_file.display()),
        },
        Commands::TestConnection => {
            let client = ElevenLabsClient::from_config(&config)?;
            let catalog = VoiceCatalog::fetch(&client).await?;
            println!(
                "Connection OK. {} voice(s) available.",
                catalog.len()
            );
            config.save()?;
        }
        Commands::Voices => {
            let client = ElevenLabsClient::from_config(&config)?;
            let catalog = VoiceCatalog::fetch(&client).await?;
            for voice in catalog.voices() {
                println!(
                    "{:<30} {:<24} {}",
                    voice.name,
                    voice.voice_id,
                    voice.category.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Sheets { workbook } => {
            let workbook = Workbook::open(&workbook)?;
            for name in workbook.sheet_names() {
                println!("{}", name);
            }
        }
        Commands::Columns { sheet } => {
            let sheet = open_sheet(&sheet)?;
            println!("Sheet:   {}", sheet.name());
            println!("Rows:    {}", sheet.row_count());
            println!("Columns: {}", sheet.column_letters().join(", "));
        }
        Commands::Characters { sheet, layout } => {
            let sheet = open_sheet(&sheet)?;
            let layout = layout.layout();
            let characters = sheet.unique_values_in_column(&layout.character, layout.start_row)?;
            info!("Found {} character(s)", characters.len());
            for character in characters {
                println!("{}", character);
            }
        }
        Commands::Preview {
            sheet,
            layout,
            character,
            voice,
        } => {
            let client = ElevenLabsClient::from_config(&config)?;
            let previewer = Previewer::new(client.clone(), speech_cache(&config)?, &config)?;
            let sheet = open_sheet(&sheet)?;
            let catalog = VoiceCatalog::fetch(&client).await?;
            let voice = catalog.resolve(&voice)?;
            previewer
                .preview(&sheet, &layout.layout(), &character, voice)
                .await?;
        }
        Commands::Generate {
            sheet,
            layout,
            assignments,
            output,
        } => {
            let progress = cli.verbose == 0 && io::stderr().is_terminal();
            generate(
                &config,
                &sheet,
                layout.layout(),
                &assignments,
                &output,
                progress,
            )
            .await?;
        }
        Commands::Doctor => {
            let report = toolchain::doctor(&config);
            println!(
                "Settings file: {} ({})",
                report.config_file.display(),
                if report.config_exists { "found" } else { "not created yet" }
            );
            println!(
                "API key:       {}",
                if report.api_key { "configured" } else { "missing" }
            );
            for tool in &report.tools {
                println!(
                    "{:<14} {}",
                    format!("{}:", tool.name),
                    tool.path
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "not found".to_string())
                );
            }
            if !report.is_ready() {
                for problem in report.problems() {
                    eprintln!("Error: {}", problem);
                }
                process::exit(1);
            }
        }
    }

    Ok(())
}
