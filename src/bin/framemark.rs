use std::{path::PathBuf, sync::Arc};

use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use colored::Colorize;
use framemark::{
    AssetId, DirectoryPhotoStore, FfmpegDecoder, FfmpegLogLevel, FrameLifecycleManager,
    HapticSignal, HapticSink, JsonPreferenceFile, PhotoStore, PreferenceStore, ProgressCallback,
    ProgressInfo, Timestamp, VideoDecoder, VideoRef,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CLI_AFTER_HELP: &str = "Examples:\n  framemark extract input.mp4 --at 00:12.5 --at 01:03 --progress\n  framemark list --json\n  framemark settings --album Holiday\n  framemark delete <asset-id>\n  framemark completions zsh > _framemark";

#[derive(Debug, Parser)]
#[command(
    name = "framemark",
    version,
    about = "Mark timestamps in a video and save them as still images",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone)]
struct GlobalOptions {
    /// Show additional logging output.
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while extracting.
    #[arg(long, global = true)]
    progress: bool,

    /// FFmpeg log level (quiet, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Photo library directory.
    #[arg(long, global = true, default_value = "framemark-library")]
    library: PathBuf,

    /// Preferences file.
    #[arg(long, global = true, default_value = "framemark-preferences.json")]
    prefs: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

impl Toggle {
    fn enabled(self) -> bool {
        matches!(self, Toggle::On)
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Mark timestamps and extract them into the library.
    #[command(
        about = "Extract frames at marked timestamps",
        after_help = "Examples:\n  framemark extract input.mp4 --at 5 --at 00:12.40\n  framemark extract input.mp4 --at 1:02:03.5 --json"
    )]
    Extract {
        /// Input video path or URL.
        input: String,
        /// Timestamp to mark (seconds, MM:SS, or HH:MM:SS, fractions allowed).
        /// Marks are extracted in the order given.
        #[arg(long = "at", required = true)]
        at: Vec<String>,
        /// Print the extraction report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the natural frame size of a video.
    #[command(about = "Print video frame size")]
    Probe {
        /// Input video path or URL.
        input: String,
        #[arg(long)]
        json: bool,
    },

    /// List the assets in the library.
    #[command(about = "List saved frames", visible_alias = "ls")]
    List {
        #[arg(long)]
        json: bool,
    },

    /// Delete assets from the library by identifier.
    #[command(about = "Delete saved frames")]
    Delete {
        /// Asset identifiers as printed by `extract` or `list`.
        #[arg(required = true)]
        assets: Vec<String>,
    },

    /// Show or change preferences.
    #[command(
        about = "Show or change preferences",
        after_help = "Examples:\n  framemark settings\n  framemark settings --haptics off --album \"Road trip\"\n  framemark settings --no-album"
    )]
    Settings {
        /// Turn haptic signals on or off.
        #[arg(long, value_enum)]
        haptics: Option<Toggle>,
        /// Save new frames into this album.
        #[arg(long, conflicts_with = "no_album")]
        album: Option<String>,
        /// Save new frames into the default library.
        #[arg(long)]
        no_album: bool,
        /// Mark the first-run tutorial as seen.
        #[arg(long)]
        onboarding_seen: bool,
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_log_level(value: &str) -> Option<FfmpegLogLevel> {
    match value.to_ascii_lowercase().as_str() {
        "quiet" => Some(FfmpegLogLevel::Quiet),
        "error" => Some(FfmpegLogLevel::Error),
        "warning" | "warn" => Some(FfmpegLogLevel::Warning),
        "info" => Some(FfmpegLogLevel::Info),
        "debug" => Some(FfmpegLogLevel::Debug),
        _ => None,
    }
}

fn parse_marks(values: &[String]) -> Result<Vec<Timestamp>, Box<dyn std::error::Error>> {
    values
        .iter()
        .map(|value| {
            value
                .parse::<Timestamp>()
                .map_err(|error| -> Box<dyn std::error::Error> {
                    format!("invalid --at {value:?}: {error}").into()
                })
        })
        .collect()
}

// ── Logging ────────────────────────────────────────────────────────

/// Route the library's `log` records through a `tracing` subscriber on
/// stderr. `RUST_LOG` overrides the `--verbose` default.
fn init_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if verbose { "framemark=debug" } else { "framemark=warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(global.verbose)?;

    if let Some(level) = &global.log_level {
        let parsed = parse_log_level(level).ok_or(format!("unsupported --log-level: {level}"))?;
        framemark::set_ffmpeg_log_level(parsed);
    }

    Ok(())
}

// ── Terminal collaborators ─────────────────────────────────────────

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(total: u64) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(total);
        let style =
            ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_length(info.total);
        self.bar.set_position(info.current);
        if let Some(timestamp) = info.current_timestamp {
            self.bar.set_message(timestamp.to_string());
        }
    }
}

/// A terminal has no motor; the bell stands in for the completion signal.
struct TerminalHaptics;

impl HapticSink for TerminalHaptics {
    fn emit(&self, signal: HapticSignal) {
        log::debug!("haptic: {signal:?}");
        if signal == HapticSignal::Success {
            eprint!("\x07");
        }
    }
}

// ── Commands ───────────────────────────────────────────────────────

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    match cli.command {
        Commands::Extract { input, at, json } => {
            let marks = parse_marks(&at)?;
            let store = Arc::new(DirectoryPhotoStore::open(&cli.global.library)?);
            let preferences = Arc::new(JsonPreferenceFile::new(&cli.global.prefs));

            let mut manager = FrameLifecycleManager::new(
                Arc::new(FfmpegDecoder::new()?),
                store.clone(),
                preferences.clone(),
            )
            .with_haptics(Arc::new(TerminalHaptics));

            let progress = if cli.global.progress && !json {
                let progress = Arc::new(TerminalProgress::new(marks.len() as u64)?);
                manager = manager.with_progress(progress.clone());
                Some(progress)
            } else {
                None
            };

            manager.select_video(input.as_str());
            for timestamp in marks {
                manager.mark_current_position(timestamp)?;
            }

            let report = runtime.block_on(manager.extract_all())?;

            if let Some(progress) = progress {
                progress.bar.finish_with_message("done");
            }

            if json {
                let outcomes: Vec<_> = report
                    .outcomes()
                    .iter()
                    .map(|outcome| match &outcome.result {
                        Ok(frame) => json!({
                            "timestamp": outcome.mark.timestamp.to_string(),
                            "seconds": outcome.mark.timestamp.as_secs_f64(),
                            "asset": frame.asset_id.as_ref().map(AssetId::as_str),
                            "width": frame.image.width(),
                            "height": frame.image.height(),
                        }),
                        Err(error) => json!({
                            "timestamp": outcome.mark.timestamp.to_string(),
                            "seconds": outcome.mark.timestamp.as_secs_f64(),
                            "error": error.to_string(),
                        }),
                    })
                    .collect();
                let payload = json!({
                    "video": input,
                    "album": preferences.preferences().album(),
                    "extracted": report.extracted_count(),
                    "failed": report.failed_count(),
                    "frames": outcomes,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for frame in report.extracted() {
                    let location = frame
                        .asset_id
                        .as_ref()
                        .and_then(|id| store.locate(id))
                        .map(|path| path.display().to_string())
                        .unwrap_or_default();
                    println!(
                        "{} {} {}",
                        frame.timestamp().to_string().bold(),
                        frame
                            .asset_id
                            .as_ref()
                            .map(AssetId::as_str)
                            .unwrap_or("-"),
                        location.dimmed()
                    );
                }
                for (mark, error) in report.failures() {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        format!("skipped {}: {error}", mark.timestamp).yellow()
                    );
                }
                println!(
                    "{} {}",
                    "success:".green().bold(),
                    format!(
                        "Extracted {} of {} frame(s) from {input}",
                        report.extracted_count(),
                        report.len()
                    )
                    .green()
                );
            }
        }
        Commands::Probe { input, json } => {
            let decoder = FfmpegDecoder::new()?;
            let size = runtime.block_on(decoder.prepare(&VideoRef::new(input.as_str())))?;
            if json {
                let payload = json!({
                    "video": input,
                    "width": size.width,
                    "height": size.height,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Size: {size}");
            }
        }
        Commands::List { json } => {
            let store = DirectoryPhotoStore::open(&cli.global.library)?;
            let assets = store.assets()?;
            if json {
                let payload: Vec<_> = assets
                    .iter()
                    .map(|asset| {
                        json!({
                            "id": asset.id.as_str(),
                            "album": asset.album,
                            "path": asset.path.display().to_string(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else if assets.is_empty() {
                println!("No saved frames in {}", store.root().display());
            } else {
                for asset in assets {
                    println!(
                        "{} {}",
                        asset.id,
                        asset.album.as_deref().unwrap_or("(library)").dimmed()
                    );
                }
            }
        }
        Commands::Delete { assets } => {
            let store = DirectoryPhotoStore::open(&cli.global.library)?;
            let mut failed = 0_usize;
            runtime.block_on(async {
                for asset in &assets {
                    if let Err(error) = store.delete(&AssetId::new(asset.as_str())).await {
                        failed += 1;
                        eprintln!(
                            "{} {}",
                            "warning:".yellow().bold(),
                            format!("could not delete {asset}: {error}").yellow()
                        );
                    }
                }
            });
            if failed > 0 {
                return Err(format!("{failed} of {} deletion(s) failed", assets.len()).into());
            }
            println!(
                "{} {}",
                "success:".green().bold(),
                format!("Deleted {} asset(s)", assets.len()).green()
            );
        }
        Commands::Settings {
            haptics,
            album,
            no_album,
            onboarding_seen,
            json,
        } => {
            let file = JsonPreferenceFile::new(&cli.global.prefs);
            let mut preferences = file.load()?;
            let changed = haptics.is_some() || album.is_some() || no_album || onboarding_seen;

            if let Some(toggle) = haptics {
                preferences = preferences.with_haptics(toggle.enabled());
            }
            if let Some(name) = album {
                preferences = preferences.with_custom_album(name);
            }
            if no_album {
                preferences = preferences.without_custom_album();
            }
            if onboarding_seen {
                preferences = preferences.with_onboarding_seen(true);
            }
            if changed {
                file.store(&preferences)?;
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&preferences)?);
            } else {
                println!(
                    "Haptics: {}",
                    if preferences.haptics_enabled { "on" } else { "off" }
                );
                println!(
                    "Album: {}",
                    preferences.album().unwrap_or("(default library)")
                );
                println!(
                    "Onboarding seen: {}",
                    if preferences.has_seen_onboarding {
                        "yes"
                    } else {
                        "no"
                    }
                );
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framemark", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
