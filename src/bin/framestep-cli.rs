use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use framestep::{
    EngineOptions, ExportOptions, FfmpegFrameRetriever, FfmpegLogLevel, FfmpegPipeline,
    FrameExporter, GalleryStore, HoldZone, Notice, Notifier, PlaybackController, ResourceHandle,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use tokio::sync::mpsc;

const CLI_AFTER_HELP: &str = "Examples:\n  framestep probe run.mp4 --json\n  framestep export run.mp4 --at 1.25 --out frames\n  framestep play run.mp4 --slow-motion 0.2\n  framestep completions zsh > _framestep";

const CONSOLE_HELP: &str = "commands:\n  p              play/pause (normal speed)\n  f [n]          step n frames forward (default 1)\n  b [n]          step n frames back (default 1)\n  F / B          step 30 frames forward / back\n  s <time>       seek to seconds or mm:ss\n  hold [rate]    play in slow motion until `release`\n  release        stop slow motion and pause\n  rate <x>       choose the slow-motion preset\n  save           export the current frame\n  status         print the current position\n  q              quit";

#[derive(Debug, Parser)]
#[command(
    name = "framestep",
    version,
    about = "Step through videos frame by frame and save stills",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging output.
    #[arg(long)]
    verbose: bool,

    /// FFmpeg log level (quiet, fatal, error, warning, info, debug).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print basic facts about a video.
    #[command(
        visible_alias = "info",
        after_help = "Examples:\n  framestep probe run.mp4\n  framestep probe run.mp4 --json"
    )]
    Probe {
        /// Input media path or URL.
        input: String,

        /// Output as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Save the frame closest to a timestamp as a JPEG.
    #[command(
        after_help = "Examples:\n  framestep export run.mp4 --at 2.5\n  framestep export run.mp4 --at 0:01.2 --out frames --quality 90"
    )]
    Export {
        /// Input media path or URL.
        input: String,
        /// Timestamp in seconds or mm:ss / hh:mm:ss.
        #[arg(long, default_value = "0")]
        at: String,
        /// Base directory; defaults to the user's pictures directory.
        #[arg(long)]
        out: Option<PathBuf>,
        /// JPEG quality (1-100).
        #[arg(long, default_value_t = 100)]
        quality: u8,
    },

    /// Open an interactive, line-oriented player.
    #[command(after_help = CONSOLE_HELP)]
    Play {
        /// Input media path or URL.
        input: String,
        /// Initial slow-motion preset.
        #[arg(long, default_value_t = 0.1)]
        slow_motion: f64,
        /// Base directory for saved frames.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// A console command of the `play` subcommand.
#[derive(Debug, Clone, PartialEq)]
enum ConsoleCommand {
    Toggle,
    Step(i64),
    Seek(Duration),
    Hold(Option<f64>),
    Release,
    Rate(f64),
    Save,
    Status,
    Help,
    Quit,
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(Duration::try_from_secs_f64(seconds.max(0.0))?);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::try_from_secs_f64(total_seconds.max(0.0))?)
}

fn parse_console_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Err("empty command".to_string());
    };
    let argument = words.next();

    let count = |default: i64| -> Result<i64, String> {
        argument
            .map(|value| {
                value
                    .parse::<i64>()
                    .map_err(|_| format!("invalid frame count: {value}"))
            })
            .unwrap_or(Ok(default))
    };
    let rate = |value: &str| -> Result<f64, String> {
        value
            .trim_end_matches('x')
            .parse::<f64>()
            .map_err(|_| format!("invalid rate: {value}"))
    };

    match verb {
        "p" | "play" | "pause" => Ok(ConsoleCommand::Toggle),
        "f" => Ok(ConsoleCommand::Step(count(1)?)),
        "b" => Ok(ConsoleCommand::Step(-count(1)?)),
        "F" => Ok(ConsoleCommand::Step(30)),
        "B" => Ok(ConsoleCommand::Step(-30)),
        "s" | "seek" => {
            let value = argument.ok_or("seek needs a time")?;
            parse_timecode(value)
                .map(ConsoleCommand::Seek)
                .map_err(|error| error.to_string())
        }
        "hold" => argument
            .map(rate)
            .transpose()
            .map(ConsoleCommand::Hold),
        "release" => Ok(ConsoleCommand::Release),
        "rate" => rate(argument.ok_or("rate needs a value")?).map(ConsoleCommand::Rate),
        "save" => Ok(ConsoleCommand::Save),
        "status" => Ok(ConsoleCommand::Status),
        "h" | "help" | "?" => Ok(ConsoleCommand::Help),
        "q" | "quit" | "exit" => Ok(ConsoleCommand::Quit),
        other => Err(format!("unknown command: {other} (try `help`)")),
    }
}

fn format_position(position_ms: i64) -> String {
    let total_ms = position_ms.max(0);
    let minutes = total_ms / 60_000;
    let seconds = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;
    format!("{minutes:02}:{seconds:02}.{millis:03}")
}

fn resource_from(input: &str) -> Result<ResourceHandle, Box<dyn std::error::Error>> {
    Ok(input.parse::<ResourceHandle>()?)
}

fn export_options(out: Option<PathBuf>, quality: u8) -> ExportOptions {
    let options = ExportOptions::new().with_quality(quality);
    match out {
        Some(root) => options.with_root(root),
        None => options,
    }
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp_millis()
        .init();

    if let Some(level) = &global.log_level {
        let parsed: FfmpegLogLevel = level
            .parse()
            .map_err(|_| format!("unsupported --log-level: {level}"))?;
        framestep::set_ffmpeg_log_level(parsed);
    }

    Ok(())
}

/// Prints notices to the terminal.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::FrameSaved { path } => {
                println!("{} {}", "saved".green().bold(), path.display());
            }
            other => eprintln!("{} {}", "error:".red().bold(), other.message()),
        }
    }
}

fn frame_exporter(options: ExportOptions) -> FrameExporter {
    FrameExporter::new(
        Arc::new(FfmpegFrameRetriever::new()),
        GalleryStore::new(options),
        Arc::new(ConsoleNotifier),
    )
}

fn print_status(controller: &PlaybackController) {
    let snapshot = controller.snapshot();
    let state = if snapshot.is_playing {
        "playing".green()
    } else {
        "paused".yellow()
    };
    println!(
        "{} {} / {} @ {}",
        state,
        format_position(controller.position_ms()),
        format_position(snapshot.duration_ms),
        controller.playback_rate()
    );
}

/// Apply one console command. Returns `false` to quit.
fn apply_console_command(
    controller: &mut PlaybackController,
    exporter: &FrameExporter,
    command: ConsoleCommand,
) -> bool {
    match command {
        ConsoleCommand::Toggle => controller.toggle_play_pause(),
        ConsoleCommand::Step(count) => controller.step_frames(count),
        ConsoleCommand::Seek(position) => {
            controller.seek_to(i64::try_from(position.as_millis()).unwrap_or(i64::MAX));
        }
        ConsoleCommand::Hold(rate) => {
            let rate = match rate {
                Some(rate) => controller.select_slow_motion_rate(rate),
                None => Ok(controller.slow_motion().rate_multiplier),
            };
            match rate {
                Ok(rate) => controller.begin_slow_motion_hold(HoldZone::SmallStep, rate),
                Err(error) => eprintln!("{} {error}", "error:".red().bold()),
            }
        }
        ConsoleCommand::Release => controller.end_slow_motion_hold(HoldZone::SmallStep),
        ConsoleCommand::Rate(rate) => match controller.select_slow_motion_rate(rate) {
            Ok(rate) => println!("slow motion set to {rate}"),
            Err(error) => eprintln!("{} {error}", "error:".red().bold()),
        },
        ConsoleCommand::Save => {
            controller.export_current_frame(exporter);
        }
        ConsoleCommand::Status => {}
        ConsoleCommand::Help => {
            println!("{CONSOLE_HELP}");
            return true;
        }
        ConsoleCommand::Quit => return false,
    }
    print_status(controller);
    true
}

fn play(
    input: &str,
    slow_motion: f64,
    out: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let resource = resource_from(input)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()?;

    runtime.block_on(async move {
        let options = EngineOptions::new()
            .with_default_slow_motion_rate(slow_motion)?
            .with_export(export_options(out, 100));
        let mut controller = PlaybackController::new(
            FfmpegPipeline::factory(),
            options,
            Arc::new(ConsoleNotifier),
        )?;
        controller.try_load(&resource)?;
        let exporter = controller.frame_exporter(Arc::new(FfmpegFrameRetriever::new()));

        println!("{} {resource}", "loaded".green().bold());
        println!("{CONSOLE_HELP}");
        print_status(&controller);

        let (lines_tx, mut lines) = mpsc::unbounded_channel::<String>();
        std::thread::spawn(move || {
            for line in std::io::stdin().lines() {
                let Ok(line) = line else { break };
                if lines_tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut updates = controller.subscribe();
        let mut was_playing = false;
        loop {
            tokio::select! {
                line = lines.recv() => {
                    let Some(line) = line else { break };
                    if line.trim().is_empty() {
                        continue;
                    }
                    match parse_console_command(&line) {
                        Ok(command) => {
                            if !apply_console_command(&mut controller, &exporter, command) {
                                break;
                            }
                        }
                        Err(error) => eprintln!("{} {error}", "error:".red().bold()),
                    }
                }
                changed = updates.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = *updates.borrow_and_update();
                    if was_playing && !snapshot.is_playing {
                        print_status(&controller);
                    }
                    was_playing = snapshot.is_playing;
                }
            }
        }

        controller.release();
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Probe { input, json } => {
            let info = framestep::probe(&resource_from(&input)?)?;
            if json {
                let payload = json!({
                    "resource": info.resource.to_string(),
                    "format": info.format,
                    "duration_ms": info.duration.map(|duration| duration.as_millis() as u64),
                    "width": info.width,
                    "height": info.height,
                    "frames_per_second": info.frames_per_second,
                    "codec": info.codec,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("{} {}", "resource:".bold(), info.resource);
                println!("Format: {}", info.format);
                match info.duration {
                    Some(duration) => println!("Duration: {:.3}s", duration.as_secs_f64()),
                    None => println!("Duration: unknown"),
                }
                println!(
                    "Video: {}x{} @ {:.3} fps ({})",
                    info.width, info.height, info.frames_per_second, info.codec
                );
            }
        }
        Commands::Export {
            input,
            at,
            out,
            quality,
        } => {
            let resource = resource_from(&input)?;
            let position = parse_timecode(&at)?;
            let exporter = frame_exporter(export_options(out, quality));

            let spinner = ProgressBar::new_spinner();
            spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
            spinner.set_message(format!("decoding frame at {:.3}s", position.as_secs_f64()));
            spinner.enable_steady_tick(Duration::from_millis(80));

            let result = exporter.try_export(&resource, position);
            spinner.finish_and_clear();

            let frame = result?;
            println!("{} {}", "saved".green().bold(), frame.path.display());
        }
        Commands::Play {
            input,
            slow_motion,
            out,
        } => play(&input, slow_motion, out)?,
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "framestep", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}
