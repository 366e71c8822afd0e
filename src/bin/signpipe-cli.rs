use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use signpipe::{
    Chunker, ClipsCollection, FfmpegCommand, FfmpegLogLevel, FileFrameStream, FrameStream,
    NormalizationPlan, NormalizationSettings, ProcessingLog, Transcoder, VideoFile,
    slice_into_clips,
};

const CLI_AFTER_HELP: &str = "Examples:\n  signpipe-cli probe input.mp4 --json\n  signpipe-cli chunks input.mp4 --seconds 1.0\n  signpipe-cli slice input.mp4 --seconds 2.0 --out clips_collection.json\n  signpipe-cli normalize upload.mov normalized_file.mp4 --tag-frames\n  signpipe-cli log videos_data/42/log.txt --follow\n  signpipe-cli completions zsh > _signpipe-cli";

#[derive(Debug, Parser)]
#[command(
    name = "signpipe-cli",
    version,
    about = "Inspect videos and pipeline artifacts of the sign language pipeline",
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

    /// Show a progress bar where supported.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting existing output files.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the metadata the pipeline records for a video file.
    #[command(
        about = "Print video file metadata",
        visible_alias = "info",
        after_help = "Examples:\n  signpipe-cli probe input.mp4\n  signpipe-cli probe input.mp4 --json"
    )]
    Probe {
        /// Input video path.
        input: PathBuf,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Decode a video and print how it would be chunked for detection.
    #[command(about = "Print the detection chunk plan")]
    Chunks {
        /// Input video path.
        input: PathBuf,
        /// Chunk duration in seconds.
        #[arg(long, default_value_t = 1.0)]
        seconds: f64,
    },

    /// Slice a video into fixed-length clips.
    #[command(
        about = "Slice a video into clips",
        after_help = "Examples:\n  signpipe-cli slice input.mp4\n  signpipe-cli slice input.mp4 --seconds 3 --out clips_collection.json"
    )]
    Slice {
        /// Input video path.
        input: PathBuf,
        /// Clip duration in seconds.
        #[arg(long, default_value_t = 2.0)]
        seconds: f64,
        /// Store the clips collection at this path.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Normalize framerate and resolution with the ffmpeg executable.
    #[command(about = "Normalize a video")]
    Normalize {
        /// Input video path.
        input: PathBuf,
        /// Output mp4 path.
        output: PathBuf,
        /// Burn frame numbers into the output.
        #[arg(long)]
        tag_frames: bool,
    },

    /// Print a stored clips collection with its translations.
    #[command(about = "Print clips and translations")]
    Clips {
        /// Path of a clips_collection.json file.
        path: PathBuf,
        /// Output the collection as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a video's processing log.
    #[command(about = "Print or follow a processing log")]
    Log {
        /// Path of a log.txt file.
        path: PathBuf,
        /// Keep waiting for new lines (requires the `async` feature).
        #[arg(long)]
        follow: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<Option<FfmpegLogLevel>, Box<dyn std::error::Error>> {
    let filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let level = match &global.log_level {
        Some(level) => {
            let parsed: FfmpegLogLevel = level.parse()?;
            signpipe::set_ffmpeg_log_level(parsed);
            Some(parsed)
        }
        None => None,
    };
    Ok(level)
}

fn probe(input: &Path) -> Result<VideoFile, Box<dyn std::error::Error>> {
    let root = input.parent().unwrap_or_else(|| Path::new(""));
    Ok(VideoFile::probe(root, input)?)
}

/// Progress bar over the decoded frames of a video.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(total_frames: u64) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(total_frames);
        let style = ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let ffmpeg_log_level = apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Probe { input, json } => {
            let file = probe(&input)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&file)?);
            } else {
                println!("Type: {}", file.media_type);
                println!("Duration: {:.2}s", file.duration_seconds);
                println!(
                    "Video: {}x{} @ {:.2} fps, {} frames",
                    file.frame_width, file.frame_height, file.framerate, file.frame_count
                );
                println!("Size: {} bytes", file.file_size_bytes);
            }
        }
        Commands::Chunks { input, seconds } => {
            let file = probe(&input)?;
            let progress_bar = if cli.global.progress {
                Some(TerminalProgress::new(file.frame_count as u64)?)
            } else {
                None
            };

            let mut stream = FileFrameStream::open(&input)?;
            let chunker = Chunker::new(&mut stream, seconds)?;
            println!("Chunk length: {} frames", chunker.chunk_length());

            let mut start_frame = 0;
            for (index, chunk) in chunker.enumerate() {
                let length = chunk?.len();
                if let Some(progress) = &progress_bar {
                    progress.bar.inc(length as u64);
                }
                if cli.global.verbose || progress_bar.is_none() {
                    println!("chunk {index:>4}: frames {start_frame}-{}", start_frame + length);
                }
                start_frame += length;
            }
            if let Some(progress) = progress_bar {
                progress.bar.finish_with_message("done");
            }

            println!(
                "{} {}",
                "success:".green().bold(),
                format!("{start_frame} frames decoded (header declares {})", file.frame_count).green()
            );
        }
        Commands::Slice { input, seconds, out } => {
            if let Some(out) = &out {
                ensure_writable_path(out, cli.global.overwrite)?;
            }

            let mut stream = FileFrameStream::open(&input)?;
            let framerate = stream.framerate();
            let clips = slice_into_clips(&mut stream, seconds)?;
            for clip in &clips.clips {
                println!(
                    "clip {:>4}: frames {}-{} ({:.2}s)",
                    clip.clip_index,
                    clip.start_frame,
                    clip.end_frame(),
                    clip.frame_count as f64 / framerate
                );
            }

            if let Some(out) = out {
                clips.store(&out)?;
                println!("{} {}", "saved".green().bold(), out.display());
            }
        }
        Commands::Normalize {
            input,
            output,
            tag_frames,
        } => {
            ensure_writable_path(&output, cli.global.overwrite)?;

            let source = probe(&input)?;
            let plan = NormalizationPlan::for_source(&source, &NormalizationSettings::default());
            match plan.filter_graph() {
                Some(filters) => println!("Filters: {filters}"),
                None => println!("Filters: none (re-encode only)"),
            }

            let mut transcoder = FfmpegCommand::new();
            if let Some(level) = ffmpeg_log_level {
                transcoder = transcoder.with_log_level(level);
            }
            transcoder.normalize(&input, &output, &plan)?;
            if tag_frames {
                signpipe::transcode::tag_frames_in_place(&transcoder, &output)?;
            }
            println!("{} {}", "saved".green().bold(), output.display());
        }
        Commands::Clips { path, json } => {
            let clips = ClipsCollection::load(&path)?;
            if json {
                let payload = json!({
                    "clips": clips.len(),
                    "frames": clips.total_frames(),
                    "translated": clips.is_fully_translated(),
                    "translations": clips
                        .clips
                        .iter()
                        .map(|clip| json!({
                            "clip_index": clip.clip_index,
                            "start_frame": clip.start_frame,
                            "frame_count": clip.frame_count,
                            "translation": clip.translation_result,
                        }))
                        .collect::<Vec<_>>(),
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                for clip in &clips.clips {
                    let translation = match &clip.translation_result {
                        Some(text) => text.normal(),
                        None => "(not translated)".dimmed(),
                    };
                    println!(
                        "{} frames {}-{}: {translation}",
                        format!("clip {:>4}", clip.clip_index).bold(),
                        clip.start_frame,
                        clip.end_frame()
                    );
                }
            }
        }
        Commands::Log { path, follow } => {
            if follow {
                follow_log(&path)?;
            } else {
                for line in ProcessingLog::new(&path).read_lines()? {
                    println!("{line}");
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "signpipe-cli", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(feature = "async")]
fn follow_log(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    use tokio_stream::StreamExt;

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    runtime.block_on(async {
        let mut lines = signpipe::LogFollower::follow(path);
        while let Some(line) = lines.next().await {
            println!("{}", line?);
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

#[cfg(not(feature = "async"))]
fn follow_log(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!(
        "{} {}",
        "warning:".yellow().bold(),
        "--follow requires building with the `async` feature; printing the log once".yellow()
    );
    for line in ProcessingLog::new(path).read_lines()? {
        println!("{line}");
    }
    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn slice_defaults_to_two_seconds() {
        let cli = Cli::parse_from(["signpipe-cli", "slice", "input.mp4"]);
        match cli.command {
            Commands::Slice { seconds, out, .. } => {
                assert_eq!(seconds, 2.0);
                assert!(out.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
