//! FFmpeg log level configuration.
//!
//! FFmpeg logs through its own channel, separate from the [`log`] facade,
//! and prints warnings to stderr by default. The pipeline talks to FFmpeg
//! twice: in-process through the libraries (decoding and probing) and as
//! the `ffmpeg` executable (normalization). [`FfmpegLogLevel`] configures
//! both: [`set_ffmpeg_log_level`] for the libraries and
//! [`FfmpegCommand::with_log_level`](crate::FfmpegCommand::with_log_level)
//! for the executable.
//!
//! # Example
//!
//! ```no_run
//! use signpipe::{FfmpegCommand, FfmpegLogLevel};
//!
//! signpipe::set_ffmpeg_log_level(FfmpegLogLevel::Error);
//! let transcoder = FfmpegCommand::new().with_log_level(FfmpegLogLevel::Error);
//! ```

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use ffmpeg_next::util::log::Level;

/// FFmpeg log verbosity, from silent to most verbose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FfmpegLogLevel {
    /// Print nothing.
    Quiet,
    /// Unrecoverable errors that abort the process.
    Panic,
    /// Unrecoverable errors.
    Fatal,
    /// Recoverable errors.
    Error,
    /// Warnings (FFmpeg's default).
    Warning,
    /// Informational messages.
    Info,
    /// Verbose informational messages.
    Verbose,
    /// Debugging messages.
    Debug,
    /// Everything.
    Trace,
}

impl FfmpegLogLevel {
    /// Name accepted by the `-loglevel` option of the `ffmpeg` executable.
    pub fn name(self) -> &'static str {
        match self {
            FfmpegLogLevel::Quiet => "quiet",
            FfmpegLogLevel::Panic => "panic",
            FfmpegLogLevel::Fatal => "fatal",
            FfmpegLogLevel::Error => "error",
            FfmpegLogLevel::Warning => "warning",
            FfmpegLogLevel::Info => "info",
            FfmpegLogLevel::Verbose => "verbose",
            FfmpegLogLevel::Debug => "debug",
            FfmpegLogLevel::Trace => "trace",
        }
    }

    fn to_ffmpeg_level(self) -> Level {
        match self {
            FfmpegLogLevel::Quiet => Level::Quiet,
            FfmpegLogLevel::Panic => Level::Panic,
            FfmpegLogLevel::Fatal => Level::Fatal,
            FfmpegLogLevel::Error => Level::Error,
            FfmpegLogLevel::Warning => Level::Warning,
            FfmpegLogLevel::Info => Level::Info,
            FfmpegLogLevel::Verbose => Level::Verbose,
            FfmpegLogLevel::Debug => Level::Debug,
            FfmpegLogLevel::Trace => Level::Trace,
        }
    }
}

impl Display for FfmpegLogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.name())
    }
}

impl FromStr for FfmpegLogLevel {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let level = match value.to_ascii_lowercase().as_str() {
            "quiet" => FfmpegLogLevel::Quiet,
            "panic" => FfmpegLogLevel::Panic,
            "fatal" => FfmpegLogLevel::Fatal,
            "error" => FfmpegLogLevel::Error,
            "warning" | "warn" => FfmpegLogLevel::Warning,
            "info" => FfmpegLogLevel::Info,
            "verbose" => FfmpegLogLevel::Verbose,
            "debug" => FfmpegLogLevel::Debug,
            "trace" => FfmpegLogLevel::Trace,
            other => return Err(format!("unknown FFmpeg log level '{other}'")),
        };
        Ok(level)
    }
}

/// Set the log level of the in-process FFmpeg libraries.
pub fn set_ffmpeg_log_level(level: FfmpegLogLevel) {
    ffmpeg_next::util::log::set_level(level.to_ffmpeg_level());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for level in [FfmpegLogLevel::Quiet, FfmpegLogLevel::Warning, FfmpegLogLevel::Trace] {
            assert_eq!(level.name().parse::<FfmpegLogLevel>(), Ok(level));
        }
        assert_eq!("WARN".parse::<FfmpegLogLevel>(), Ok(FfmpegLogLevel::Warning));
        assert!("loud".parse::<FfmpegLogLevel>().is_err());
    }
}
