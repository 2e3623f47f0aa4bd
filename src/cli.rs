use clap::Parser;
use std::path::PathBuf;
use std::str::FromStr;

use crate::bridge::builtin::BuiltinFilter;
use crate::config::types::{PipelineConfig, RendererKind, SourceKind};

/// Command-line arguments for the headless pipeline runner.
///
/// Every option overrides the matching value from the configuration file.
/// Options can also be given through environment variables.
///
/// # Example
///
/// ```bash
/// framepipe --size "1280 720" --filter grayscale --processing true
///
/// FRAMEPIPE_RENDERER=snapshot FRAMEPIPE_SNAPSHOT=/tmp/latest.jpg framepipe
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON configuration file; created on exit if `--save` is given
    #[arg(short, long, env = "FRAMEPIPE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Frame source
    #[arg(long, env = "FRAMEPIPE_SOURCE", value_enum)]
    pub source: Option<SourceKind>,

    /// Capture device path for the v4l2 source (e.g., /dev/video0)
    #[arg(short, long, env = "FRAMEPIPE_DEVICE")]
    pub device: Option<String>,

    /// Capture resolution in pixels (width height)
    #[arg(long, env = "FRAMEPIPE_SIZE", value_delimiter = ' ', num_args = 2)]
    pub size: Option<Vec<u32>>,

    /// Capture frame rate
    #[arg(long, env = "FRAMEPIPE_FPS")]
    pub fps: Option<f32>,

    /// Built-in filter behind the processing bridge
    #[arg(long, env = "FRAMEPIPE_FILTER", value_enum)]
    pub filter: Option<BuiltinFilter>,

    /// Shared library exporting frame_filter_info / frame_filter_apply;
    /// takes precedence over --filter
    #[arg(long, env = "FRAMEPIPE_FILTER_LIB")]
    pub filter_lib: Option<PathBuf>,

    /// Start with processing on or off
    #[arg(long, env = "FRAMEPIPE_PROCESSING")]
    pub processing: Option<bool>,

    /// Renderer for finished frames
    #[arg(long, env = "FRAMEPIPE_RENDERER", value_enum)]
    pub renderer: Option<RendererKind>,

    /// Output path for the snapshot renderer
    #[arg(long, env = "FRAMEPIPE_SNAPSHOT")]
    pub snapshot_path: Option<PathBuf>,

    /// Write a snapshot every N frames
    #[arg(long)]
    pub snapshot_every: Option<u64>,

    /// Seconds between statistics log lines (0 disables)
    #[arg(long)]
    pub stats_interval: Option<u64>,

    /// Stop after this many seconds instead of waiting for Ctrl-C
    #[arg(long)]
    pub duration: Option<u64>,

    /// Write processing toggle changes back to the config file
    #[arg(long, requires = "config")]
    pub save: bool,

    /// Enable verbose debug logging
    #[arg(short, long, env = "VERBOSE")]
    pub verbose: bool,
}

impl Args {
    /// Overlay the command-line values onto `config`.
    pub fn apply(&self, config: &mut PipelineConfig) {
        if let Some(kind) = self.source {
            config.source.kind = kind;
        }
        if let Some(device) = &self.device {
            config.source.device = device.clone();
        }
        if let Some([width, height]) = self.size.as_deref() {
            config.source.width = *width;
            config.source.height = *height;
        }
        if let Some(fps) = self.fps {
            config.source.fps = fps;
        }
        if let Some(filter) = self.filter {
            config.filter.builtin = Some(filter);
        }
        if let Some(library) = &self.filter_lib {
            config.filter.library = Some(library.clone());
        }
        if let Some(enabled) = self.processing {
            config.filter.enabled = enabled;
        }
        if let Some(kind) = self.renderer {
            config.renderer.kind = kind;
        }
        if let Some(path) = &self.snapshot_path {
            config.renderer.snapshot_path = path.clone();
        }
        if let Some(every) = self.snapshot_every {
            config.renderer.snapshot_every = every;
        }
        if let Some(secs) = self.stats_interval {
            config.stats_interval_secs = secs;
        }
    }
}

/// A line typed on stdin while the pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Flip processing
    Toggle,
    /// Turn processing on
    On,
    /// Turn processing off
    Off,
    /// Print the current statistics
    Stats,
    /// Stop and exit
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        match line.trim().to_ascii_lowercase().as_str() {
            "t" | "toggle" => Ok(Self::Toggle),
            "on" => Ok(Self::On),
            "off" => Ok(Self::Off),
            "s" | "stats" => Ok(Self::Stats),
            "q" | "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!(
                "unknown command `{other}` (try: toggle, on, off, stats, quit)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("framepipe").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn no_arguments_leave_config_untouched() {
        let mut config = PipelineConfig::default();
        parse(&[]).apply(&mut config);
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn arguments_override_config_values() {
        let args = parse(&[
            "--source",
            "v4l2",
            "--device",
            "/dev/video2",
            "--size",
            "1280",
            "720",
            "--fps",
            "60",
            "--filter",
            "half-scale",
            "--processing",
            "true",
            "--renderer",
            "snapshot",
            "--snapshot-every",
            "10",
        ]);
        let mut config = PipelineConfig::default();
        args.apply(&mut config);

        assert_eq!(config.source.kind, SourceKind::V4l2);
        assert_eq!(config.source.device, "/dev/video2");
        assert_eq!((config.source.width, config.source.height), (1280, 720));
        assert_eq!(config.source.fps, 60.0);
        assert_eq!(config.filter.builtin, Some(BuiltinFilter::HalfScale));
        assert!(config.filter.enabled);
        assert_eq!(config.renderer.kind, RendererKind::Snapshot);
        assert_eq!(config.renderer.snapshot_every, 10);
    }

    #[test]
    fn processing_can_be_forced_off() {
        let mut config = PipelineConfig::default();
        config.filter.enabled = true;
        parse(&["--processing", "false"]).apply(&mut config);
        assert!(!config.filter.enabled);
    }

    #[test]
    fn size_needs_two_values() {
        assert!(Args::try_parse_from(["framepipe", "--size", "640"]).is_err());
    }

    #[test]
    fn save_requires_a_config_file() {
        assert!(Args::try_parse_from(["framepipe", "--save"]).is_err());
        assert!(Args::try_parse_from(["framepipe", "--save", "--config", "f.json"]).is_ok());
    }

    #[test]
    fn commands_parse_short_and_long_forms() {
        assert_eq!("t".parse(), Ok(Command::Toggle));
        assert_eq!(" Toggle \n".parse(), Ok(Command::Toggle));
        assert_eq!("on".parse(), Ok(Command::On));
        assert_eq!("OFF".parse(), Ok(Command::Off));
        assert_eq!("s".parse(), Ok(Command::Stats));
        assert_eq!("q".parse(), Ok(Command::Quit));
        assert!("launch".parse::<Command>().is_err());
    }

    #[test]
    fn args_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
