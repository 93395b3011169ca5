//! FFmpeg command builder and progress-line parser.

use std::path::{Path, PathBuf};

use replay_models::encoding::{FRAME_RATE, RENDER_HEIGHT, RENDER_WIDTH};

use crate::error::{MediaError, MediaResult};
use crate::progress::FfmpegProgress;

/// Input spec for frames written to the child's stdin.
pub const STDIN_INPUT: &str = "pipe:0";
/// Progress target for `key=value` lines on the child's stdout.
pub const STDOUT_PROGRESS: &str = "pipe:1";

/// Builder for FFmpeg commands that read raw frames from stdin.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// FFmpeg binary
    program: String,
    /// Output file path
    output: PathBuf,
    /// Decoder-side options placed before the input format (e.g. `-hwaccel`)
    global_args: Vec<String>,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
    /// Where `-progress` lines go
    progress: Option<String>,
}

impl FfmpegCommand {
    /// Create a new command writing to `output`.
    pub fn new(program: impl Into<String>, output: impl AsRef<Path>) -> Self {
        Self {
            program: program.into(),
            output: output.as_ref().to_path_buf(),
            global_args: Vec::new(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
            progress: None,
        }
    }

    /// Raw RGB24 frames at the fixed canvas size and frame rate.
    pub fn raw_rgb_input(self) -> Self {
        self.raw_rgb_input_sized(RENDER_WIDTH, RENDER_HEIGHT, FRAME_RATE)
    }

    /// Raw RGB24 frames of an explicit geometry.
    pub fn raw_rgb_input_sized(self, width: u32, height: u32, fps: u32) -> Self {
        self.input_args([
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-s".to_string(),
            format!("{}x{}", width, height),
            "-r".to_string(),
            fps.to_string(),
        ])
    }

    /// Request a hardware acceleration backend.
    pub fn hwaccel(mut self, backend: impl Into<String>) -> Self {
        self.global_args.push("-hwaccel".to_string());
        self.global_args.push(backend.into());
        self
    }

    /// Add multiple input arguments.
    pub fn input_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set output pixel format.
    pub fn pixel_format(self, format: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(format)
    }

    /// Set a video filter chain. Empty chains are skipped.
    pub fn video_filters(self, filters: &[String]) -> Self {
        if filters.is_empty() {
            return self;
        }
        self.output_arg("-vf").output_arg(filters.join(","))
    }

    /// MP4 container with the moov atom at the front.
    pub fn faststart_mp4(self) -> Self {
        self.output_arg("-movflags")
            .output_arg("+faststart")
            .output_arg("-f")
            .output_arg("mp4")
    }

    /// Emit `key=value` progress blocks on stdout.
    pub fn progress_to_stdout(mut self) -> Self {
        self.progress = Some(STDOUT_PROGRESS.to_string());
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.extend(self.global_args.clone());
        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(STDIN_INPUT.to_string());

        args.extend(self.output_args.clone());

        if let Some(ref target) = self.progress {
            args.push("-progress".to_string());
            args.push(target.clone());
        }

        args.push("-loglevel".to_string());
        args.push(self.log_level.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Parse a progress line from FFmpeg's `-progress` output.
///
/// Returns a snapshot at the end of each block (`progress=continue|end`).
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let line = line.trim();

    if let Some((key, value)) = line.split_once('=') {
        match key {
            // FFmpeg reports out_time_ms in microseconds as well
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.parse::<i64>() {
                    current.out_time_us = us;
                }
            }
            "frame" => {
                if let Ok(frame) = value.parse() {
                    current.frame = frame;
                }
            }
            "fps" => {
                if let Ok(fps) = value.parse() {
                    current.fps = fps;
                }
            }
            "speed" => {
                if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                    current.speed = speed;
                }
            }
            "progress" => {
                if value == "end" {
                    current.is_complete = true;
                }
                return Some(current.clone());
            }
            _ => {}
        }
    }

    None
}

/// Check that the FFmpeg binary can be found.
pub fn check_ffmpeg(program: &str) -> MediaResult<PathBuf> {
    which::which(program).map_err(|e| MediaError::FfmpegNotFound(format!("{}: {}", program, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_software_command_args() {
        let args = FfmpegCommand::new("ffmpeg", "/exports/.a.mp4.1.tmp")
            .raw_rgb_input()
            .video_codec("libx264")
            .pixel_format("yuv420p")
            .faststart_mp4()
            .progress_to_stdout()
            .build_args();

        assert_eq!(
            args,
            vec![
                "-y", "-f", "rawvideo", "-pix_fmt", "rgb24", "-s", "1280x720", "-r", "20", "-i",
                "pipe:0", "-c:v", "libx264", "-pix_fmt", "yuv420p", "-movflags", "+faststart",
                "-f", "mp4", "-progress", "pipe:1", "-loglevel", "error",
                "/exports/.a.mp4.1.tmp",
            ]
        );
    }

    #[test]
    fn test_hwaccel_and_filters_placement() {
        let args = FfmpegCommand::new("ffmpeg", "out.mp4")
            .hwaccel("vaapi")
            .raw_rgb_input()
            .video_codec("h264_vaapi")
            .video_filters(&["format=nv12".to_string(), "hwupload".to_string()])
            .build_args();

        assert_eq!(&args[1..3], &["-hwaccel".to_string(), "vaapi".to_string()]);
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert_eq!(args[vf + 1], "format=nv12,hwupload");
        assert!(vf > args.iter().position(|a| a == "-i").unwrap());
    }

    #[test]
    fn test_empty_filters_skipped() {
        let args = FfmpegCommand::new("ffmpeg", "out.mp4").video_filters(&[]).build_args();
        assert!(!args.contains(&"-vf".to_string()));
    }

    #[test]
    fn test_progress_parsing() {
        let mut progress = FfmpegProgress::default();

        assert!(parse_progress_line("frame=12", &mut progress).is_none());
        parse_progress_line("out_time_ms=600000", &mut progress);
        assert_eq!(progress.out_time_us, 600_000);

        parse_progress_line("speed=1.5x", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);
        parse_progress_line("speed=N/A", &mut progress);
        assert!((progress.speed - 1.5).abs() < 0.01);

        let block = parse_progress_line("progress=continue", &mut progress).unwrap();
        assert_eq!(block.frame, 12);
        assert!(!block.is_complete);

        let result = parse_progress_line("progress=end", &mut progress);
        assert!(result.is_some());
        assert!(progress.is_complete);
    }

    #[test]
    fn test_out_time_us_overrides() {
        let mut progress = FfmpegProgress::default();
        parse_progress_line("out_time_us=250000", &mut progress);
        parse_progress_line("out_time_ms=N/A", &mut progress);
        assert_eq!(progress.out_time_us, 250_000);
    }
}
