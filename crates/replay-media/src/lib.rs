#![deny(unreachable_patterns)]
//! Replay rasterizer and FFmpeg CLI wrapper for video export.
//!
//! This crate provides:
//! - Letterboxed rasterization of replay snapshots
//! - Sample-and-hold frame synthesis at a fixed frame rate
//! - Encoder capability probing and hardware encoder selection
//! - An FFmpeg encoder fed raw frames over stdin with concurrent progress draining
//! - PNG thumbnails, artifact signature checks and checksums
//! - Export-root confinement and atomic publication of outputs

pub mod artifact;
pub mod capabilities;
pub mod command;
pub mod encoder;
pub mod error;
pub mod frames;
pub mod fs_utils;
pub mod progress;
pub mod render;
pub mod thumbnail;

mod font;

pub use artifact::{checksum_file, ArtifactFormat};
pub use capabilities::EncoderCapabilities;
pub use command::{check_ffmpeg, FfmpegCommand};
pub use encoder::{EncodeRequest, EncoderProfile, FfmpegEncoder, FrameSource, ProgressSender, VideoEncoder};
pub use error::{MediaError, MediaResult};
pub use frames::{expected_duration_ms, frame_count, FrameSynthesizer, SampleAndHold};
pub use fs_utils::{publish_atomically, remove_if_exists, temp_sibling, ExportRoot};
pub use progress::FfmpegProgress;
pub use render::Rasterizer;
pub use thumbnail::write_thumbnail;
