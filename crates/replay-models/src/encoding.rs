//! Render and encoding constants shared by the synthesizer and the encoder.

/// Output canvas width in pixels.
pub const RENDER_WIDTH: u32 = 1280;
/// Output canvas height in pixels.
pub const RENDER_HEIGHT: u32 = 720;
/// Output frame rate.
pub const FRAME_RATE: u32 = 20;
/// Wall-clock distance between two frames.
pub const FRAME_INTERVAL_MS: u64 = 1000 / FRAME_RATE as u64;
/// Raw frames are RGB24.
pub const BYTES_PER_PIXEL: usize = 3;
/// Size of one raw frame handed to the encoder.
pub const FRAME_BYTES: usize = RENDER_WIDTH as usize * RENDER_HEIGHT as usize * BYTES_PER_PIXEL;

/// Baseline software encoder, always attempted last.
pub const SOFTWARE_ENCODER: &str = "libx264";
/// Pixel format of the encoded stream.
pub const OUTPUT_PIXEL_FORMAT: &str = "yuv420p";

/// Hardware H.264 encoders in selection order.
pub const HW_ENCODER_PRIORITY: [&str; 5] = [
    "h264_nvenc",
    "h264_qsv",
    "h264_vaapi",
    "h264_videotoolbox",
    "h264_amf",
];

/// Capacity of the rendered-frame channel between the renderer and the encoder's stdin.
pub const FRAME_BUFFER: usize = 4;
