//! Letterboxed rasterization of replay snapshots.
//!
//! The 800x480 court is scaled uniformly into the 1280x720 canvas and
//! centred. Output depends on the snapshot alone.

use image::{Rgb, RgbImage};

use replay_models::encoding::{RENDER_HEIGHT, RENDER_WIDTH};
use replay_models::replay::{BALL_SIZE, COURT_HEIGHT, COURT_WIDTH, PADDLE_HEIGHT, PADDLE_WIDTH};
use replay_models::Snapshot;

use crate::font;

const BACKGROUND: Rgb<u8> = Rgb([12, 18, 28]);
const DIVIDER: Rgb<u8> = Rgb([60, 70, 85]);
const PADDLE: Rgb<u8> = Rgb([230, 230, 230]);
const BALL: Rgb<u8> = Rgb([255, 180, 90]);
const SCORE_TEXT: Rgb<u8> = Rgb([240, 240, 240]);
const FINISH_TEXT: Rgb<u8> = Rgb([200, 255, 200]);

const DIVIDER_WIDTH: u32 = 4;
/// Gap between the court edge and a paddle, in output pixels.
const PADDLE_INSET: f64 = 24.0;
const TEXT_SCALE: u32 = 2;
const SCORE_ORIGIN: (u32, u32) = (10, 10);
const FINISH_ORIGIN: (u32, u32) = (RENDER_WIDTH / 2 - 40, 20);

/// Court-to-canvas transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Layout {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl Layout {
    fn for_canvas(width: u32, height: u32) -> Self {
        let scale = (width as f64 / COURT_WIDTH).min(height as f64 / COURT_HEIGHT);
        Self {
            scale,
            offset_x: (width as f64 - COURT_WIDTH * scale) / 2.0,
            offset_y: (height as f64 - COURT_HEIGHT * scale) / 2.0,
        }
    }
}

/// Renders snapshots onto a fixed canvas.
#[derive(Debug, Clone)]
pub struct Rasterizer {
    layout: Layout,
    background: RgbImage,
}

impl Default for Rasterizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Rasterizer {
    pub fn new() -> Self {
        let layout = Layout::for_canvas(RENDER_WIDTH, RENDER_HEIGHT);
        let mut background = RgbImage::from_pixel(RENDER_WIDTH, RENDER_HEIGHT, BACKGROUND);
        let divider_left = RENDER_WIDTH / 2 - DIVIDER_WIDTH / 2;
        fill_rect(
            &mut background,
            divider_left as f64,
            0.0,
            (divider_left + DIVIDER_WIDTH) as f64,
            RENDER_HEIGHT as f64,
            DIVIDER,
        );
        Self { layout, background }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Draw one snapshot.
    pub fn render(&self, snapshot: &Snapshot) -> RgbImage {
        let Layout {
            scale,
            offset_x,
            offset_y,
        } = self.layout;
        let width = RENDER_WIDTH as f64;
        let mut image = self.background.clone();

        let paddle_height = PADDLE_HEIGHT * scale;
        let left_x = offset_x + PADDLE_INSET;
        let left_top = snapshot.left_paddle_y * scale + offset_y;
        fill_rect(
            &mut image,
            left_x,
            left_top,
            left_x + PADDLE_WIDTH,
            left_top + paddle_height,
            PADDLE,
        );

        let right_x = width - offset_x - PADDLE_INSET - PADDLE_WIDTH;
        let right_top = snapshot.right_paddle_y * scale + offset_y;
        fill_rect(
            &mut image,
            right_x,
            right_top,
            right_x + PADDLE_WIDTH,
            right_top + paddle_height,
            PADDLE,
        );

        let ball_cx = snapshot.ball_x * scale + offset_x;
        let ball_cy = snapshot.ball_y * scale + offset_y;
        fill_disc(&mut image, ball_cx, ball_cy, BALL_SIZE / 2.0, BALL);

        let score = format!(
            "{} : {} / {}",
            snapshot.left_score, snapshot.right_score, snapshot.target_score
        );
        font::draw_text(&mut image, SCORE_ORIGIN.0, SCORE_ORIGIN.1, &score, SCORE_TEXT, TEXT_SCALE);

        if snapshot.finished {
            font::draw_text(&mut image, FINISH_ORIGIN.0, FINISH_ORIGIN.1, "FINISH", FINISH_TEXT, TEXT_SCALE);
        }

        image
    }

    /// Draw one snapshot as a raw RGB24 buffer, row-major and unpadded.
    pub fn render_bytes(&self, snapshot: &Snapshot) -> Vec<u8> {
        self.render(snapshot).into_raw()
    }
}

/// Fill the half-open rectangle [x0, x1) x [y0, y1), clipped to the image.
/// Non-finite coordinates draw nothing.
fn fill_rect(image: &mut RgbImage, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgb<u8>) {
    let Some((xs, xe)) = clip_span(x0, x1, image.width()) else { return };
    let Some((ys, ye)) = clip_span(y0, y1, image.height()) else { return };
    for y in ys..ye {
        for x in xs..xe {
            image.put_pixel(x, y, color);
        }
    }
}

fn fill_disc(image: &mut RgbImage, cx: f64, cy: f64, radius: f64, color: Rgb<u8>) {
    let Some((xs, xe)) = clip_span(cx - radius, cx + radius, image.width()) else { return };
    let Some((ys, ye)) = clip_span(cy - radius, cy + radius, image.height()) else { return };
    let r2 = radius * radius;
    for y in ys..ye {
        for x in xs..xe {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy <= r2 {
                image.put_pixel(x, y, color);
            }
        }
    }
}

fn clip_span(start: f64, end: f64, limit: u32) -> Option<(u32, u32)> {
    if !start.is_finite() || !end.is_finite() {
        return None;
    }
    let s = start.round().clamp(0.0, limit as f64) as u32;
    let e = end.round().clamp(0.0, limit as f64) as u32;
    (s < e).then_some((s, e))
}
