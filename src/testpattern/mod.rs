//! Synthetic test stream
//!
//! Renders a moving colour gradient with a timestamp, frame counter and title
//! overlay. Useful for checking a viewer end to end without a camera.

pub mod font;

use std::convert::Infallible;

use async_stream::stream;
use bytes::Bytes;
use futures::Stream;
use image::{Rgb, RgbImage};

use crate::codec::encode_jpeg;
use crate::stream::{multipart_part, StreamPacing};

use font::{draw_text, text_width, GLYPH_HEIGHT};

const TITLE: &str = "CAMGATE TEST PATTERN";

/// Gradient band width in pixels
const BAND: u32 = 10;

const TEXT_SCALE: u32 = 2;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const YELLOW: Rgb<u8> = Rgb([255, 255, 0]);

/// Stateful test-pattern generator
#[derive(Debug, Clone)]
pub struct TestPattern {
    width: u32,
    height: u32,
    frame: u64,
}

impl Default for TestPattern {
    fn default() -> Self {
        Self::new(640, 480)
    }
}

impl TestPattern {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            frame: 0,
        }
    }

    /// Number of frames rendered so far
    pub fn frame_count(&self) -> u64 {
        self.frame
    }

    /// Render the next frame, stamped with the local wall-clock time.
    pub fn next_image(&mut self) -> RgbImage {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let image = self.render(self.frame, &timestamp);
        self.frame += 1;
        image
    }

    /// Render frame `frame` with the given timestamp text.
    pub fn render(&self, frame: u64, timestamp: &str) -> RgbImage {
        let offset = ((frame * 2) % 256) as u32;

        let mut image = RgbImage::from_fn(self.width, self.height, |x, y| {
            let band = x - x % BAND;
            Rgb([
                ((128 + offset) % 256) as u8,
                ((y + offset) % 256) as u8,
                ((band + offset) % 256) as u8,
            ])
        });

        let line_height = (GLYPH_HEIGHT * TEXT_SCALE + 12) as i64;
        draw_text(
            &mut image,
            20,
            26,
            &format!("TEST STREAM - {timestamp}"),
            TEXT_SCALE,
            WHITE,
        );
        draw_text(
            &mut image,
            20,
            26 + line_height,
            &format!("FRAME: {frame}"),
            TEXT_SCALE,
            WHITE,
        );

        let title_x = (self.width as i64 - text_width(TITLE, TEXT_SCALE) as i64) / 2;
        let title_y = (self.height as i64 - (GLYPH_HEIGHT * TEXT_SCALE) as i64) / 2;
        draw_text(&mut image, title_x, title_y, TITLE, TEXT_SCALE, YELLOW);

        image
    }
}

/// Endless multipart stream of test-pattern frames.
///
/// Every call owns a fresh generator, so concurrent viewers never share frame
/// counters.
pub fn test_pattern_stream(
    quality: u8,
    pacing: StreamPacing,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    stream! {
        let mut pattern = TestPattern::default();

        loop {
            let rendered = tokio::task::spawn_blocking(move || {
                let image = pattern.next_image();
                let jpeg = encode_jpeg(&image, quality);
                (pattern, jpeg)
            })
            .await;

            let jpeg = match rendered {
                Ok((returned, jpeg)) => {
                    pattern = returned;
                    jpeg
                }
                Err(err) => {
                    tracing::error!(error = %err, "Test pattern renderer panicked");
                    break;
                }
            };

            match jpeg {
                Ok(jpeg) => {
                    yield Ok::<Bytes, Infallible>(multipart_part(&jpeg));
                }
                Err(err) => tracing::warn!(error = %err, "Skipping test pattern frame"),
            }

            tokio::time::sleep(pacing.frame_interval).await;
        }
    }
}
