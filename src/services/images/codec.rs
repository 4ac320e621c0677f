//! Thin wrapper around the `image` crate: decode files into frame
//! sequences, resize, premultiply and re-encode.
//!
//! The rest of the crate treats this as a black box that either yields
//! frames or a human-readable error string.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use image::codecs::gif::{GifDecoder, GifEncoder, Repeat};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::codecs::webp::WebPDecoder;
use image::{
    AnimationDecoder, DynamicImage, ExtendedColorType, Frame, ImageEncoder, RgbImage, RgbaImage,
};
use log::warn;

/// Extensions whose thumbnails keep the source container instead of
/// becoming jpgs.
pub const ANIMATED_IMAGE_EXTENSIONS: [&str; 3] = [".gif", ".webp", ".apng"];

/// Frame delays outside this range get replaced with the default.
pub const MINIMUM_VALID_ANIMATION_FRAME_DURATION: Duration = Duration::from_millis(10);
pub const MAXIMUM_ALLOWED_ANIMATION_FRAME_DURATION: Duration = Duration::from_secs(1);
pub const DEFAULT_GIF_FRAME_DURATION: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub buffer: RgbaImage,
    pub delay: Duration,
}

/// A fully decoded image: one frame for stills, several for animations.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub frames: Vec<DecodedFrame>,
}

impl DecodedImage {
    pub fn single(buffer: RgbaImage) -> Self {
        Self {
            frames: vec![DecodedFrame {
                buffer,
                delay: Duration::ZERO,
            }],
        }
    }

    pub fn width(&self) -> u32 {
        self.frames.first().map(|f| f.buffer.width()).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.frames.first().map(|f| f.buffer.height()).unwrap_or(0)
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Display duration for a frame, clamped into the valid range.
    pub fn animation_time(&self, frame: usize) -> Option<Duration> {
        let delay = self.frames.get(frame)?.delay;
        if delay < MINIMUM_VALID_ANIMATION_FRAME_DURATION
            || delay > MAXIMUM_ALLOWED_ANIMATION_FRAME_DURATION
        {
            Some(DEFAULT_GIF_FRAME_DURATION)
        } else {
            Some(delay)
        }
    }
}

fn file_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Decodes a file into a frame sequence. Animated gif/webp yield all
/// frames; everything else yields one.
pub fn decode_file(path: &Path) -> Result<DecodedImage, String> {
    if !path.exists() {
        return Err(format!("file doesn't exist: {}", path.display()));
    }

    let extension = file_extension(path);
    let decoded = match extension.as_str() {
        ".gif" => decode_animated_gif(path)?,
        ".webp" => decode_webp(path)?,
        _ => {
            let img = image::open(path)
                .map_err(|e| format!("image is invalid/unsupported: {e}"))?;
            DecodedImage::single(img.into_rgba8())
        }
    };

    if decoded.is_empty() {
        return Err("decoded image has no frames".into());
    }
    Ok(decoded)
}

fn decode_animated_gif(path: &Path) -> Result<DecodedImage, String> {
    let file = File::open(path).map_err(|e| format!("failed to open file: {e}"))?;
    let decoder =
        GifDecoder::new(BufReader::new(file)).map_err(|e| format!("invalid gif: {e}"))?;

    let frames = decoder
        .into_frames()
        .collect_frames()
        .map_err(|e| format!("failed to decode gif frames: {e}"))?;

    Ok(DecodedImage {
        frames: frames.into_iter().map(convert_frame).collect(),
    })
}

fn decode_webp(path: &Path) -> Result<DecodedImage, String> {
    let file = File::open(path).map_err(|e| format!("failed to open file: {e}"))?;
    let decoder =
        WebPDecoder::new(BufReader::new(file)).map_err(|e| format!("invalid webp: {e}"))?;

    if decoder.has_animation() {
        let frames = decoder
            .into_frames()
            .collect_frames()
            .map_err(|e| format!("failed to decode webp frames: {e}"))?;
        return Ok(DecodedImage {
            frames: frames.into_iter().map(convert_frame).collect(),
        });
    }

    let img = DynamicImage::from_decoder(decoder)
        .map_err(|e| format!("failed to decode webp: {e}"))?;
    Ok(DecodedImage::single(img.into_rgba8()))
}

fn convert_frame(frame: Frame) -> DecodedFrame {
    let delay = Duration::from(frame.delay());
    DecodedFrame {
        buffer: frame.into_buffer(),
        delay,
    }
}

/// Reads only the dimensions and extension of an image file. Returns
/// None when the file can't be opened as an image.
pub fn probe_image(path: &Path) -> Option<(u32, u32, String)> {
    match image::image_dimensions(path) {
        Ok((width, height)) => Some((width, height, file_extension(path))),
        Err(e) => {
            warn!("Failed to probe image {}: {e}", path.display());
            None
        }
    }
}

/// Returns true if the bytes decode as an image.
pub fn is_bytes_an_image(data: &[u8]) -> bool {
    image::load_from_memory(data).is_ok()
}

/// Scales target height from a requested width while preserving aspect.
/// Both dimensions clamp to at least one pixel.
pub fn resize_dimensions(
    current_width: u32,
    current_height: u32,
    target_width: u32,
) -> (u32, u32) {
    if current_width == 0 || current_height == 0 {
        return (target_width.max(1), 1);
    }

    let aspect = current_width as f32 / current_height as f32;
    let target_height = (target_width as f32 / aspect) as u32;
    (target_width.max(1), target_height.max(1))
}

pub fn resize_frame(buffer: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    image::imageops::resize(buffer, width, height, image::imageops::FilterType::CatmullRom)
}

/// Flattens transparency against a background colour and drops the alpha
/// channel. Pixels at or below the cutoff snap to the background, opaque
/// pixels pass through, partial pixels alpha-composite over it.
pub fn premultiply_alpha_with_background(
    buffer: &RgbaImage,
    background: [u8; 3],
    transparency_cutoff: f32,
) -> RgbImage {
    let cutoff = (255.0 * transparency_cutoff) as u8;
    let mut out = RgbImage::new(buffer.width(), buffer.height());

    for (x, y, pixel) in buffer.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let result = if a <= cutoff || (r == 0 && g == 0 && b == 0 && a < 255) {
            background
        } else if a == 255 {
            [r, g, b]
        } else {
            let alpha = a as f32 / 255.0;
            let mix = |c: u8, bg: u8| -> u8 {
                (c as f32 * alpha + bg as f32 * (1.0 - alpha)).clamp(0.0, 255.0) as u8
            };
            [
                mix(r, background[0]),
                mix(g, background[1]),
                mix(b, background[2]),
            ]
        };
        out.put_pixel(x, y, image::Rgb(result));
    }

    out
}

/// Encodes frames to the target path. The container is picked from the
/// extension; animated output is only supported for gif.
pub fn encode_frames(
    frames: &[DecodedFrame],
    target: &Path,
    extension: &str,
    jpg_quality: u8,
    background: [u8; 3],
    transparency_cutoff: f32,
) -> Result<(), String> {
    let file = File::create(target).map_err(|e| format!("failed to create {target:?}: {e}"))?;
    let mut writer = BufWriter::new(file);

    match extension {
        ".jpg" | ".jpeg" => {
            let first = frames.first().ok_or("no frames to encode")?;
            let rgb =
                premultiply_alpha_with_background(&first.buffer, background, transparency_cutoff);
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, jpg_quality);
            encoder
                .encode(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
                .map_err(|e| format!("jpeg encode failed: {e}"))?;
        }
        ".png" | ".apng" => {
            let first = frames.first().ok_or("no frames to encode")?;
            let encoder = PngEncoder::new_with_quality(
                &mut writer,
                CompressionType::Best,
                PngFilterType::Adaptive,
            );
            encoder
                .write_image(
                    first.buffer.as_raw(),
                    first.buffer.width(),
                    first.buffer.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(|e| format!("png encode failed: {e}"))?;
        }
        ".gif" => {
            let mut encoder = GifEncoder::new(&mut writer);
            encoder
                .set_repeat(Repeat::Infinite)
                .map_err(|e| format!("gif encode failed: {e}"))?;
            for frame in frames {
                let delay = image::Delay::from_saturating_duration(frame.delay);
                encoder
                    .encode_frame(Frame::from_parts(frame.buffer.clone(), 0, 0, delay))
                    .map_err(|e| format!("gif encode failed: {e}"))?;
            }
        }
        other => {
            // Animated webp can't be written back; a single png frame
            // under the original name is still loadable.
            if frames.len() > 1 {
                warn!("Encoding only the first frame for container {other}");
            }
            let first = frames.first().ok_or("no frames to encode")?;
            let encoder = PngEncoder::new_with_quality(
                &mut writer,
                CompressionType::Best,
                PngFilterType::Adaptive,
            );
            encoder
                .write_image(
                    first.buffer.as_raw(),
                    first.buffer.width(),
                    first.buffer.height(),
                    ExtendedColorType::Rgba8,
                )
                .map_err(|e| format!("fallback encode failed: {e}"))?;
        }
    }

    writer.flush().map_err(|e| format!("flush failed: {e}"))?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;
