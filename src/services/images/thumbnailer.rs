//! On-demand thumbnail generation.
//!
//! Thumbnails are keyed by content hash and live as files under the
//! private collection's `thumbnails/` subtree, so regenerating after a
//! file move is never needed. Non-animated sources are saved as jpgs to
//! save space; animated ones keep their container.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};

use crate::services::images::codec::{
    self, DecodedFrame, DecodedImage, ANIMATED_IMAGE_EXTENSIONS,
    MAXIMUM_ALLOWED_ANIMATION_FRAME_DURATION,
};
use crate::services::images::image_cache::LoadedImage;

/// Sources with either dimension at or above this get the largest thumbs.
pub const HUGE_IMAGE_THRESHOLD: u32 = 2500;
pub const HUGE_IMAGE_THUMBNAIL_WIDTH: u32 = 320;

pub const BIG_IMAGE_THRESHOLD: u32 = 1200;
pub const ALMOST_BIG_IMAGE_THRESHOLD: u32 = 1000;
pub const BIG_IMAGE_THUMBNAIL_WIDTH: u32 = 256;

/// Tall images look blurry unless their width is allowed to be larger.
pub const TALL_IMAGE_HEIGHT_THRESHOLD: u32 = 1600;
pub const TALL_ASPECT_RATIO_THRESHOLD: f32 = 0.5;
pub const TALL_IMAGE_THUMBNAIL_WIDTH: u32 = 256;

pub const OTHER_IMAGE_THUMBNAIL_WIDTH: u32 = 128;
pub const ANIMATED_IMAGE_THUMBNAIL_WIDTH: u32 = 192;

pub const THUMBNAIL_JPG_QUALITY: u8 = 80;

/// Pixels with alpha at or below this fraction count as fully
/// transparent when flattening.
pub const TRANSPARENCY_CUTOFF: f32 = 0.08;

/// Extension the thumbnail file gets: the source container for animated
/// formats, `.jpg` otherwise.
pub fn thumbnail_extension(source_path: &str) -> String {
    let extension = Path::new(source_path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default();

    if extension.is_empty() {
        warn!("Creating thumbnail for image with empty extension, full path: {source_path}");
    }

    if ANIMATED_IMAGE_EXTENSIONS.contains(&extension.as_str()) {
        extension
    } else {
        ".jpg".to_string()
    }
}

pub fn thumbnail_path(thumbnail_dir: &Path, hash: &str, source_path: &str) -> PathBuf {
    thumbnail_dir.join(format!("{hash}{}", thumbnail_extension(source_path)))
}

/// Produces or retrieves the thumbnail for (source path, hash) and loads
/// it into `thumb`. Runs on the thumbnail worker.
pub fn load_thumbnail(
    thumbnail_dir: &Path,
    background: [u8; 3],
    thumb: &Arc<LoadedImage>,
    hash: &str,
) {
    load_thumbnail_inner(thumbnail_dir, background, thumb, hash, true)
}

fn load_thumbnail_inner(
    thumbnail_dir: &Path,
    background: [u8; 3],
    thumb: &Arc<LoadedImage>,
    hash: &str,
    allow_retry: bool,
) {
    let source = thumb.path();
    let extension = thumbnail_extension(&source);
    let target = thumbnail_dir.join(format!("{hash}{extension}"));

    // Use an already created thumbnail if one exists.
    if target.exists() {
        match codec::decode_file(&target) {
            Ok(decoded) => {
                thumb.on_load_success(Arc::new(decoded));
                return;
            }
            Err(decode_error) => {
                warn!("Deleting invalid thumbnail {:?}: {decode_error}", target);
                if let Err(remove_error) = fs::remove_file(&target) {
                    thumb.on_load_fail(format!(
                        "invalid thumbnail could not be removed: {remove_error}"
                    ));
                    return;
                }
                if allow_retry {
                    load_thumbnail_inner(thumbnail_dir, background, thumb, hash, false);
                } else {
                    thumb.on_load_fail(format!("thumbnail kept failing to decode: {decode_error}"));
                }
                return;
            }
        }
    }

    // Decode the source file.
    let full = match codec::decode_file(Path::new(&source)) {
        Ok(decoded) => decoded,
        Err(decode_error) => {
            let message =
                format!("Failed to open full image for thumbnail generation: {decode_error}");
            error!("{message}, file: {source}");
            thumb.on_load_fail(message);
            return;
        }
    };

    let frames = if full.frame_count() < 2 {
        vec![resize_single_frame(&full.frames[0], &extension, background)]
    } else {
        if extension == ".jpg" {
            warn!("Accidentally making an animated image save as jpg: {source}");
        }
        resize_animation(full.frames)
    };

    let generated = Arc::new(DecodedImage { frames });
    thumb.on_load_success(generated.clone());

    // Persist. The in-memory thumbnail stays usable even when the write
    // fails.
    match write_frames_atomic(
        &generated.frames,
        thumbnail_dir,
        &target,
        &extension,
        background,
    ) {
        Ok(()) => {
            let size_kib = fs::metadata(&target)
                .map(|meta| meta.len() / 1024)
                .unwrap_or(0);
            info!(
                "Generated thumbnail for: {source} resolution: {}x{} size: {size_kib} KiB",
                generated.width(),
                generated.height()
            );
        }
        Err(write_error) => {
            error!("Failed to save generated thumbnail {:?}: {write_error}", target);
        }
    }
}

/// Picks a target width by the source dimensions.
pub fn choose_thumbnail_width(width: u32, height: u32) -> u32 {
    if width >= HUGE_IMAGE_THRESHOLD || height >= HUGE_IMAGE_THRESHOLD {
        return HUGE_IMAGE_THUMBNAIL_WIDTH;
    }

    let both_big = width >= BIG_IMAGE_THRESHOLD && height >= BIG_IMAGE_THRESHOLD;
    let one_big_one_almost = (height >= BIG_IMAGE_THRESHOLD
        && width >= ALMOST_BIG_IMAGE_THRESHOLD)
        || (width >= BIG_IMAGE_THRESHOLD && height >= ALMOST_BIG_IMAGE_THRESHOLD);
    if both_big || one_big_one_almost {
        return BIG_IMAGE_THUMBNAIL_WIDTH;
    }

    let aspect = if height > 0 {
        width as f32 / height as f32
    } else {
        1.0
    };
    if height >= TALL_IMAGE_HEIGHT_THRESHOLD || aspect < TALL_ASPECT_RATIO_THRESHOLD {
        return TALL_IMAGE_THUMBNAIL_WIDTH;
    }

    OTHER_IMAGE_THUMBNAIL_WIDTH
}

fn resize_single_frame(
    frame: &DecodedFrame,
    extension: &str,
    background: [u8; 3],
) -> DecodedFrame {
    let width = frame.buffer.width();
    let height = frame.buffer.height();
    let target_width = choose_thumbnail_width(width, height);
    let (new_width, new_height) = codec::resize_dimensions(width, height, target_width);

    let resized = codec::resize_frame(&frame.buffer, new_width, new_height);

    // Thumbnails that become jpgs can't keep transparency; flatten it
    // here so the in-memory copy matches what lands on disk.
    let buffer = if extension != ".png" {
        let flattened =
            codec::premultiply_alpha_with_background(&resized, background, TRANSPARENCY_CUTOFF);
        image::DynamicImage::ImageRgb8(flattened).into_rgba8()
    } else {
        resized
    };

    DecodedFrame {
        buffer,
        delay: frame.delay,
    }
}

/// Resizes animation frames to the animated width. Fast animations with
/// many frames drop every other frame, folding the dropped delay into the
/// previous frame.
fn resize_animation(frames: Vec<DecodedFrame>) -> Vec<DecodedFrame> {
    let drop_half = frames
        .first()
        .map(|f| f.delay < MAXIMUM_ALLOWED_ANIMATION_FRAME_DURATION)
        .unwrap_or(false)
        && frames.len() > 10;

    let mut result = Vec::with_capacity(if drop_half {
        frames.len() / 2 + 1
    } else {
        frames.len()
    });

    if drop_half {
        let mut iter = frames.into_iter().peekable();
        while let Some(frame) = iter.next() {
            let dropped = iter.next();
            let extra_delay = dropped.map(|f| f.delay).unwrap_or_default();
            result.push(resize_animation_frame(frame, extra_delay));
        }
    } else {
        for frame in frames {
            result.push(resize_animation_frame(frame, std::time::Duration::ZERO));
        }
    }

    result
}

fn resize_animation_frame(
    frame: DecodedFrame,
    extra_delay: std::time::Duration,
) -> DecodedFrame {
    let (new_width, new_height) = codec::resize_dimensions(
        frame.buffer.width(),
        frame.buffer.height(),
        ANIMATED_IMAGE_THUMBNAIL_WIDTH,
    );
    DecodedFrame {
        buffer: codec::resize_frame(&frame.buffer, new_width, new_height),
        delay: frame.delay + extra_delay,
    }
}

/// Encodes into a temp file in the thumbnail dir and renames it over the
/// target so readers never observe a half-written thumbnail.
fn write_frames_atomic(
    frames: &[DecodedFrame],
    thumbnail_dir: &Path,
    target: &Path,
    extension: &str,
    background: [u8; 3],
) -> Result<(), String> {
    fs::create_dir_all(thumbnail_dir)
        .map_err(|e| format!("failed to create thumbnail dir: {e}"))?;

    let temp = tempfile::NamedTempFile::new_in(thumbnail_dir)
        .map_err(|e| format!("failed to create temp file: {e}"))?;

    codec::encode_frames(
        frames,
        temp.path(),
        extension,
        THUMBNAIL_JPG_QUALITY,
        background,
        TRANSPARENCY_CUTOFF,
    )?;

    temp.persist(target)
        .map_err(|e| format!("failed to move thumbnail into place: {e}"))?;
    Ok(())
}

#[cfg(test)]
#[path = "tests/thumbnailer_tests.rs"]
mod tests;
