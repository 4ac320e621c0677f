pub mod codec;
pub mod image_cache;
pub mod thumbnailer;

pub use image_cache::{ImageCache, LoadState, LoadedImage};
