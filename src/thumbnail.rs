//! Episode thumbnails, stored next to the videos as WebP.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use tracing::debug;

use crate::http::Fetcher;
use crate::repository::write_atomic;

/// Fetches `url`, decodes whatever format the server sent and writes a
/// lossless WebP to `output`.
pub fn download_image(fetcher: &dyn Fetcher, url: &str, output: &Path) -> Result<()> {
    let bytes = fetcher.get_bytes(url)?;
    let decoded = image::load_from_memory(&bytes)
        .with_context(|| format!("decoding image from {url}"))?;
    let webp = encode_webp(decoded)?;
    write_atomic(output, &webp)?;
    debug!(url, output = %output.display(), bytes = webp.len(), "thumbnail saved");
    Ok(())
}

fn encode_webp(image: DynamicImage) -> Result<Vec<u8>> {
    // The WebP encoder only accepts 8-bit RGB(A).
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let mut cursor = Cursor::new(Vec::new());
    rgba.write_to(&mut cursor, ImageFormat::WebP)
        .context("encoding WebP")?;
    Ok(cursor.into_inner())
}
