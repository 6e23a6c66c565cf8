use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::{guess_format, ImageFormat};
use muse_contracts::campaign::{GeneratedImage, Platform, Post};

/// Text a reader copies for one post. Instagram appends its hashtags after a
/// blank line.
pub fn clipboard_text(post: &Post) -> String {
    match (post.platform, post.hashtags.as_ref()) {
        (Platform::Instagram, Some(tags)) if !tags.is_empty() => {
            format!("{}\n\n{}", post.content, tags.join(" "))
        }
        _ => post.content.clone(),
    }
}

/// `<Platform>-image.<ext>`, or `None` when the post has no image yet.
pub fn image_file_name(post: &Post) -> Option<String> {
    let image = post.image.as_ref()?;
    Some(format!(
        "{}-image.{}",
        post.platform.as_str(),
        image_extension(image)
    ))
}

/// Sniffs the bytes first; falls back to the declared MIME type.
pub fn image_extension(image: &GeneratedImage) -> &'static str {
    match guess_format(&image.bytes) {
        Ok(ImageFormat::Jpeg) => "jpg",
        Ok(ImageFormat::Png) => "png",
        Ok(ImageFormat::WebP) => "webp",
        _ => extension_from_mime(&image.mime_type),
    }
}

fn extension_from_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    "png"
}

/// Writes the post's image into `dir` and returns the written path.
pub fn write_post_image(dir: &Path, post: &Post) -> Result<PathBuf> {
    let (Some(image), Some(name)) = (post.image.as_ref(), image_file_name(post)) else {
        anyhow::bail!("{} post has no image to write", post.platform);
    };
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, &image.bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
