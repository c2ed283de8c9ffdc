use std::path::Path;

use async_std::fs;
use log::*;
use uuid::Uuid;

use crate::error::AppResult;
use crate::forms::UploadedFile;

/**
 * Generate a collision-free file name, keeping a sane extension from the
 * uploaded one so browsers still know what they are serving.
 */
fn generate_name(original: &str) -> String {
    let extension = Path::new(original)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default();
    format!("{}{}", Uuid::new_v4().simple(), extension)
}

/**
 * Write an upload under `media_root/folder` and return its media-relative path
 */
pub async fn store(media_root: &Path, folder: &str, file: &UploadedFile) -> AppResult<String> {
    let dir = media_root.join(folder);
    fs::create_dir_all(&dir).await?;

    let name = generate_name(&file.file_name);
    fs::write(dir.join(&name), &file.data).await?;

    let relative = format!("{}/{}", folder, name);
    info!("Stored upload {:?} ({} bytes) as {}", file.file_name, file.data.len(), relative);
    Ok(relative)
}

/**
 * Remove an upload whose database row was never written
 */
pub async fn discard(media_root: &Path, relative: &str) {
    match fs::remove_file(media_root.join(relative)).await {
        Ok(()) => debug!("Discarded orphaned upload {}", relative),
        Err(e) => warn!("Could not remove orphaned upload {}: {}", relative, e),
    }
}
