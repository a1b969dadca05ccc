// ABOUTME: Recipe image uploads: decode check, unique file naming, and local media storage
// ABOUTME: Stored names are a fresh UUID plus an extension; client file names are never reused

use std::path::{Path as FsPath, PathBuf};

use axum::extract::{Multipart, Path, State};
use axum::Json;
use axum_extra::extract::WithRejection;
use image::ImageFormat;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::types::RecipeImageResponse;
use crate::AppState;

pub const RECIPE_UPLOAD_DIR: &str = "uploads/recipe";
const MAX_EXTENSION_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    url_prefix: String,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &FsPath {
        &self.root
    }

    pub fn url_for(&self, relative: &str) -> String {
        format!("{}/{}", self.url_prefix, relative)
    }

    /// Validates the bytes as an image and writes them under a generated name.
    /// Returns the path relative to the media root.
    pub async fn save_recipe_image(
        &self,
        bytes: Vec<u8>,
        original_name: Option<&str>,
    ) -> Result<String> {
        let (format, bytes) = tokio::task::spawn_blocking(move || {
            decode_format(&bytes).map(|format| (format, bytes))
        })
        .await??;

        let relative = recipe_image_path(original_name, format);
        let target = self.root.join(&relative);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;

        tracing::info!("Stored recipe image at {}", target.display());
        Ok(relative)
    }

    /// Best-effort removal; a missing file is not an error.
    pub async fn remove(&self, relative: &str) {
        let target = self.root.join(relative);
        if let Err(err) = tokio::fs::remove_file(&target).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove {}: {}", target.display(), err);
            }
        }
    }
}

fn decode_format(bytes: &[u8]) -> Result<ImageFormat> {
    let not_an_image = || {
        AppError::invalid(
            "image",
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
        )
    };

    let format = image::guess_format(bytes).map_err(|_| not_an_image())?;
    image::load_from_memory_with_format(bytes, format).map_err(|_| not_an_image())?;
    Ok(format)
}

fn extension_for(original_name: Option<&str>, format: ImageFormat) -> String {
    let supplied = original_name
        .and_then(|name| FsPath::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(str::to_ascii_lowercase);

    supplied.unwrap_or_else(|| {
        format
            .extensions_str()
            .first()
            .copied()
            .unwrap_or("img")
            .to_string()
    })
}

/// `uploads/recipe/<uuid>.<ext>`; only the extension comes from the client.
pub fn recipe_image_path(original_name: Option<&str>, format: ImageFormat) -> String {
    format!(
        "{}/{}.{}",
        RECIPE_UPLOAD_DIR,
        Uuid::new_v4(),
        extension_for(original_name, format)
    )
}

pub async fn upload_recipe_image(
    State(state): State<AppState>,
    auth: AuthUser,
    WithRejection(Path(recipe_id), _): WithRejection<Path<i32>, AppError>,
    WithRejection(mut multipart, _): WithRejection<Multipart, AppError>,
) -> Result<Json<RecipeImageResponse>> {
    state.storage.recipe_exists_for(auth.id(), recipe_id).await?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid("image", e.body_text()))?
    {
        if field.name() == Some("image") {
            let file_name = field.file_name().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::invalid("image", e.body_text()))?;
            upload = Some((file_name, bytes));
            break;
        }
    }

    let (file_name, bytes) =
        upload.ok_or_else(|| AppError::invalid("image", "No file was submitted."))?;
    if bytes.is_empty() {
        return Err(AppError::invalid("image", "The submitted file is empty."));
    }

    let relative = state
        .media
        .save_recipe_image(bytes.to_vec(), file_name.as_deref())
        .await?;

    let (updated, previous) = match state
        .storage
        .set_recipe_image(auth.id(), recipe_id, relative.clone())
        .await
    {
        Ok(swapped) => swapped,
        Err(err) => {
            state.media.remove(&relative).await;
            return Err(err);
        }
    };

    if let Some(previous) = previous.filter(|previous| *previous != relative) {
        state.media.remove(&previous).await;
    }

    Ok(Json(RecipeImageResponse {
        id: updated.id,
        image: state.media.url_for(&relative),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([200, 40, 40]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_extension_prefers_clean_original() {
        assert_eq!(extension_for(Some("photo.JPG"), ImageFormat::Jpeg), "jpg");
        assert_eq!(extension_for(Some("cake.png"), ImageFormat::Png), "png");
    }

    #[test]
    fn test_extension_falls_back_to_format() {
        assert_eq!(extension_for(None, ImageFormat::Png), "png");
        assert_eq!(extension_for(Some("noext"), ImageFormat::Png), "png");
        assert_eq!(extension_for(Some("x.p/ng"), ImageFormat::Png), "png");
        assert_eq!(extension_for(Some("x.verylongext"), ImageFormat::Png), "png");
    }

    #[test]
    fn test_recipe_image_path_ignores_client_name() {
        let path = recipe_image_path(Some("../../etc/passwd.png"), ImageFormat::Png);
        assert!(path.starts_with("uploads/recipe/"));
        assert!(path.ends_with(".png"));
        assert!(!path.contains(".."));

        let stem = path
            .trim_start_matches("uploads/recipe/")
            .trim_end_matches(".png");
        assert!(Uuid::parse_str(stem).is_ok());
    }

    #[test]
    fn test_decode_format() {
        assert_eq!(decode_format(&png_bytes()).unwrap(), ImageFormat::Png);
        assert!(decode_format(b"definitely not an image").is_err());

        // A valid signature with a truncated body must still be rejected
        let mut truncated = png_bytes();
        truncated.truncate(20);
        assert!(decode_format(&truncated).is_err());
    }

    #[tokio::test]
    async fn test_save_and_remove_image() {
        let temp_dir = TempDir::new().unwrap();
        let media = MediaStore::new(temp_dir.path(), "/media/");

        let relative = media
            .save_recipe_image(png_bytes(), Some("dinner.png"))
            .await
            .unwrap();
        let stored = temp_dir.path().join(&relative);
        assert!(stored.exists());
        assert_eq!(media.url_for(&relative), format!("/media/{}", relative));

        media.remove(&relative).await;
        assert!(!stored.exists());

        // Removing twice is quiet
        media.remove(&relative).await;
    }

    #[tokio::test]
    async fn test_save_rejects_non_image_without_writing() {
        let temp_dir = TempDir::new().unwrap();
        let media = MediaStore::new(temp_dir.path(), "/media");

        let result = media
            .save_recipe_image(b"plain text".to_vec(), Some("notes.png"))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(!temp_dir.path().join(RECIPE_UPLOAD_DIR).exists());
    }
}
