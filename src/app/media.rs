use std::io::Cursor;

use anyhow::{anyhow, Result};
use image::{ImageFormat, ImageReader, Limits};
use uuid::Uuid;

use crate::domain::post::Post;
use crate::infra::storage::ObjectStorage;

/// An upload that decoded as a supported image.
#[derive(Debug, Clone)]
pub struct CheckedImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

impl CheckedImage {
    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }
}

const SUPPORTED_FORMATS: [ImageFormat; 4] = [
    ImageFormat::Gif,
    ImageFormat::Png,
    ImageFormat::Jpeg,
    ImageFormat::WebP,
];

/// Largest width or height accepted for an uploaded image.
pub const MAX_IMAGE_DIMENSION: u32 = 6000;

/// Decoded pixels may take this many times the upload cap.
const DECODE_ALLOC_FACTOR: u64 = 12;

/// Bounds applied while decoding an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLimits {
    pub max_dimension: u32,
    pub max_alloc: u64,
}

impl ImageLimits {
    pub fn for_upload(upload_max_bytes: usize) -> Self {
        Self {
            max_dimension: MAX_IMAGE_DIMENSION,
            max_alloc: (upload_max_bytes as u64).saturating_mul(DECODE_ALLOC_FACTOR),
        }
    }

    fn decoder_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        limits.max_alloc = Some(self.max_alloc);
        limits
    }
}

/// Sniffs and fully decodes `bytes` within `limits`, rejecting anything that
/// is not a readable gif/png/jpeg/webp. Blocks; see [`check_image`].
pub fn inspect_image(bytes: Vec<u8>, limits: ImageLimits) -> Result<CheckedImage> {
    let format = image::guess_format(&bytes).map_err(|err| anyhow!("unknown image format: {}", err))?;
    if !SUPPORTED_FORMATS.contains(&format) {
        return Err(anyhow!("unsupported image format: {:?}", format));
    }

    let mut reader = ImageReader::with_format(Cursor::new(bytes.as_slice()), format);
    reader.limits(limits.decoder_limits());
    let decoded = reader
        .decode()
        .map_err(|err| anyhow!("failed to decode image: {}", err))?;
    let (width, height) = (decoded.width(), decoded.height());
    drop(decoded);

    Ok(CheckedImage {
        format,
        width,
        height,
        bytes,
    })
}

/// [`inspect_image`] on the blocking pool.
pub async fn check_image(bytes: Vec<u8>, limits: ImageLimits) -> Result<CheckedImage> {
    tokio::task::spawn_blocking(move || inspect_image(bytes, limits))
        .await
        .map_err(|err| anyhow!("image check task failed: {}", err))?
}

#[derive(Clone)]
pub struct MediaService {
    storage: ObjectStorage,
}

impl MediaService {
    pub fn new(storage: ObjectStorage) -> Self {
        Self { storage }
    }

    /// Uploads a post image and returns its object key.
    pub async fn store_post_image(&self, author_id: Uuid, image: CheckedImage) -> Result<String> {
        let key = format!("posts/{}/{}.{}", author_id, Uuid::new_v4(), image.extension());
        let content_type = image.content_type();
        self.storage
            .put_object(&key, content_type, image.bytes)
            .await?;
        tracing::info!(key = %key, bucket = %self.storage.bucket(), "stored post image");
        Ok(key)
    }

    /// Deletes the freshly stored `key` unless `outcome` saved a row that
    /// references it. `outcome` is passed through.
    pub async fn discard_unless_saved<T>(
        &self,
        key: Option<&str>,
        outcome: Result<Option<T>>,
    ) -> Result<Option<T>> {
        if let Some(key) = key {
            if !matches!(outcome, Ok(Some(_))) {
                self.delete_image(key).await;
            }
        }
        outcome
    }

    pub async fn delete_image(&self, key: &str) {
        if let Err(err) = self.storage.delete_object(key).await {
            tracing::warn!(error = ?err, key = %key, "failed to delete post image");
        }
    }

    pub fn populate_image_url(&self, post: &mut Post) {
        post.image_url = post
            .image_key
            .as_deref()
            .map(|key| self.storage.public_url(key));
    }

    pub fn populate_image_urls(&self, posts: &mut [Post]) {
        for post in posts {
            self.populate_image_url(post);
        }
    }
}
