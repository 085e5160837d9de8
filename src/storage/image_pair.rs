use std::fmt;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::error::{DecodingError, ImageFormatHint};
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, Rgb, RgbImage, Rgba};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ImportSettings;
use crate::error::{AppError, StorageError};

const FALLBACK_MIME: &str = "application/octet-stream";
const ALLOWED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "webp", "gif"];
const RETRY_JPEG_QUALITY: u8 = 75;
const MIN_JPEG_QUALITY: u8 = 50;
const JPEG_QUALITY_STEP: u8 = 5;

/// Which half of a pair an image plays at display time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageRole {
    Background,
    Overlay,
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageRole::Background => write!(f, "background"),
            ImageRole::Overlay => write!(f, "overlay"),
        }
    }
}

/// A stored pair. Field names follow the persisted record schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImagePair {
    pub id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub description: String,
    pub image1: String,
    pub image2: String,
    pub image1_name: String,
    pub image2_name: String,
}

impl ImagePair {
    pub fn image(&self, role: ImageRole) -> &str {
        match role {
            ImageRole::Background => &self.image1,
            ImageRole::Overlay => &self.image2,
        }
    }

    pub fn image_bytes(&self, role: ImageRole) -> Result<Vec<u8>, StorageError> {
        let (_, bytes) = decode_data_uri(self.image(role))?;
        Ok(bytes)
    }

    pub fn decode_image(&self, role: ImageRole) -> Result<DynamicImage, AppError> {
        let bytes = self.image_bytes(role).map_err(|err| AppError::ImageDecode {
            role,
            source: ImageError::Decoding(DecodingError::new(ImageFormatHint::Unknown, err)),
        })?;
        image::load_from_memory(&bytes).map_err(|source| AppError::ImageDecode { role, source })
    }
}

/// An image selected for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl NewImage {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| StorageError::io(path, err))?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self { name, bytes })
    }

    /// Content type sniffed from the bytes, then from the file name.
    pub fn mime_type(&self) -> &'static str {
        image::guess_format(&self.bytes)
            .ok()
            .or_else(|| ImageFormat::from_path(&self.name).ok())
            .map(|format| format.to_mime_type())
            .unwrap_or(FALLBACK_MIME)
    }

    pub fn to_data_uri(&self) -> String {
        encode_data_uri(self.mime_type(), &self.bytes)
    }

    /// Validates the upload and re-encodes it as a JPEG within `limits`.
    ///
    /// Only png, jpg, jpeg, webp and gif names are accepted and the bytes must decode.
    /// Larger images shrink to fit `max_width × max_height` keeping their aspect ratio,
    /// transparency is flattened onto white, and the JPEG quality steps down from 75
    /// while the result exceeds `max_file_size_mb`.
    pub fn normalized(&self, limits: &ImportSettings) -> Result<NewImage, AppError> {
        if !has_allowed_extension(&self.name) {
            return Err(self.invalid(format!(
                "only {} files are accepted",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let image =
            image::load_from_memory(&self.bytes).map_err(|err| self.invalid(err.to_string()))?;
        let (width, height) = (image.width(), image.height());
        let max_width = limits.max_width.max(1);
        let max_height = limits.max_height.max(1);
        let image = if width > max_width || height > max_height {
            image.resize(max_width, max_height, FilterType::Lanczos3)
        } else {
            image
        };
        let rgb = flatten_onto_white(&image);

        let max_bytes = (limits.max_file_size_mb.max(0.0) as f64 * 1024.0 * 1024.0) as usize;
        let mut bytes =
            encode_jpeg(&rgb, limits.jpeg_quality).map_err(|err| self.invalid(err.to_string()))?;
        let mut quality = RETRY_JPEG_QUALITY;
        while bytes.len() > max_bytes && quality > MIN_JPEG_QUALITY {
            bytes = encode_jpeg(&rgb, quality).map_err(|err| self.invalid(err.to_string()))?;
            quality -= JPEG_QUALITY_STEP;
        }

        debug!(
            "Imported {} {}x{} -> {}x{}, {} bytes",
            self.name,
            width,
            height,
            rgb.width(),
            rgb.height(),
            bytes.len()
        );
        Ok(NewImage {
            name: self.name.clone(),
            bytes,
        })
    }

    /// [`NewImage::normalized`] on the blocking pool.
    pub async fn normalize(self, limits: &ImportSettings) -> Result<NewImage, AppError> {
        let limits = limits.clone();
        tokio::task::spawn_blocking(move || self.normalized(&limits)).await?
    }

    fn invalid(&self, reason: String) -> AppError {
        AppError::InvalidImage {
            name: self.name.clone(),
            reason,
        }
    }
}

fn has_allowed_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let Rgba([r, g, b, a]) = *rgba.get_pixel(x, y);
        let alpha = a as u16;
        let blend = |c: u8| ((c as u16 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(image)?;
    Ok(bytes)
}

pub fn encode_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64_STANDARD.encode(bytes))
}

/// Splits a base64 data URI into its media type and payload.
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>), StorageError> {
    let rest = uri
        .strip_prefix("data:")
        .ok_or_else(|| StorageError::InvalidDataUri("missing data: scheme".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| StorageError::InvalidDataUri("missing payload separator".to_string()))?;
    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| StorageError::InvalidDataUri("only base64 payloads are supported".to_string()))?;
    let bytes = BASE64_STANDARD
        .decode(payload)
        .map_err(|err| StorageError::InvalidDataUri(err.to_string()))?;
    Ok((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use image::RgbaImage;
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn png_of(image: DynamicImage) -> Vec<u8> {
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png).unwrap();
        bytes
    }

    fn noise(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(73) ^ y.wrapping_mul(151)).wrapping_mul(2_654_435_761) >> 24;
            Rgb([v as u8, (v >> 3) as u8, (v << 2) as u8])
        }))
    }

    fn limits(max: u32) -> ImportSettings {
        ImportSettings {
            max_width: max,
            max_height: max,
            ..Settings::default().import
        }
    }

    fn pair_with(image1: String, image2: String) -> ImagePair {
        ImagePair {
            id: "pair_1_abcdefghi".to_string(),
            timestamp: 1,
            description: String::new(),
            image1,
            image2,
            image1_name: "a.png".to_string(),
            image2_name: "b.png".to_string(),
        }
    }

    #[test]
    fn data_uri_carries_sniffed_mime_type() {
        let image = NewImage::new("photo.bin", png_bytes());
        let uri = image.to_data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));

        let (mime, bytes) = decode_data_uri(&uri).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, image.bytes);
    }

    #[test]
    fn mime_falls_back_to_extension_then_octet_stream() {
        assert_eq!(NewImage::new("scan.jpg", vec![1, 2, 3]).mime_type(), "image/jpeg");
        assert_eq!(NewImage::new("notes", vec![1, 2, 3]).mime_type(), FALLBACK_MIME);
    }

    #[test]
    fn rejects_non_base64_uris() {
        assert!(matches!(
            decode_data_uri("data:text/plain,hello"),
            Err(StorageError::InvalidDataUri(_))
        ));
        assert!(decode_data_uri("https://example.com/a.png").is_err());
    }

    #[test]
    fn decodes_images_by_role() {
        let good = encode_data_uri("image/png", &png_bytes());
        let bad = encode_data_uri("image/png", b"not an image");
        let pair = pair_with(good, bad);

        let background = pair.decode_image(ImageRole::Background).unwrap();
        assert_eq!((background.width(), background.height()), (3, 2));

        let err = pair.decode_image(ImageRole::Overlay).unwrap_err();
        assert!(matches!(err, AppError::ImageDecode { role: ImageRole::Overlay, .. }));
    }

    #[test]
    fn serializes_with_record_schema_names() {
        let pair = pair_with("data:image/png;base64,AA==".to_string(), "data:image/png;base64,AA==".to_string());
        let value = serde_json::to_value(&pair).unwrap();
        assert!(value.get("image1Name").is_some());
        assert!(value.get("image2Name").is_some());
        assert_eq!(value["timestamp"], 1);
    }

    #[test]
    fn import_rejects_unlisted_extensions() {
        let err = NewImage::new("scan.bmp", png_bytes()).normalized(&limits(64)).unwrap_err();
        assert!(matches!(err, AppError::InvalidImage { ref name, .. } if name == "scan.bmp"));
        assert!(NewImage::new("noext", png_bytes()).normalized(&limits(64)).is_err());
    }

    #[test]
    fn import_rejects_undecodable_bytes() {
        let err = NewImage::new("photo.PNG", b"not an image".to_vec())
            .normalized(&limits(64))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidImage { .. }));
    }

    #[test]
    fn import_shrinks_large_images_keeping_aspect() {
        let upload = NewImage::new("wide.png", png_of(noise(200, 100)));
        let imported = upload.normalized(&limits(64)).unwrap();

        assert_eq!(imported.name, "wide.png");
        assert_eq!(imported.mime_type(), "image/jpeg");
        let decoded = image::load_from_memory(&imported.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 32));
    }

    #[test]
    fn import_keeps_small_images_at_their_size() {
        let imported = NewImage::new("tiny.png", png_bytes()).normalized(&limits(1920)).unwrap();
        let decoded = image::load_from_memory(&imported.bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }

    #[test]
    fn import_flattens_transparency_onto_white() {
        let clear = DynamicImage::ImageRgba8(RgbaImage::new(16, 16));
        let imported = NewImage::new("clear.png", png_of(clear)).normalized(&limits(64)).unwrap();
        let decoded = image::load_from_memory(&imported.bytes).unwrap().to_rgb8();
        assert!(decoded.pixels().all(|px| px.0.iter().all(|&c| c >= 250)));
    }

    #[test]
    fn import_lowers_quality_when_over_size_limit() {
        let upload = NewImage::new("noise.png", png_of(noise(128, 128)));
        let roomy = upload.normalized(&limits(1920)).unwrap();
        let tight = upload
            .normalized(&ImportSettings {
                max_file_size_mb: 0.0,
                ..limits(1920)
            })
            .unwrap();
        assert!(tight.bytes.len() < roomy.bytes.len());
    }
}
