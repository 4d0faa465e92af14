//! Upload validation: size ceiling and image sniffing.
//!
//! Runs before the cooldown is consumed and before any model call, so an
//! oversized or non-image upload costs nothing. The format is sniffed from
//! magic bytes rather than trusted from a file extension.

use crate::error::TaxShieldError;
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// An upload that passed validation.
#[derive(Debug, Clone)]
pub struct StubImage {
    pub bytes: Vec<u8>,
    /// `image/jpeg` or `image/png`.
    pub mime_type: &'static str,
}

/// Validate raw upload bytes against the size ceiling and accepted formats.
pub fn validate_upload(bytes: Vec<u8>, max_bytes: usize) -> Result<StubImage, TaxShieldError> {
    if bytes.is_empty() {
        return Err(TaxShieldError::MissingFile);
    }
    if bytes.len() > max_bytes {
        return Err(TaxShieldError::FileTooLarge {
            size: bytes.len(),
            limit: max_bytes,
        });
    }

    let format = image::guess_format(&bytes).map_err(|e| TaxShieldError::UnsupportedImage {
        detail: e.to_string(),
    })?;
    let mime_type = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        other => {
            return Err(TaxShieldError::UnsupportedImage {
                detail: format!("{other:?} images are not accepted"),
            })
        }
    };

    debug!("Accepted {} upload, {} bytes", mime_type, bytes.len());
    Ok(StubImage { bytes, mime_type })
}

/// Read an image from disk and validate it.
///
/// The file size is checked from metadata first so an oversized file is
/// rejected without being read into memory.
pub async fn read_upload(path: &Path, max_bytes: usize) -> Result<StubImage, TaxShieldError> {
    let meta = tokio::fs::metadata(path).await.map_err(|e| map_read_error(path, e))?;
    if !meta.is_file() {
        return Err(TaxShieldError::MissingFile);
    }
    let size = usize::try_from(meta.len()).unwrap_or(usize::MAX);
    if size > max_bytes {
        return Err(TaxShieldError::FileTooLarge {
            size,
            limit: max_bytes,
        });
    }

    let bytes = tokio::fs::read(path).await.map_err(|e| map_read_error(path, e))?;
    validate_upload(bytes, max_bytes)
}

fn map_read_error(path: &Path, e: std::io::Error) -> TaxShieldError {
    if e.kind() == std::io::ErrorKind::NotFound {
        TaxShieldError::MissingFile
    } else {
        TaxShieldError::UploadReadFailed {
            path: path.to_path_buf(),
            source: e,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Cursor;

    pub(crate) fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .expect("encode png");
        buf
    }

    fn jpeg_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .expect("encode jpeg");
        buf
    }

    #[test]
    fn accepts_png_and_jpeg() {
        assert_eq!(validate_upload(png_bytes(), 1 << 20).unwrap().mime_type, "image/png");
        assert_eq!(validate_upload(jpeg_bytes(), 1 << 20).unwrap().mime_type, "image/jpeg");
    }

    #[test]
    fn rejects_empty_upload() {
        assert!(matches!(
            validate_upload(Vec::new(), 1 << 20),
            Err(TaxShieldError::MissingFile)
        ));
    }

    #[test]
    fn rejects_oversized_before_sniffing() {
        // Not an image either; size must win.
        let err = validate_upload(vec![0u8; 101], 100).unwrap_err();
        assert!(
            matches!(err, TaxShieldError::FileTooLarge { size: 101, limit: 100 }),
            "got: {err:?}"
        );
    }

    #[test]
    fn exactly_at_limit_is_accepted() {
        let png = png_bytes();
        let limit = png.len();
        assert!(validate_upload(png, limit).is_ok());
    }

    #[test]
    fn rejects_non_image() {
        let err = validate_upload(b"%PDF-1.7 not a photo".to_vec(), 1 << 20).unwrap_err();
        assert!(matches!(err, TaxShieldError::UnsupportedImage { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn read_upload_checks_size_from_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stub.png");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();
        let err = read_upload(&path, 1024).await.unwrap_err();
        assert!(matches!(err, TaxShieldError::FileTooLarge { size: 2048, .. }));
    }

    #[tokio::test]
    async fn read_upload_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_upload(&dir.path().join("nope.jpg"), 1024).await.unwrap_err();
        assert!(matches!(err, TaxShieldError::MissingFile));
    }
}
