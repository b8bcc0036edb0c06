use std::io::Cursor;
use std::path::Path;

use image::{DynamicImage, ImageFormat};
use thiserror::Error;
use tokio::process::Command;
use uuid::Uuid;

use crate::core::config::Settings;

const PDF_MAGIC: &[u8] = b"%PDF-";
const PDF_MAGIC_WINDOW: usize = 1024;

#[derive(Debug, Error)]
pub(crate) enum DecodeError {
    #[error("Unsupported file type: upload a PDF or an image")]
    Unsupported,
    #[error("Failed to decode image: {0}")]
    Image(#[from] image::ImageError),
    #[error("Failed to rasterize PDF: {0}")]
    Pdf(String),
    #[error("Image decoding task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UploadKind {
    Pdf,
    Image(ImageFormat),
}

/// Classifies an upload by its content; the declared type alone is not trusted.
pub(crate) fn sniff_upload(bytes: &[u8]) -> Option<UploadKind> {
    let head = &bytes[..bytes.len().min(PDF_MAGIC_WINDOW)];
    if head.windows(PDF_MAGIC.len()).any(|window| window == PDF_MAGIC) {
        return Some(UploadKind::Pdf);
    }
    image::guess_format(bytes).ok().map(UploadKind::Image)
}

/// Renders the first page of a PDF with `pdftoppm`.
#[derive(Debug, Clone)]
pub(crate) struct PdfRasterizer {
    binary: String,
    dpi: u32,
}

impl PdfRasterizer {
    pub(crate) fn from_settings(settings: &Settings) -> Self {
        Self {
            binary: settings.vision().pdftoppm_bin.clone(),
            dpi: settings.vision().pdf_render_dpi,
        }
    }

    pub(crate) async fn first_page(&self, pdf: &[u8]) -> Result<DynamicImage, DecodeError> {
        let workdir = std::env::temp_dir().join(format!("gabarito-pdf-{}", Uuid::new_v4()));
        tokio::fs::create_dir_all(&workdir)
            .await
            .map_err(|err| DecodeError::Pdf(format!("temp dir: {err}")))?;

        let result = self.render_in(&workdir, pdf).await;

        if let Err(err) = tokio::fs::remove_dir_all(&workdir).await {
            tracing::warn!(error = %err, path = %workdir.display(), "Failed to clean PDF workdir");
        }
        result
    }

    async fn render_in(&self, workdir: &Path, pdf: &[u8]) -> Result<DynamicImage, DecodeError> {
        let input = workdir.join("upload.pdf");
        tokio::fs::write(&input, pdf)
            .await
            .map_err(|err| DecodeError::Pdf(format!("write input: {err}")))?;

        let prefix = workdir.join("page");
        let output = Command::new(&self.binary)
            .args(["-f", "1", "-l", "1", "-r", &self.dpi.to_string(), "-png", "-singlefile"])
            .arg(&input)
            .arg(&prefix)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|err| DecodeError::Pdf(format!("failed to run {}: {err}", self.binary)))?;

        if !output.status.success() {
            return Err(DecodeError::Pdf(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let page = tokio::fs::read(workdir.join("page.png"))
            .await
            .map_err(|_| DecodeError::Pdf("PDF has no pages".to_string()))?;
        Ok(image::load_from_memory_with_format(&page, ImageFormat::Png)?)
    }
}

/// Turns an uploaded PDF or image into pixels.
pub(crate) async fn decode_upload(
    rasterizer: &PdfRasterizer,
    bytes: &[u8],
) -> Result<DynamicImage, DecodeError> {
    match sniff_upload(bytes).ok_or(DecodeError::Unsupported)? {
        UploadKind::Pdf => rasterizer.first_page(bytes).await,
        UploadKind::Image(format) => {
            let owned = bytes.to_vec();
            tokio::task::spawn_blocking(move || image::load_from_memory_with_format(&owned, format))
                .await
                .map_err(|err| DecodeError::Task(err.to_string()))?
                .map_err(DecodeError::from)
        }
    }
}

pub(crate) fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Vec::new();
    DynamicImage::ImageRgb8(image.to_rgb8()).write_to(&mut Cursor::new(&mut buffer), ImageFormat::Jpeg)?;
    Ok(buffer)
}
