use std::io::Cursor;
use std::process::Stdio;

use anyhow::{bail, Context};
use async_trait::async_trait;
use image::{imageops, GrayImage, ImageFormat};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Rows at the top of the page that carry the printed code label.
pub(crate) const CODE_REGION_HEIGHT: u32 = 150;
const MAX_CODE_CHARS: usize = 12;
const CODE_LABELS: [&str; 2] = ["CODE", "CÓDIGO"];

#[async_trait]
pub(crate) trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &GrayImage) -> anyhow::Result<String>;
}

/// Runs the `tesseract` binary with the image on stdin and text on stdout.
#[derive(Debug, Clone)]
pub(crate) struct TesseractCli {
    binary: String,
}

impl TesseractCli {
    pub(crate) fn new(binary: impl Into<String>) -> Self {
        Self { binary: binary.into() }
    }
}

#[async_trait]
impl TextRecognizer for TesseractCli {
    async fn recognize(&self, image: &GrayImage) -> anyhow::Result<String> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("Failed to encode OCR region")?;

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start {}", self.binary))?;

        let mut stdin = child.stdin.take().context("tesseract stdin unavailable")?;
        stdin.write_all(&png).await.context("Failed to pipe image to tesseract")?;
        drop(stdin);

        let output = child.wait_with_output().await.context("tesseract did not finish")?;
        if !output.status.success() {
            bail!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Reads the printed sheet code from the top of the page, if any.
pub(crate) async fn extract_sheet_code(
    recognizer: &dyn TextRecognizer,
    gray: &GrayImage,
) -> Option<String> {
    let height = gray.height().min(CODE_REGION_HEIGHT);
    let region = imageops::crop_imm(gray, 0, 0, gray.width(), height).to_image();

    match recognizer.recognize(&region).await {
        Ok(text) => {
            let code = parse_code_line(&text);
            if code.is_none() {
                tracing::debug!("No code label found in OCR text");
            }
            code
        }
        Err(err) => {
            tracing::warn!(error = %err, "OCR of sheet code failed");
            None
        }
    }
}

pub(crate) fn parse_code_line(text: &str) -> Option<String> {
    text.lines()
        .filter(|line| {
            let upper = line.to_uppercase();
            CODE_LABELS.iter().any(|label| upper.contains(label))
        })
        .find_map(|line| {
            let (_, rest) = line.split_once(':')?;
            let code: String = rest
                .trim()
                .replace(' ', "")
                .chars()
                .take(MAX_CODE_CHARS)
                .collect::<String>()
                .to_uppercase();
            (!code.is_empty()).then_some(code)
        })
}
