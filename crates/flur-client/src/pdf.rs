//! PDF text layer extraction and the external OCR fallback.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use flur_core::error::AppError;
use flur_core::traits::{ExtractedText, OcrEngine, TextExtractor};

/// Reads the embedded text of every page with `lopdf`.
///
/// Pages whose content cannot be decoded contribute no text but still count
/// towards `page_count`, which is what the OCR threshold needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText, AppError> {
        let document = lopdf::Document::load_mem(bytes)
            .map_err(|e| AppError::ExtractionError(format!("Unreadable PDF: {e}")))?;

        let pages: Vec<u32> = document.get_pages().keys().copied().collect();
        let mut text = String::new();
        for page in &pages {
            match document.extract_text(&[*page]) {
                Ok(page_text) => {
                    if !text.is_empty() && !page_text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(page_text.trim_end());
                }
                Err(e) => tracing::debug!(page, error = %e, "No text layer on page"),
            }
        }

        Ok(ExtractedText {
            text,
            page_count: pages.len(),
        })
    }
}

/// Placeholder in `OCR_COMMAND` replaced by the path of the downloaded PDF.
pub const INPUT_PLACEHOLDER: &str = "{input}";

const OCR_TIMEOUT: Duration = Duration::from_secs(300);

/// OCR through an external command that prints recognized text on stdout,
/// e.g. `ocrmypdf --force-ocr --output-type none --sidecar - {input} -`.
///
/// Without `{input}` in the template, the file path is appended.
#[derive(Debug, Clone)]
pub struct CommandOcr {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOcr {
    /// Resolve the command once at startup. `None` when the template is
    /// empty or its program is not installed.
    pub fn detect(template: &str) -> Option<Self> {
        let mut parts = template.split_whitespace();
        let program = parts.next()?;
        let Some(program) = resolve_program(program) else {
            tracing::warn!(program = %program, "OCR program not found, OCR fallback disabled");
            return None;
        };
        let mut args: Vec<String> = parts.map(str::to_string).collect();
        if !args.iter().any(|a| a.contains(INPUT_PLACEHOLDER)) {
            args.push(INPUT_PLACEHOLDER.to_string());
        }

        tracing::info!(program = %program.display(), "OCR fallback enabled");
        Some(Self {
            program,
            args,
            timeout: OCR_TIMEOUT,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|full| full.is_file())
}

impl OcrEngine for CommandOcr {
    async fn ocr(&self, bytes: &[u8]) -> Result<String, AppError> {
        let mut input = tempfile::Builder::new()
            .prefix("flur-ocr-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| AppError::ExtractionError(format!("Cannot create OCR input: {e}")))?;
        input
            .write_all(bytes)
            .and_then(|_| input.flush())
            .map_err(|e| AppError::ExtractionError(format!("Cannot write OCR input: {e}")))?;

        let path = input.path().to_string_lossy().into_owned();
        let args: Vec<String> = self
            .args
            .iter()
            .map(|a| a.replace(INPUT_PLACEHOLDER, &path))
            .collect();

        let output = tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.program)
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| AppError::Timeout(self.timeout.as_secs()))?
        .map_err(|e| AppError::ExtractionError(format!("OCR command failed to start: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::ExtractionError(format!(
                "OCR command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
