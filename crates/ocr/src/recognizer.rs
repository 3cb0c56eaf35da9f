use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Image decode error: {0}")]
    ImageDecode(String),
    #[error("OCR engine error: {0}")]
    Engine(String),
    #[error("Tesseract not available: {0}")]
    NotAvailable(String),
}

/// Abstraction over an OCR backend.
/// Implementations accept raw PNG/JPEG image bytes and return the recognized text.
pub trait OcrBackend: Send + Sync {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError>;
}

impl<T: OcrBackend + ?Sized> OcrBackend for Box<T> {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        (**self).recognize(image_bytes)
    }
}

// ── Mock backend (always available, used for tests) ───────────────────────────

/// Returns a pre-set string — useful for unit testing the scan pipeline
/// without requiring Tesseract to be installed.
pub struct MockRecognizer {
    pub text: String,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
        Ok(self.text.clone())
    }
}

// ── Tesseract executable ──────────────────────────────────────────────────────

/// Runs the `tesseract` executable, feeding the image on stdin and reading the
/// text from stdout.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: String,
    lang: String,
    psm: Option<u8>,
}

impl TesseractCli {
    pub fn new(binary: impl Into<String>, lang: impl Into<String>) -> Self {
        Self { binary: binary.into(), lang: lang.into(), psm: None }
    }

    /// Page segmentation mode passed as `--psm`.
    pub fn with_psm(mut self, psm: Option<u8>) -> Self {
        self.psm = psm;
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("stdin").arg("stdout").arg("-l").arg(&self.lang);
        if let Some(psm) = self.psm {
            cmd.arg("--psm").arg(psm.to_string());
        }
        cmd.stdin(Stdio::piped()).stdout(Stdio::piped()).stderr(Stdio::piped());
        cmd
    }
}

impl OcrBackend for TesseractCli {
    fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
        let mut child = self.command().spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => OcrError::NotAvailable(format!("'{}' not found", self.binary)),
            _ => OcrError::Engine(format!("failed to start '{}': {e}", self.binary)),
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // An engine that exits early closes the pipe; its exit status says why.
            match stdin.write_all(image_bytes) {
                Err(e) if e.kind() != ErrorKind::BrokenPipe => {
                    return Err(OcrError::Engine(format!("failed to send image: {e}")));
                }
                _ => {}
            }
        }

        let output = child
            .wait_with_output()
            .map_err(|e| OcrError::Engine(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Engine(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        tracing::debug!(bytes = output.stdout.len(), "tesseract finished");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ── In-process libtesseract (optional, `tesseract` feature) ─────────────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError};
    use leptess::{LepTess, Variable};

    /// Links libtesseract directly instead of spawning the executable. A fresh
    /// engine is created per call, so one recognizer can be shared across threads.
    #[derive(Debug, Clone)]
    pub struct TesseractRecognizer {
        tessdata: Option<String>,
        lang: String,
        psm: Option<u8>,
    }

    impl TesseractRecognizer {
        pub fn new(tessdata: Option<String>, lang: impl Into<String>) -> Self {
            Self { tessdata, lang: lang.into(), psm: None }
        }

        pub fn with_psm(mut self, psm: Option<u8>) -> Self {
            self.psm = psm;
            self
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
            let mut lt = LepTess::new(self.tessdata.as_deref(), &self.lang)
                .map_err(|e| OcrError::NotAvailable(e.to_string()))?;
            if let Some(psm) = self.psm {
                lt.set_variable(Variable::TesseditPagesegMode, &psm.to_string())
                    .map_err(|e| OcrError::Engine(e.to_string()))?;
            }
            lt.set_image_from_mem(image_bytes)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            let text = lt.get_utf8_text().map_err(|e| OcrError::Engine(e.to_string()))?;
            tracing::debug!(chars = text.len(), "libtesseract finished");
            Ok(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_returns_preset_text() {
        let r = MockRecognizer::new("STARBUCKS\n$5.50\nVISA");
        assert_eq!(r.recognize(b"fake image data").unwrap(), "STARBUCKS\n$5.50\nVISA");
    }

    #[test]
    fn mock_ignores_image_content() {
        let r = MockRecognizer::new("hello");
        assert_eq!(r.recognize(b"anything").unwrap(), "hello");
        assert_eq!(r.recognize(b"").unwrap(), "hello");
    }

    #[test]
    fn boxed_backend_delegates() {
        let r: Box<dyn OcrBackend> = Box::new(MockRecognizer::new("COSTCO"));
        assert_eq!(r.recognize(b"png").unwrap(), "COSTCO");
    }

    #[cfg(feature = "tesseract")]
    #[test]
    fn library_backend_rejects_garbage_input() {
        // Fails on missing language data or on decoding, never with text.
        let r = tesseract_backend::TesseractRecognizer::new(None, "eng").with_psm(Some(6));
        assert!(r.recognize(b"not an image").is_err());
    }

    #[test]
    fn missing_binary_is_not_available() {
        let r = TesseractCli::new("tillroll-no-such-tesseract", "eng");
        assert!(matches!(r.recognize(b"png"), Err(OcrError::NotAvailable(_))));
    }

    #[cfg(unix)]
    #[test]
    fn cli_passes_language_and_psm() {
        // `echo` stands in for tesseract and prints back its arguments.
        let r = TesseractCli::new("echo", "deu").with_psm(Some(6));
        assert_eq!(r.recognize(b"png").unwrap(), "stdin stdout -l deu --psm 6\n");
    }

    #[cfg(unix)]
    #[test]
    fn cli_failure_is_engine_error() {
        let r = TesseractCli::new("false", "eng");
        assert!(matches!(r.recognize(b"png"), Err(OcrError::Engine(_))));
    }
}
