use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pdf::Pdftoppm;
use crate::pipeline::ReceiptPipeline;
use crate::preprocess::Threshold;
use crate::recognizer::{OcrBackend, TesseractCli};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("OCR engine `{0}` is not compiled in; rebuild with the `tesseract` feature")]
    EngineUnavailable(OcrEngine),
}

/// Which Tesseract integration runs the recognition step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngine {
    /// Spawn the `tesseract` executable per image.
    #[default]
    Cli,
    /// Link libtesseract in-process.
    Library,
}

impl std::fmt::Display for OcrEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OcrEngine::Cli => write!(f, "cli"),
            OcrEngine::Library => write!(f, "library"),
        }
    }
}

/// Settings for the external tools the scan pipeline shells out to.
/// Every key is optional; missing ones take the defaults below.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub ocr: OcrSettings,
    pub pdf: PdfSettings,
    pub preprocess: PreprocessSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub engine: OcrEngine,
    /// Tesseract executable, looked up on `PATH` unless absolute.
    pub tesseract: String,
    /// `tessdata` directory for the library engine; the system default when unset.
    pub tessdata: Option<String>,
    pub lang: String,
    pub psm: Option<u8>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            engine: OcrEngine::Cli,
            tesseract: "tesseract".to_string(),
            tessdata: None,
            lang: "eng".to_string(),
            psm: Some(3),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfSettings {
    pub pdftoppm: String,
    pub dpi: u32,
}

impl Default for PdfSettings {
    fn default() -> Self {
        Self { pdftoppm: "pdftoppm".to_string(), dpi: 300 }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    pub threshold: Threshold,
}

impl ScanConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_content)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn recognizer(&self) -> Result<Box<dyn OcrBackend>, ConfigError> {
        match self.ocr.engine {
            OcrEngine::Cli => Ok(Box::new(
                TesseractCli::new(&self.ocr.tesseract, &self.ocr.lang).with_psm(self.ocr.psm),
            )),
            #[cfg(feature = "tesseract")]
            OcrEngine::Library => Ok(Box::new(
                crate::recognizer::tesseract_backend::TesseractRecognizer::new(
                    self.ocr.tessdata.clone(),
                    &self.ocr.lang,
                )
                .with_psm(self.ocr.psm),
            )),
            #[cfg(not(feature = "tesseract"))]
            OcrEngine::Library => Err(ConfigError::EngineUnavailable(OcrEngine::Library)),
        }
    }

    pub fn rasterizer(&self) -> Pdftoppm {
        Pdftoppm::new(&self.pdf.pdftoppm, self.pdf.dpi)
    }

    /// Pipeline wired to the configured OCR engine and pdftoppm executable.
    pub fn pipeline(&self) -> Result<ReceiptPipeline<Box<dyn OcrBackend>>, ConfigError> {
        Ok(ReceiptPipeline::new(self.recognizer()?, self.rasterizer())
            .with_threshold(self.preprocess.threshold))
    }
}
