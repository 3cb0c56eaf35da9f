pub mod config;
pub mod extract;
pub mod pdf;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use config::{ConfigError, OcrEngine, ScanConfig};
pub use extract::{parse, Extractor};
pub use pdf::{PageRasterizer, Pdftoppm, RasterError};
pub use pipeline::{OcrResult, PipelineError, ReceiptPipeline};
pub use preprocess::{prepare_for_ocr, prepare_for_ocr_from_bytes, PreprocessError, Threshold};
pub use recognizer::{MockRecognizer, OcrBackend, OcrError, TesseractCli};
pub use types::{DocumentKind, LineItem, ReceiptRecord};
