use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::extract::Extractor;
use crate::pdf::{PageRasterizer, RasterError};
use crate::preprocess::{self, Threshold};
use crate::recognizer::{OcrBackend, OcrError};
use crate::types::{DocumentKind, ReceiptRecord};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image preprocessing failed: {0}")]
    Preprocess(#[from] crate::preprocess::PreprocessError),
    #[error("OCR recognition failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("PDF rasterization failed: {0}")]
    Raster(#[from] RasterError),
    #[error("Scan task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The result of scanning a single page.
#[derive(Debug, Clone)]
pub struct OcrResult {
    /// 1-based page number; always 1 for a plain image.
    pub page: u32,
    /// Raw OCR text output.
    pub ocr_text: String,
    /// Structured fields extracted from the OCR text.
    pub record: ReceiptRecord,
}

/// Orchestrates: (rasterize) → preprocess → OCR → extract, one page at a time.
///
/// Cloning is cheap; the backends are shared.
pub struct ReceiptPipeline<R: OcrBackend> {
    recognizer: Arc<R>,
    rasterizer: Arc<dyn PageRasterizer>,
    threshold: Threshold,
}

impl<R: OcrBackend> Clone for ReceiptPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            recognizer: Arc::clone(&self.recognizer),
            rasterizer: Arc::clone(&self.rasterizer),
            threshold: self.threshold,
        }
    }
}

impl<R: OcrBackend + 'static> ReceiptPipeline<R> {
    pub fn new(recognizer: R, rasterizer: impl PageRasterizer + 'static) -> Self {
        Self {
            recognizer: Arc::new(recognizer),
            rasterizer: Arc::new(rasterizer),
            threshold: Threshold::default(),
        }
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = threshold;
        self
    }

    /// Scan one receipt image (blocking).
    pub fn scan_image(&self, data: &[u8]) -> Result<OcrResult, PipelineError> {
        self.scan_page(data, 1)
    }

    /// Rasterize a PDF and scan every page in order (blocking).
    pub fn scan_pdf(&self, data: &[u8]) -> Result<Vec<OcrResult>, PipelineError> {
        let pages = self.rasterizer.rasterize(data)?;
        let total = pages.len();

        let mut results = Vec::with_capacity(total);
        for (i, image) in pages.iter().enumerate() {
            let page = i as u32 + 1;
            tracing::info!("Processing page {page}/{total}");
            results.push(self.scan_page(image, page)?);
        }
        Ok(results)
    }

    /// Scan a document of known kind; images yield exactly one result.
    pub fn scan(&self, data: &[u8], kind: DocumentKind) -> Result<Vec<OcrResult>, PipelineError> {
        match kind {
            DocumentKind::Image => Ok(vec![self.scan_image(data)?]),
            DocumentKind::Pdf => self.scan_pdf(data),
        }
    }

    /// Scan an uploaded image on the blocking pool.
    pub async fn process_image_bytes(&self, data: Vec<u8>) -> Result<OcrResult, PipelineError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.scan_image(&data)).await?
    }

    /// Scan raw bytes (image or PDF, sniffed from content then `ext`) on the
    /// blocking pool.
    pub async fn process_bytes(
        &self,
        data: Vec<u8>,
        ext: &str,
    ) -> Result<Vec<OcrResult>, PipelineError> {
        let kind = DocumentKind::detect(&data, ext);
        tracing::debug!(%kind, bytes = data.len(), "scanning document");
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.scan(&data, kind)).await?
    }

    /// Process a file on disk.
    pub async fn process_file(&self, path: &Path) -> Result<Vec<OcrResult>, PipelineError> {
        let bytes = tokio::fs::read(path).await?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin")
            .to_lowercase();
        self.process_bytes(bytes, &ext).await
    }

    fn scan_page(&self, image: &[u8], page: u32) -> Result<OcrResult, PipelineError> {
        let png = preprocess::prepare_for_ocr_from_bytes(image, self.threshold)?;
        let ocr_text = self.recognizer.recognize(&png)?;
        let record = Extractor::extract(&ocr_text);
        tracing::debug!(page, chars = ocr_text.len(), items = record.items.len(), "page extracted");
        Ok(OcrResult { page, ocr_text, record })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::MockRecognizer;
    use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tiny_png() -> Vec<u8> {
        let img: GrayImage = ImageBuffer::from_fn(4, 4, |x, _| Luma([if x < 2 { 20 } else { 200 }]));
        let mut buf = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    /// Hands out `n` identical page images.
    struct FixedPages(usize);

    impl PageRasterizer for FixedPages {
        fn rasterize(&self, _pdf: &[u8]) -> Result<Vec<Vec<u8>>, RasterError> {
            Ok((0..self.0).map(|_| tiny_png()).collect())
        }
    }

    struct NoPages;

    impl PageRasterizer for NoPages {
        fn rasterize(&self, _pdf: &[u8]) -> Result<Vec<Vec<u8>>, RasterError> {
            Err(RasterError::NoPages)
        }
    }

    /// Returns the next preset text on every call.
    struct Sequence {
        texts: Vec<&'static str>,
        next: AtomicUsize,
    }

    impl Sequence {
        fn new(texts: Vec<&'static str>) -> Self {
            Self { texts, next: AtomicUsize::new(0) }
        }
    }

    impl OcrBackend for Sequence {
        fn recognize(&self, _image_bytes: &[u8]) -> Result<String, OcrError> {
            let i = self.next.fetch_add(1, Ordering::SeqCst);
            Ok(self.texts[i % self.texts.len()].to_string())
        }
    }

    #[test]
    fn scan_image_extracts_record() {
        let pipeline = ReceiptPipeline::new(
            MockRecognizer::new("STARBUCKS\n03/15/2024\nLatte 5.50\nTotal $5.50\nVISA"),
            FixedPages(0),
        );
        let result = pipeline.scan_image(&tiny_png()).unwrap();
        assert_eq!(result.page, 1);
        assert_eq!(result.record.store, "STARBUCKS");
        assert_eq!(result.record.total, "5.50");
        assert_eq!(result.record.payment_method, "VISA");
        assert_eq!(result.record.items.len(), 1);
    }

    #[test]
    fn scan_pdf_yields_one_result_per_page_in_order() {
        let pipeline = ReceiptPipeline::new(
            Sequence::new(vec!["SHOP ONE\nTotal 1.00", "SHOP TWO\nTotal 2.00", "SHOP THREE"]),
            FixedPages(3),
        );
        let results = pipeline.scan_pdf(b"%PDF-1.4").unwrap();
        let pages: Vec<u32> = results.iter().map(|r| r.page).collect();
        let stores: Vec<&str> = results.iter().map(|r| r.record.store.as_str()).collect();
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(stores, vec!["SHOP ONE", "SHOP TWO", "SHOP THREE"]);
        assert_eq!(results[2].record.total, "Unknown Total");
    }

    #[test]
    fn scan_pdf_propagates_rasterizer_error() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::new(""), NoPages);
        let err = pipeline.scan_pdf(b"%PDF-1.4").unwrap_err();
        assert!(matches!(err, PipelineError::Raster(RasterError::NoPages)));
    }

    #[test]
    fn empty_ocr_text_gives_fallback_record() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::new(""), FixedPages(0));
        let result = pipeline.scan_image(&tiny_png()).unwrap();
        assert_eq!(result.record, ReceiptRecord::default());
    }

    #[tokio::test]
    async fn process_bytes_sniffs_pdf_magic() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::new("PAGE"), FixedPages(2));
        let results = pipeline.process_bytes(b"%PDF-1.7 ...".to_vec(), "upload").await.unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn process_bytes_image_is_single_page() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::new("PAGE"), FixedPages(5));
        let results = pipeline.process_bytes(tiny_png(), "png").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.store, "PAGE");
    }

    #[tokio::test]
    async fn process_image_bytes_rejects_undecodable_upload() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::new("irrelevant"), FixedPages(0));
        let err = pipeline.process_image_bytes(b"not an image".to_vec()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Preprocess(_)));
    }

    #[tokio::test]
    async fn process_file_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("receipt.png");
        std::fs::write(&path, tiny_png()).unwrap();

        let pipeline = ReceiptPipeline::new(MockRecognizer::new("COSTCO\nTotal $99.99"), FixedPages(0));
        let results = pipeline.process_file(&path).await.unwrap();
        assert_eq!(results[0].record.total, "99.99");
        assert_eq!(results[0].ocr_text, "COSTCO\nTotal $99.99");
    }

    #[tokio::test]
    async fn process_file_missing_is_io_error() {
        let pipeline = ReceiptPipeline::new(MockRecognizer::new(""), FixedPages(0));
        let err = pipeline.process_file(Path::new("/nonexistent/receipt.png")).await.unwrap_err();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
