use std::io;
use std::path::Path;
use std::process::Command;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to run '{binary}': {source}")]
    Spawn { binary: String, source: io::Error },
    #[error("PDF rasterizer failed: {0}")]
    Failed(String),
    #[error("PDF rendered no pages")]
    NoPages,
}

/// Turns a PDF into one encoded image per page, in page order.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf: &[u8]) -> Result<Vec<Vec<u8>>, RasterError>;
}

/// Renders pages with poppler's `pdftoppm` into a scratch directory.
#[derive(Debug, Clone)]
pub struct Pdftoppm {
    binary: String,
    dpi: u32,
}

impl Pdftoppm {
    pub fn new(binary: impl Into<String>, dpi: u32) -> Self {
        Self { binary: binary.into(), dpi }
    }
}

impl Default for Pdftoppm {
    fn default() -> Self {
        Self::new("pdftoppm", 300)
    }
}

impl PageRasterizer for Pdftoppm {
    fn rasterize(&self, pdf: &[u8]) -> Result<Vec<Vec<u8>>, RasterError> {
        let scratch = tempfile::tempdir()?;
        let input = scratch.path().join("input.pdf");
        std::fs::write(&input, pdf)?;

        let output = Command::new(&self.binary)
            .arg("-png")
            .arg("-r")
            .arg(self.dpi.to_string())
            .arg(&input)
            .arg(scratch.path().join("page"))
            .output()
            .map_err(|source| RasterError::Spawn { binary: self.binary.clone(), source })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RasterError::Failed(stderr.trim().to_string()));
        }

        let pages = collect_pages(scratch.path())?;
        tracing::debug!(pages = pages.len(), dpi = self.dpi, "rasterized pdf");
        Ok(pages)
    }
}

/// Read back `page-N.png` files in page order. pdftoppm zero-pads the page
/// number, so sorting by name is sorting by page.
fn collect_pages(dir: &Path) -> Result<Vec<Vec<u8>>, RasterError> {
    let mut files: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "png"))
        .collect();

    if files.is_empty() {
        return Err(RasterError::NoPages);
    }

    files.sort();
    files
        .iter()
        .map(|p| std::fs::read(p).map_err(RasterError::from))
        .collect()
}
