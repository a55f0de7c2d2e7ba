//! Page conversion: turn a raw upload into per-page raster images.
//!
//! ## Why ranged conversion?
//!
//! The scheduler converts a few pages at a time and dispatches them before
//! converting the next few, so a 300-page scan starts recognising after the
//! first batch instead of after the whole document has been decoded.
//! [`PageSource::convert_range`] is that seam; tests substitute a fake source
//! to observe the overlap.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and no async story, and
//! image decoding is pure CPU. Both run on tokio's blocking pool so the
//! worker threads keep driving network-bound engine calls.

use crate::error::ConversionError;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One rendered page. Never mutated after creation; enhancement variants
/// are copies.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 1-indexed, stable.
    pub page_number: usize,
    pub image: Arc<DynamicImage>,
    /// Resolution the page was rendered at (nominal for raster uploads).
    pub dpi: u32,
}

impl PageImage {
    pub fn new(page_number: usize, image: DynamicImage, dpi: u32) -> Self {
        Self {
            page_number,
            image: Arc::new(image),
            dpi,
        }
    }
}

/// Something that can produce page images in ranges.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Total pages in the document.
    fn page_count(&self) -> usize;

    /// Convert pages `first..=last` (1-indexed, inclusive), in page order.
    async fn convert_range(
        &self,
        first: usize,
        last: usize,
    ) -> Result<Vec<PageImage>, ConversionError>;
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// Bind the pdfium shared library.
///
/// Resolution order: `PDFIUM_LIB_PATH` or a copy in the pdfium-auto cache,
/// then a copy in the working directory, then the system library search
/// path. Nothing is downloaded here; the CLI calls
/// [`pdfium_auto::ensure_pdfium_library`] up front when it needs to.
pub fn bind_pdfium() -> Result<Pdfium, ConversionError> {
    if let Some(path) = pdfium_auto::cached_pdfium_path() {
        match pdfium_auto::bind_pdfium_from_path(&path) {
            Ok(pdfium) => return Ok(pdfium),
            Err(e) => warn!("Cached pdfium at {} did not bind: {}", path.display(), e),
        }
    }
    let bindings = Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
        .or_else(|_| Pdfium::bind_to_system_library())
        .map_err(|e| ConversionError::PdfiumUnavailable(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

/// Ranged PDF rasteriser backed by pdfium.
pub struct PdfConverter {
    bytes: Arc<Vec<u8>>,
    dpi: u32,
    max_pixels: u32,
    page_count: usize,
}

impl PdfConverter {
    /// Parse the document once to validate it and learn its page count.
    pub async fn open(bytes: Arc<Vec<u8>>, dpi: u32, max_pixels: u32) -> Result<Self, ConversionError> {
        let probe = Arc::clone(&bytes);
        let page_count = tokio::task::spawn_blocking(move || -> Result<usize, ConversionError> {
            let pdfium = bind_pdfium()?;
            let document = load_document(&pdfium, &probe)?;
            Ok(document.pages().len() as usize)
        })
        .await
        .map_err(|e| ConversionError::TaskFailed(e.to_string()))??;

        if page_count == 0 {
            return Err(ConversionError::InvalidPdf {
                detail: "document has no pages".into(),
            });
        }
        info!("PDF loaded: {} pages", page_count);

        Ok(Self {
            bytes,
            dpi,
            max_pixels,
            page_count,
        })
    }
}

#[async_trait]
impl PageSource for PdfConverter {
    fn page_count(&self) -> usize {
        self.page_count
    }

    async fn convert_range(
        &self,
        first: usize,
        last: usize,
    ) -> Result<Vec<PageImage>, ConversionError> {
        let bytes = Arc::clone(&self.bytes);
        let (dpi, max_pixels) = (self.dpi, self.max_pixels);
        let last = last.min(self.page_count);

        tokio::task::spawn_blocking(move || render_range_blocking(&bytes, first, last, dpi, max_pixels))
            .await
            .map_err(|e| ConversionError::TaskFailed(e.to_string()))?
    }
}

fn load_document<'a>(pdfium: &'a Pdfium, bytes: &'a [u8]) -> Result<PdfDocument<'a>, ConversionError> {
    pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(|e| ConversionError::InvalidPdf {
            detail: format!("{e:?}"),
        })
}

fn render_range_blocking(
    bytes: &[u8],
    first: usize,
    last: usize,
    dpi: u32,
    max_pixels: u32,
) -> Result<Vec<PageImage>, ConversionError> {
    let pdfium = bind_pdfium()?;
    let document = load_document(&pdfium, bytes)?;
    let pages = document.pages();

    let render_config = PdfRenderConfig::new()
        .scale_page_by_factor(dpi as f32 / 72.0)
        .set_maximum_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut out = Vec::with_capacity(last.saturating_sub(first) + 1);
    for page_number in first..=last {
        let render_err = |e: PdfiumError| ConversionError::PageRender {
            page: page_number,
            detail: format!("{e:?}"),
        };
        let page = pages.get((page_number - 1) as u16).map_err(render_err)?;
        let bitmap = page.render_with_config(&render_config).map_err(render_err)?;
        let image = bitmap.as_image();
        debug!(
            "Rendered page {} → {}x{} px",
            page_number,
            image.width(),
            image.height()
        );
        out.push(PageImage::new(page_number, image, dpi));
    }
    Ok(out)
}

// ── Single raster image ──────────────────────────────────────────────────

/// A one-page source wrapping an already decoded raster upload.
pub struct SingleImageSource {
    page: PageImage,
}

impl SingleImageSource {
    /// Decode `bytes` as any supported raster format.
    pub async fn open(bytes: Arc<Vec<u8>>, nominal_dpi: u32) -> Result<Self, ConversionError> {
        let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| ConversionError::TaskFailed(e.to_string()))?
            .map_err(|e| ConversionError::ImageDecode(e.to_string()))?;
        debug!("Decoded image {}x{} px", image.width(), image.height());
        Ok(Self::from_image(image, nominal_dpi))
    }

    pub fn from_image(image: DynamicImage, nominal_dpi: u32) -> Self {
        Self {
            page: PageImage::new(1, image, nominal_dpi),
        }
    }
}

#[async_trait]
impl PageSource for SingleImageSource {
    fn page_count(&self) -> usize {
        1
    }

    async fn convert_range(
        &self,
        first: usize,
        last: usize,
    ) -> Result<Vec<PageImage>, ConversionError> {
        if first <= 1 && last >= 1 {
            Ok(vec![self.page.clone()])
        } else {
            Ok(Vec::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 6, Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn single_image_source_yields_page_one() {
        let src = SingleImageSource::open(Arc::new(png_bytes()), 300)
            .await
            .unwrap();
        assert_eq!(src.page_count(), 1);
        let pages = src.convert_range(1, 4).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].page_number, 1);
        assert_eq!(pages[0].image.width(), 8);
        assert!(src.convert_range(2, 4).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn garbage_is_not_an_image() {
        let err = SingleImageSource::open(Arc::new(b"hello".to_vec()), 300)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConversionError::ImageDecode(_)));
    }
}
