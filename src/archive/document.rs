//! Page layout for document output
//!
//! Every image gets its own page. The image is scaled to fit the page while
//! keeping its aspect ratio and centered on both axes. Encoding the laid-out
//! pages into document bytes is the auxiliary context's job.

use crate::error::Result;
use crate::types::FetchedAsset;
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Page dimensions in millimetres
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PageSize {
    /// Page width
    pub width_mm: f64,
    /// Page height
    pub height_mm: f64,
}

impl PageSize {
    /// ISO A4, portrait
    pub const A4: PageSize = PageSize {
        width_mm: 210.0,
        height_mm: 297.0,
    };
}

impl Default for PageSize {
    fn default() -> Self {
        Self::A4
    }
}

/// Where an image is drawn on its page, in millimetres from the top-left corner
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Left offset
    pub x_mm: f64,
    /// Top offset
    pub y_mm: f64,
    /// Drawn width
    pub width_mm: f64,
    /// Drawn height
    pub height_mm: f64,
}

/// One laid-out page
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentPage {
    /// Index of the source asset
    pub index: usize,
    /// Image format as a file extension (`png`, `jpeg`, ...)
    pub format: String,
    /// Source pixel width
    pub pixel_width: u32,
    /// Source pixel height
    pub pixel_height: u32,
    /// Drawing position
    pub placement: Placement,
    /// Image bytes
    pub bytes: Vec<u8>,
}

/// Everything the auxiliary context needs to encode one document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentRequest {
    /// Document title (the chapter name)
    pub title: String,
    /// Size shared by every page
    pub page_size: PageSize,
    /// Pages in output order
    pub pages: Vec<DocumentPage>,
}

/// Scale `width` × `height` pixels to fit `page`, preserving aspect ratio, centered
pub fn fit_to_page(width: u32, height: u32, page: PageSize) -> Placement {
    if width == 0 || height == 0 {
        return Placement {
            x_mm: page.width_mm / 2.0,
            y_mm: page.height_mm / 2.0,
            width_mm: 0.0,
            height_mm: 0.0,
        };
    }
    let (w, h) = (f64::from(width), f64::from(height));
    let ratio = (page.width_mm / w).min(page.height_mm / h);
    let (width_mm, height_mm) = (w * ratio, h * ratio);
    Placement {
        x_mm: (page.width_mm - width_mm) / 2.0,
        y_mm: (page.height_mm - height_mm) / 2.0,
        width_mm,
        height_mm,
    }
}

/// Read pixel dimensions without decoding the whole image
pub fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let reader = image::ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}

/// Lay out fetched assets one per page, in the order given
///
/// Images whose dimensions cannot be read are skipped with a warning.
pub fn layout_document(title: &str, assets: Vec<FetchedAsset>, page_size: PageSize) -> DocumentRequest {
    let mut pages = Vec::with_capacity(assets.len());
    for asset in assets {
        let (pixel_width, pixel_height) = match image_dimensions(&asset.bytes) {
            Ok(dims) => dims,
            Err(e) => {
                tracing::warn!(index = asset.index, error = %e, "skipping unreadable image");
                continue;
            }
        };
        pages.push(DocumentPage {
            index: asset.index,
            format: asset.extension(),
            pixel_width,
            pixel_height,
            placement: fit_to_page(pixel_width, pixel_height, page_size),
            bytes: asset.bytes,
        });
    }
    DocumentRequest {
        title: title.to_string(),
        page_size,
        pages,
    }
}
