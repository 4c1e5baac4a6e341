//! Single-band, north-up rasters.

use geo::{Rect, coord};

use crate::crs::Crs;

/// No-data sentinel written into unmapped cells.
pub const NO_DATA: f64 = -9999.0;

/// A single-band raster grid, row-major from the top-left cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    /// CRS of the grid coordinates.
    pub crs: Crs,
    /// Number of columns.
    pub width: usize,
    /// Number of rows.
    pub height: usize,
    /// X coordinate of the left edge.
    pub origin_x: f64,
    /// Y coordinate of the top edge.
    pub origin_y: f64,
    /// Cell size along X in CRS units.
    pub cell_width: f64,
    /// Cell size along Y in CRS units (positive; rows grow southwards).
    pub cell_height: f64,
    /// Cells equal to this value are treated as missing.
    pub no_data: Option<f64>,
    /// `width * height` cell values.
    pub data: Vec<f64>,
}

impl Raster {
    /// Creates a raster covering `extent` with the given dimensions.
    ///
    /// Returns `None` if `data.len() != width * height` or a dimension is
    /// zero.
    #[must_use]
    pub fn from_extent(
        crs: Crs,
        extent: Rect<f64>,
        width: usize,
        height: usize,
        data: Vec<f64>,
    ) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != width * height {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let (cell_width, cell_height) = (
            extent.width() / width as f64,
            extent.height() / height as f64,
        );

        Some(Self {
            crs,
            width,
            height,
            origin_x: extent.min().x,
            origin_y: extent.max().y,
            cell_width,
            cell_height,
            no_data: None,
            data,
        })
    }

    /// Returns the value at `(row, col)`.
    #[must_use]
    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.data.get(row * self.width + col).copied()
    }

    /// Returns `true` if the value is the no-data sentinel or NaN.
    #[must_use]
    pub fn is_no_data(&self, value: f64) -> bool {
        value.is_nan() || self.no_data.is_some_and(|nd| nd == value)
    }

    /// The raster's footprint.
    #[must_use]
    pub fn extent(&self) -> Rect<f64> {
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (
            self.cell_width * self.width as f64,
            self.cell_height * self.height as f64,
        );
        Rect::new(
            coord! { x: self.origin_x, y: self.origin_y - h },
            coord! { x: self.origin_x + w, y: self.origin_y },
        )
    }

    /// Builds a raster with the same grid and new cell values.
    #[must_use]
    pub fn with_data(&self, data: Vec<f64>, no_data: Option<f64>) -> Self {
        Self {
            data,
            no_data,
            ..self.clone()
        }
    }
}
