//! Built-in reference dataset types.

use serde::{Deserialize, Serialize};

/// A dataset that can be checked for internal consistency after decoding.
pub trait Dataset {
    /// Short name used in error messages.
    const KIND: &'static str;

    /// Validates the decoded dataset.
    ///
    /// # Errors
    ///
    /// Returns a description of the first inconsistency found.
    fn validate(&self) -> Result<(), String>;
}

/// A north-up regular grid of values in a projected coordinate system.
///
/// Row 0 is the northernmost row; `values` is row-major.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterGrid {
    /// Western edge of column 0.
    pub x_min: f64,
    /// Northern edge of row 0.
    pub y_max: f64,
    /// Cell edge length, in the same units as the coordinates.
    pub cell_size: f64,
    /// Number of columns.
    pub ncols: usize,
    /// Number of rows.
    pub nrows: usize,
    /// Value marking cells without data.
    #[serde(default)]
    pub nodata: Option<f32>,
    /// Cell values.
    pub values: Vec<f32>,
}

impl RasterGrid {
    /// Returns the value of the cell containing `(x, y)`.
    ///
    /// `None` outside the grid, on nodata cells and on NaN cells.
    #[must_use]
    pub fn value_at(&self, x: f64, y: f64) -> Option<f32> {
        let col = ((x - self.x_min) / self.cell_size).floor();
        let row = ((self.y_max - y) / self.cell_size).floor();
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let (col, row) = (col as usize, row as usize);
        if col >= self.ncols || row >= self.nrows {
            return None;
        }
        let value = *self.values.get(row * self.ncols + col)?;
        if value.is_nan() || self.nodata == Some(value) {
            return None;
        }
        Some(value)
    }

    /// Samples many points at once.
    #[must_use]
    pub fn values_at(&self, xs: &[f64], ys: &[f64]) -> Vec<Option<f32>> {
        xs.iter().zip(ys).map(|(&x, &y)| self.value_at(x, y)).collect()
    }
}

impl Dataset for RasterGrid {
    const KIND: &'static str = "raster_grid";

    fn validate(&self) -> Result<(), String> {
        if !(self.cell_size > 0.0) {
            return Err(format!("cell_size must be positive, got {}", self.cell_size));
        }
        if self.ncols == 0 || self.nrows == 0 {
            return Err("grid has no cells".to_string());
        }
        let expected = self.ncols * self.nrows;
        if self.values.len() != expected {
            return Err(format!(
                "expected {expected} values for {}x{} grid, got {}",
                self.nrows,
                self.ncols,
                self.values.len()
            ));
        }
        Ok(())
    }
}

/// Elevation uncertainty binned by surface slope.
///
/// `values[i]` covers the slope interval
/// `[min_slope + i * w, min_slope + (i + 1) * w)` where
/// `w = (max_slope - min_slope) / values.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyTable {
    /// Lower edge of the first bin, in degrees.
    pub min_slope: f64,
    /// Upper edge of the last bin, in degrees.
    pub max_slope: f64,
    /// Uncertainty per bin, in metres.
    pub values: Vec<f64>,
}

impl UncertaintyTable {
    /// Looks up the uncertainty for a slope.
    ///
    /// Slopes outside the table are clamped to the first or last bin.
    /// Returns `None` for NaN slopes.
    #[must_use]
    pub fn lookup(&self, slope: f64) -> Option<f64> {
        if slope.is_nan() {
            return None;
        }
        let n = self.values.len();
        let fraction = (slope - self.min_slope) / (self.max_slope - self.min_slope);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let bin = (fraction * n as f64).floor().max(0.0) as usize;
        self.values.get(bin.min(n - 1)).copied()
    }
}

impl Dataset for UncertaintyTable {
    const KIND: &'static str = "uncertainty_table";

    fn validate(&self) -> Result<(), String> {
        if self.values.is_empty() {
            return Err("table has no bins".to_string());
        }
        if !(self.max_slope > self.min_slope) {
            return Err(format!(
                "max_slope ({}) must exceed min_slope ({})",
                self.max_slope, self.min_slope
            ));
        }
        Ok(())
    }
}
