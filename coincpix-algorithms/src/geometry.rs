//! Bilinear image transforms used to derive the ghost template.

use coincpix_core::{Error, Result};
use ndarray::{Array2, ArrayView2};

/// Tolerance for sample positions that land just outside the grid.
const EDGE_EPS: f64 = 1e-9;

fn axis_position(pos: f64, len: usize) -> Option<(usize, usize, f64)> {
    if len == 0 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let last = (len - 1) as f64;
    if pos < -EDGE_EPS || pos > last + EDGE_EPS {
        return None;
    }
    let pos = pos.clamp(0.0, last);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let lo = pos.floor() as usize;
    let hi = (lo + 1).min(len - 1);
    Some((lo, hi, pos - pos.floor()))
}

/// Bilinear sample at fractional `(row, col)`; `None` outside the image.
#[must_use]
pub fn sample_bilinear(image: ArrayView2<'_, f64>, row: f64, col: f64) -> Option<f64> {
    let (rows, cols) = image.dim();
    let (r0, r1, fr) = axis_position(row, rows)?;
    let (c0, c1, fc) = axis_position(col, cols)?;
    let top = image[[r0, c0]] * (1.0 - fc) + image[[r0, c1]] * fc;
    let bottom = image[[r1, c0]] * (1.0 - fc) + image[[r1, c1]] * fc;
    Some(top * (1.0 - fr) + bottom * fr)
}

#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn zoomed_len(len: usize, scale: f64) -> usize {
    (len as f64 * scale).round() as usize
}

#[allow(clippy::cast_precision_loss)]
fn source_step(from: usize, to: usize) -> f64 {
    if to > 1 {
        (from as f64 - 1.0) / (to as f64 - 1.0)
    } else {
        0.0
    }
}

/// Magnifies an image by `scale`.
///
/// The output has `round(dim * scale)` pixels per axis and the corner pixels
/// of input and output coincide.
///
/// # Errors
/// Returns [`Error::Computation`] for a non-positive or non-finite scale.
#[allow(clippy::cast_precision_loss)]
pub fn zoom(image: ArrayView2<'_, f64>, scale: f64) -> Result<Array2<f64>> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::Computation(format!("invalid zoom factor {scale}")));
    }
    let (rows, cols) = image.dim();
    let out_rows = zoomed_len(rows, scale);
    let out_cols = zoomed_len(cols, scale);
    let row_step = source_step(rows, out_rows);
    let col_step = source_step(cols, out_cols);
    Ok(Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
        sample_bilinear(image, r as f64 * row_step, c as f64 * col_step).unwrap_or(0.0)
    }))
}

/// Rotates an image by `degrees` about its centre, keeping its shape.
///
/// Pixels that map from outside the input are 0.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rotate(image: ArrayView2<'_, f64>, degrees: f64) -> Array2<f64> {
    let (rows, cols) = image.dim();
    let cy = (rows as f64 - 1.0) / 2.0;
    let cx = (cols as f64 - 1.0) / 2.0;
    let (sin, cos) = degrees.to_radians().sin_cos();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let dy = r as f64 - cy;
        let dx = c as f64 - cx;
        let src_col = cx + dx * cos + dy * sin;
        let src_row = cy - dx * sin + dy * cos;
        sample_bilinear(image, src_row, src_col).unwrap_or(0.0)
    })
}

/// Replaces negative values with 0.
pub fn clamp_negative(image: &mut Array2<f64>) {
    image.mapv_inplace(|v| v.max(0.0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn ramp() -> Array2<f64> {
        array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]
    }

    #[test]
    fn test_sample_bilinear() {
        let img = ramp();
        assert_abs_diff_eq!(sample_bilinear(img.view(), 0.5, 0.5).unwrap(), 3.0);
        assert_abs_diff_eq!(sample_bilinear(img.view(), 2.0, 2.0).unwrap(), 9.0);
        assert!(sample_bilinear(img.view(), -0.5, 0.0).is_none());
        assert!(sample_bilinear(img.view(), 0.0, 2.1).is_none());
    }

    #[test]
    fn test_zoom_identity_and_shape() {
        let img = ramp();
        let same = zoom(img.view(), 1.0).unwrap();
        assert_eq!(same, img);

        let big = zoom(img.view(), 1.5).unwrap();
        assert_eq!(big.dim(), (5, 5));
        assert_abs_diff_eq!(big[[0, 0]], 1.0);
        assert_abs_diff_eq!(big[[4, 4]], 9.0);
        assert_abs_diff_eq!(big[[2, 2]], 5.0);

        assert!(zoom(img.view(), 0.0).is_err());
        assert!(zoom(img.view(), f64::NAN).is_err());
    }

    #[test]
    fn test_rotate_half_turn() {
        let img = ramp();
        let turned = rotate(img.view(), 180.0);
        for ((r, c), &v) in turned.indexed_iter() {
            assert_abs_diff_eq!(v, img[[2 - r, 2 - c]], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let img = ramp();
        let turned = rotate(img.view(), 90.0);
        assert_abs_diff_eq!(turned[[0, 0]], 7.0, epsilon = 1e-9);
        assert_abs_diff_eq!(turned[[1, 1]], 5.0, epsilon = 1e-9);
        assert_abs_diff_eq!(turned[[0, 2]], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rotate_corners_fall_outside() {
        let img = Array2::<f64>::ones((5, 5));
        let turned = rotate(img.view(), 45.0);
        assert_abs_diff_eq!(turned[[0, 0]], 0.0);
        assert_abs_diff_eq!(turned[[2, 2]], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_clamp_negative() {
        let mut img = array![[-1.0, 2.0], [0.0, -0.5]];
        clamp_negative(&mut img);
        assert_eq!(img, array![[0.0, 2.0], [0.0, 0.0]]);
    }
}
