//! Normalized cross-correlation.
//!
//! Both inputs are made zero-mean and the full-overlap correlation surface
//! is computed for every integer shift. Each value is divided by
//! `sqrt(sum(a^2) * sum(b^2))` of the zero-mean arrays, which bounds the
//! surface to `[-1, 1]` and gives exactly 1 for identical inputs at zero
//! shift.

use coincpix_core::{Error, Result};
use ndarray::{s, Array2, ArrayView2};
use rayon::prelude::*;

fn centered(image: ArrayView2<'_, f64>) -> (Array2<f64>, f64) {
    let mean = image.mean().unwrap_or(0.0);
    let centered = image.mapv(|v| v - mean);
    let energy = centered.iter().map(|v| v * v).sum();
    (centered, energy)
}

/// Full cross-correlation surface of `template` against `image`.
///
/// Entry `(i, j)` corresponds to shifting `image` by
/// `(i - (image_rows - 1), j - (image_cols - 1))` relative to `template`.
///
/// # Errors
/// Returns [`Error::EmptyTemplate`] if either input has no pixels and
/// [`Error::Computation`] if either input is constant.
pub fn normalized_cross_correlation(
    template: ArrayView2<'_, f64>,
    image: ArrayView2<'_, f64>,
) -> Result<Array2<f64>> {
    if template.is_empty() || image.is_empty() {
        return Err(Error::EmptyTemplate);
    }
    let (a, energy_a) = centered(template);
    let (b, energy_b) = centered(image);
    let norm = (energy_a * energy_b).sqrt();
    if !norm.is_finite() || norm <= 0.0 {
        return Err(Error::Computation(
            "cross-correlation of an image without variance".into(),
        ));
    }

    let (ha, wa) = a.dim();
    let (hb, wb) = b.dim();
    let out_rows = ha + hb - 1;
    let out_cols = wa + wb - 1;

    let values: Vec<f64> = (0..out_rows)
        .into_par_iter()
        .flat_map_iter(|i| {
            let (a, b) = (&a, &b);
            (0..out_cols).map(move |j| {
                // template row y overlaps image row y + hb - 1 - i
                let y0 = (i + 1).saturating_sub(hb);
                let y1 = (i + 1).min(ha);
                let x0 = (j + 1).saturating_sub(wb);
                let x1 = (j + 1).min(wa);
                let ta = a.slice(s![y0..y1, x0..x1]);
                let tb = b.slice(s![
                    y0 + hb - 1 - i..y1 + hb - 1 - i,
                    x0 + wb - 1 - j..x1 + wb - 1 - j
                ]);
                ta.iter().zip(tb.iter()).map(|(p, q)| p * q).sum::<f64>() / norm
            })
        })
        .collect();

    Array2::from_shape_vec((out_rows, out_cols), values)
        .map_err(|e| Error::Computation(e.to_string()))
}

/// Peak of the correlation surface, clamped to `[0, 1]`.
///
/// With `flip` the image is mirrored along x before correlating.
///
/// # Errors
/// See [`normalized_cross_correlation`].
pub fn fidelity(template: ArrayView2<'_, f64>, image: ArrayView2<'_, f64>, flip: bool) -> Result<f64> {
    let image = if flip {
        image.slice_move(s![.., ..;-1])
    } else {
        image
    };
    let surface = normalized_cross_correlation(template, image)?;
    let peak = surface.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    Ok(peak.clamp(0.0, 1.0))
}
