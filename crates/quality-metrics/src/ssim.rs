//! Structural similarity on single-channel planes
//!
//! 7x7 uniform window, sample covariance, `K1 = 0.01`, `K2 = 0.03`, data range 255.
//! Only windows that lie fully inside the plane contribute to the mean.

use ndarray::{Array2, ArrayView2};

pub const WINDOW: usize = 7;
const K1: f64 = 0.01;
const K2: f64 = 0.03;
const DATA_RANGE: f64 = 255.0;

/// Summed-area table with a zero row/column prepended
fn integral(plane: ArrayView2<'_, f64>) -> Array2<f64> {
    let (h, w) = plane.dim();
    let mut sat = Array2::<f64>::zeros((h + 1, w + 1));
    for y in 0..h {
        let mut row = 0.0;
        for x in 0..w {
            row += plane[[y, x]];
            sat[[y + 1, x + 1]] = sat[[y, x + 1]] + row;
        }
    }
    sat
}

#[inline]
fn window_sum(sat: &Array2<f64>, y: usize, x: usize) -> f64 {
    sat[[y + WINDOW, x + WINDOW]] - sat[[y, x + WINDOW]] - sat[[y + WINDOW, x]] + sat[[y, x]]
}

/// Mean SSIM of two planes of equal shape, `None` if smaller than one window
#[must_use]
pub fn ssim(a: ArrayView2<'_, f64>, b: ArrayView2<'_, f64>) -> Option<f64> {
    let (h, w) = a.dim();
    if b.dim() != (h, w) || h < WINDOW || w < WINDOW {
        return None;
    }

    let sat_a = integral(a);
    let sat_b = integral(b);
    let sat_aa = integral((&a * &a).view());
    let sat_bb = integral((&b * &b).view());
    let sat_ab = integral((&a * &b).view());

    let np = (WINDOW * WINDOW) as f64;
    let cov_norm = np / (np - 1.0);
    let c1 = (K1 * DATA_RANGE).powi(2);
    let c2 = (K2 * DATA_RANGE).powi(2);

    let mut total = 0.0;
    let mut count = 0usize;
    for y in 0..=(h - WINDOW) {
        for x in 0..=(w - WINDOW) {
            let ux = window_sum(&sat_a, y, x) / np;
            let uy = window_sum(&sat_b, y, x) / np;
            let uxx = window_sum(&sat_aa, y, x) / np;
            let uyy = window_sum(&sat_bb, y, x) / np;
            let uxy = window_sum(&sat_ab, y, x) / np;

            let vx = cov_norm * (uxx - ux * ux);
            let vy = cov_norm * (uyy - uy * uy);
            let vxy = cov_norm * (uxy - ux * uy);

            let num = (2.0 * ux * uy + c1) * (2.0 * vxy + c2);
            let den = (ux * ux + uy * uy + c1) * (vx + vy + c2);
            total += num / den;
            count += 1;
        }
    }
    Some(total / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane(h: usize, w: usize, f: impl Fn(usize, usize) -> f64) -> Array2<f64> {
        Array2::from_shape_fn((h, w), |(y, x)| f(y, x))
    }

    #[test]
    fn test_identical_planes() {
        let p = plane(16, 20, |y, x| ((y * 13 + x * 7) % 256) as f64);
        assert_eq!(ssim(p.view(), p.view()), Some(1.0));
    }

    #[test]
    fn test_too_small() {
        let p = plane(6, 30, |_, _| 10.0);
        assert_eq!(ssim(p.view(), p.view()), None);
    }

    #[test]
    fn test_inverted_pattern_scores_low() {
        let a = plane(16, 16, |y, x| if (x + y) % 2 == 0 { 0.0 } else { 255.0 });
        let b = a.mapv(|v| 255.0 - v);
        let score = ssim(a.view(), b.view()).unwrap();
        assert!(score < 0.0, "score {score}");
    }

    #[test]
    fn test_noise_lowers_score() {
        let a = plane(24, 24, |y, x| ((y * 10 + x * 5) % 200) as f64);
        let b = plane(24, 24, |y, x| {
            let base = ((y * 10 + x * 5) % 200) as f64;
            if (x * 31 + y * 17) % 5 == 0 {
                base + 40.0
            } else {
                base
            }
        });
        let score = ssim(a.view(), b.view()).unwrap();
        assert!(score > 0.0 && score < 1.0, "score {score}");
    }
}
