//! Batched NTM addressing: content lookup, interpolation, circular shift,
//! sharpening. Every function takes `(batch, ...)` arrays and works row by
//! row; rows never interact.

use ndarray::{Array2, ArrayView2, ArrayView3, Axis, Zip};

use crate::constants::EPSILON;
use crate::layers::softmax_rows_inplace;

/// Cosine similarity between each row's key `(batch, width)` and every slot
/// of its memory `(batch, slots, width)`. Returns `(batch, slots)`.
pub fn cosine_similarity(key: ArrayView2<f64>, memory: ArrayView3<f64>) -> Array2<f64> {
    let (batch, slots, _) = memory.dim();
    let mut out = Array2::zeros((batch, slots));
    for ((mut sim, k), bank) in out
        .outer_iter_mut()
        .zip(key.outer_iter())
        .zip(memory.outer_iter())
    {
        let k_norm = k.dot(&k).sqrt();
        for (s, slot) in sim.iter_mut().zip(bank.outer_iter()) {
            let m_norm = slot.dot(&slot).sqrt();
            *s = k.dot(&slot) / (k_norm * m_norm + EPSILON);
        }
    }
    out
}

/// `softmax(beta * similarity)` per row; `beta` is `(batch, 1)`.
pub fn content_weighting(similarity: ArrayView2<f64>, beta: ArrayView2<f64>) -> Array2<f64> {
    let mut w = &similarity * &beta;
    softmax_rows_inplace(&mut w);
    w
}

/// `g * content + (1 - g) * previous`; `gate` is `(batch, 1)`.
pub fn interpolate(
    content: ArrayView2<f64>,
    previous: ArrayView2<f64>,
    gate: ArrayView2<f64>,
) -> Array2<f64> {
    let mut out = content.to_owned();
    for ((mut row, prev), g) in out
        .outer_iter_mut()
        .zip(previous.outer_iter())
        .zip(gate.column(0).iter())
    {
        Zip::from(&mut row)
            .and(&prev)
            .for_each(|c, &p| *c = g * *c + (1.0 - g) * p);
    }
    out
}

/// Circular convolution of each weighting row with its shift distribution.
///
/// `shift` is `(batch, 2R + 1)`; column `k` is the probability of moving
/// focus by `k - R` slots, wrapping around the ends.
pub fn circular_shift(weighting: ArrayView2<f64>, shift: ArrayView2<f64>) -> Array2<f64> {
    let (batch, slots) = weighting.dim();
    let radius = (shift.ncols() / 2) as isize;
    let n = slots as isize;
    let mut out = Array2::zeros((batch, slots));
    for ((mut o, w), s) in out
        .outer_iter_mut()
        .zip(weighting.outer_iter())
        .zip(shift.outer_iter())
    {
        for (i, oi) in o.iter_mut().enumerate() {
            *oi = s
                .iter()
                .enumerate()
                .map(|(k, &sk)| {
                    let offset = k as isize - radius;
                    let j = (i as isize - offset).rem_euclid(n) as usize;
                    sk * w[j]
                })
                .sum();
        }
    }
    out
}

/// `w^gamma / sum(w^gamma)` per row; `gamma` is `(batch, 1)`, expected >= 1.
/// A row whose mass underflows to zero falls back to uniform.
pub fn sharpen(weighting: ArrayView2<f64>, gamma: ArrayView2<f64>) -> Array2<f64> {
    let mut out = weighting.to_owned();
    for (mut row, &g) in out.axis_iter_mut(Axis(0)).zip(gamma.column(0).iter()) {
        row.mapv_inplace(|v| v.max(0.0).powf(g));
        let sum = row.sum();
        if sum > 0.0 {
            row.mapv_inplace(|v| v / sum);
        } else {
            let uniform = 1.0 / row.len() as f64;
            row.fill(uniform);
        }
    }
    out
}
