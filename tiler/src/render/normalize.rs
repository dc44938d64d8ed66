//! Band normalization to 8-bit display values
//!
//! Values are clipped to the profile's range, rescaled linearly to 0..=255
//! and truncated toward zero. No-data (NaN) samples map to `None`.

use ndarray::{Array2, ArrayView2};

use super::profile::{NormalizationProfile, Transfer};

/// Normalize raw samples under a profile
pub fn normalize(values: ArrayView2<'_, f32>, profile: NormalizationProfile) -> Array2<Option<u8>> {
    let (min, max) = match profile.transfer() {
        Transfer::Clip { min, max } => (min, max),
        Transfer::Percentile { low, high } => {
            let mut valid: Vec<f64> = values
                .iter()
                .filter(|v| !v.is_nan())
                .map(|&v| f64::from(v))
                .collect();
            valid.sort_by(f64::total_cmp);
            match (percentile(&valid, low), percentile(&valid, high)) {
                (Some(lo), Some(hi)) => (lo, hi),
                _ => return values.mapv(|_| None),
            }
        }
    };
    normalize_range(values, min, max)
}

/// Clip to `[min, max]` and rescale to 0..=255
///
/// A degenerate range (`max <= min`) maps every valid sample to 0.
pub fn normalize_range(values: ArrayView2<'_, f32>, min: f64, max: f64) -> Array2<Option<u8>> {
    values.mapv(|v| {
        if v.is_nan() {
            None
        } else {
            Some(scale_value(f64::from(v), min, max))
        }
    })
}

/// One value through the clip-and-rescale transfer
#[inline]
pub fn scale_value(value: f64, min: f64, max: f64) -> u8 {
    if max <= min {
        return 0;
    }
    let clipped = value.clamp(min, max);
    ((clipped - min) / (max - min) * 255.0) as u8
}

/// Linearly interpolated percentile of sorted samples, `p` in 0..=100
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let rank = (p / 100.0).clamp(0.0, 1.0) * last as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * weight)
}
