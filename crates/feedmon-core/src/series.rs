//! Numeric transforms applied to rate series before they are drawn.
//!
//! Every function takes its input by reference and returns a fresh `Series`, so the
//! dashboard can call them on the latest published series without copying it first.

use rand::Rng;

pub type Sample = f64;
pub type Series = Vec<Sample>;

/// Redistributes `series` over `target_len` slots with a box filter.
///
/// Sample `i` covers `[scale * i, scale * i + scale)` in output coordinates and adds its
/// value to every slot it overlaps, weighted by the overlapping fraction of its own width.
/// The total mass of the series is preserved up to floating point error.
pub fn resample(series: &[Sample], target_len: usize) -> Series {
    if target_len == 0 {
        return series.to_vec();
    }
    if series.is_empty() {
        return Series::new();
    }

    let scale = target_len as f64 / series.len() as f64;
    let mut output = vec![0.0; target_len];
    for (index, value) in series.iter().enumerate() {
        let start = scale * index as f64;
        let end = start + scale;
        let mut slot = start.floor() as usize;
        while slot < target_len && (slot as f64) < end {
            let low = start.max(slot as f64);
            let high = end.min(slot as f64 + 1.0);
            if high > low {
                output[slot] += value * (high - low) / scale;
            }
            slot += 1;
        }
    }
    output
}

/// Shifts the series so that its smallest value is exactly zero.
pub fn normalize(series: &[Sample]) -> Series {
    if series.len() <= 1 {
        return series.to_vec();
    }
    let min = series.iter().copied().fold(f64::INFINITY, f64::min);
    series.iter().map(|value| value - min).collect()
}

/// Normalizes, then rescales so the largest value equals `target_max`.
///
/// A flat series (maximum of zero after normalizing) comes back as all zeros.
pub fn squash(series: &[Sample], target_max: f64) -> Series {
    let normalized = normalize(series);
    let max = normalized.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if normalized.is_empty() || max <= 0.0 {
        return vec![0.0; normalized.len()];
    }
    let factor = target_max / max;
    normalized.iter().map(|value| value * factor).collect()
}

/// Picks a graph height for `series` drawn `width` columns wide.
///
/// The series is resampled, normalized and rounded to integer levels. If some levels in
/// `0..=max` are never hit, the longest such run is used to shrink the height to
/// `max / largest_gap`. `None` means every level is occupied and no squashing is needed.
pub fn auto_squash_factor(series: &[Sample], width: usize) -> Option<usize> {
    let levels = round_series(&normalize(&resample(series, width)));
    if levels.is_empty() {
        return None;
    }
    let max = series_max(&levels).max(0.0) as usize;
    let mut histogram = vec![0usize; max + 1];
    for level in &levels {
        let level = level.max(0.0) as usize;
        if level <= max {
            histogram[level] += 1;
        }
    }

    let mut largest_gap = 0usize;
    let mut gap = 0usize;
    for count in histogram {
        if count == 0 {
            gap += 1;
            largest_gap = largest_gap.max(gap);
        } else {
            gap = 0;
        }
    }
    if largest_gap == 0 {
        return None;
    }
    Some(max / largest_gap)
}

/// Squashes `series` to the height suggested by [`auto_squash_factor`], if any.
pub fn auto_squash(series: &[Sample], width: usize) -> Series {
    match auto_squash_factor(series, width) {
        Some(height) if height > 0 => squash(series, height as f64),
        _ => series.to_vec(),
    }
}

pub fn round_series(series: &[Sample]) -> Series {
    series.iter().map(|value| value.round()).collect()
}

/// Rounds every sample to `places` decimal places.
pub fn round_to_places(series: &[Sample], places: i32) -> Series {
    let scale = 10f64.powi(places);
    series
        .iter()
        .map(|value| (value * scale).round() / scale)
        .collect()
}

/// Largest sample, or 0 for an empty series.
pub fn series_max(series: &[Sample]) -> Sample {
    series.iter().copied().reduce(f64::max).unwrap_or(0.0)
}

pub fn format_sample(value: Sample) -> String {
    format!("{value:.3}")
}

pub fn format_series(series: &[Sample]) -> String {
    let mut out = String::from("[");
    for value in series {
        out.push(' ');
        out.push_str(&format_sample(*value));
    }
    out.push_str(" ]");
    out
}

/// Builds a random walk of `size` samples starting at `start`.
pub fn generate_random_walk<R: Rng + ?Sized>(
    rng: &mut R,
    size: usize,
    step: f64,
    start: f64,
) -> Series {
    let mut output = Series::with_capacity(size);
    let mut current = start;
    for _ in 0..size {
        output.push(current);
        current = next_step(rng, current, step);
    }
    output
}

/// Drops the oldest `count` samples and continues the walk for `count` new ones.
pub fn scroll_random_walk<R: Rng + ?Sized>(
    rng: &mut R,
    series: &[Sample],
    step: f64,
    count: usize,
) -> Series {
    let keep_from = count.min(series.len());
    let mut output = series[keep_from..].to_vec();
    let mut current = series.last().copied().unwrap_or(0.0);
    for _ in 0..count {
        current = next_step(rng, current, step);
        output.push(current);
    }
    output
}

fn next_step<R: Rng + ?Sized>(rng: &mut R, current: f64, step: f64) -> f64 {
    current + rng.random::<f64>() * (step * 2.0) - step
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    const EPSILON: f64 = 1e-9;

    fn sum(series: &[f64]) -> f64 {
        series.iter().sum()
    }

    fn sample_inputs() -> Vec<Series> {
        let mut rng = StdRng::seed_from_u64(7);
        vec![
            vec![4.0],
            vec![1.0, 2.0, 3.0],
            vec![0.0, 0.0, 9.0, 0.0],
            vec![5.0; 13],
            generate_random_walk(&mut rng, 37, 3.0, 20.0),
            generate_random_walk(&mut rng, 240, 1.5, 50.0),
        ]
    }

    #[test]
    fn resample_keeps_length_and_mass() {
        for series in sample_inputs() {
            for target in [1usize, 2, 3, 7, 13, 40, 80, 333] {
                let out = resample(&series, target);
                assert_eq!(out.len(), target, "len {} -> {target}", series.len());
                let tolerance = 1e-6 * sum(&series).abs().max(1.0);
                assert!(
                    (sum(&out) - sum(&series)).abs() < tolerance,
                    "mass drifted for len {} -> {target}: {} vs {}",
                    series.len(),
                    sum(&out),
                    sum(&series)
                );
            }
        }
    }

    #[test]
    fn resample_splits_values_by_overlap() {
        assert_eq!(resample(&[2.0, 4.0], 4), vec![1.0, 1.0, 2.0, 2.0]);
        assert_eq!(resample(&[1.0, 3.0, 5.0, 7.0], 2), vec![4.0, 12.0]);
        let uneven = resample(&[3.0, 3.0], 3);
        assert!((uneven[0] - 2.0).abs() < EPSILON);
        assert!((uneven[1] - 2.0).abs() < EPSILON);
        assert!((uneven[2] - 2.0).abs() < EPSILON);
    }

    #[test]
    fn resample_guards_degenerate_inputs() {
        assert_eq!(resample(&[1.0, 2.0], 0), vec![1.0, 2.0]);
        assert!(resample(&[], 10).is_empty());
    }

    #[test]
    fn normalize_moves_minimum_to_zero() {
        for series in sample_inputs().into_iter().filter(|s| s.len() > 1) {
            let out = normalize(&series);
            let min = out.iter().copied().fold(f64::INFINITY, f64::min);
            assert_eq!(min, 0.0);
        }
        assert_eq!(normalize(&[-4.0, 2.0]), vec![0.0, 6.0]);
        assert_eq!(normalize(&[7.0]), vec![7.0]);
    }

    #[test]
    fn squash_hits_target_max() {
        for series in sample_inputs() {
            if series_max(&normalize(&series)) <= 0.0 {
                continue;
            }
            for target in [1.0, 9.0, 23.5] {
                let out = squash(&series, target);
                assert!((series_max(&out) - target).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn squash_flat_series_is_zero() {
        assert_eq!(squash(&[3.0, 3.0, 3.0], 10.0), vec![0.0, 0.0, 0.0]);
        assert_eq!(squash(&[-2.0], 10.0), vec![0.0]);
        assert!(squash(&[], 10.0).is_empty());
    }

    #[test]
    fn squash_stretches_tiny_ranges_to_target() {
        let out = squash(&[0.0, 1e-10], 5.0);
        assert_eq!(out[0], 0.0);
        assert!((series_max(&out) - 5.0).abs() < EPSILON);

        let out = squash(&[7.0, 7.0 + 1e-12, 7.0], 3.0);
        assert!((series_max(&out) - 3.0).abs() < EPSILON);
    }

    #[test]
    fn round_to_places_collapses_resampling_noise() {
        let noisy = resample(&[3.0, 3.0, 3.0], 20);
        let settled = round_to_places(&noisy, 6);
        assert!(settled.iter().all(|value| *value == settled[0]));
        assert_eq!(round_to_places(&[1.23456789, -0.5], 2), vec![1.23, -0.5]);
    }

    #[test]
    fn auto_squash_factor_uses_largest_gap() {
        // levels 0 and 10 only: gap of 9 unoccupied levels -> 10 / 9 = 1
        let sparse = vec![0.0, 10.0, 0.0, 10.0];
        assert_eq!(auto_squash_factor(&sparse, 4), Some(1));

        // levels 0,1,2 then a gap of 3 before 6
        let clustered = vec![0.0, 1.0, 2.0, 6.0];
        assert_eq!(auto_squash_factor(&clustered, 4), Some(2));
    }

    #[test]
    fn auto_squash_factor_reports_no_squash_when_dense() {
        assert_eq!(auto_squash_factor(&[0.0, 1.0, 2.0, 3.0], 4), None);
        assert_eq!(auto_squash_factor(&[5.0, 5.0], 2), None);
        assert_eq!(auto_squash_factor(&[], 8), None);
    }

    #[test]
    fn auto_squash_leaves_dense_series_alone() {
        let dense = vec![0.0, 1.0, 2.0, 3.0];
        assert_eq!(auto_squash(&dense, 4), dense);
        let clustered = vec![0.0, 1.0, 2.0, 6.0];
        assert!((series_max(&auto_squash(&clustered, 4)) - 2.0).abs() < EPSILON);
    }

    #[test]
    fn random_walk_is_reproducible_and_bounded() {
        let mut first = StdRng::seed_from_u64(42);
        let mut second = StdRng::seed_from_u64(42);
        let a = generate_random_walk(&mut first, 50, 2.0, 10.0);
        let b = generate_random_walk(&mut second, 50, 2.0, 10.0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 50);
        assert_eq!(a[0], 10.0);
        for pair in a.windows(2) {
            assert!((pair[1] - pair[0]).abs() <= 2.0);
        }
    }

    #[test]
    fn scroll_random_walk_slides_window() {
        let mut rng = StdRng::seed_from_u64(3);
        let walk = generate_random_walk(&mut rng, 10, 1.0, 0.0);
        let scrolled = scroll_random_walk(&mut rng, &walk, 1.0, 3);
        assert_eq!(scrolled.len(), 10);
        assert_eq!(&scrolled[..7], &walk[3..]);
        assert!((scrolled[7] - walk[9]).abs() <= 1.0);

        let overrun = scroll_random_walk(&mut rng, &[1.0, 2.0], 1.0, 5);
        assert_eq!(overrun.len(), 5);
    }

    #[test]
    fn format_series_uses_three_decimals() {
        assert_eq!(format_series(&[1.0, 0.5]), "[ 1.000 0.500 ]");
        assert_eq!(format_series(&[]), "[ ]");
    }
}
