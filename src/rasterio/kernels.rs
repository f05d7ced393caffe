//! Resampling kernels
//!
//! Every kernel maps destination pixel `d` to the source position
//! `(d + 0.5) * ratio + origin` and computes one `f64` per destination
//! pixel from a chunk of source values. Masked pixels never contribute; a
//! destination pixel without valid contributors receives the fill value.

use std::f64::consts::PI;
use std::ops::Range;
use crate::types::ResampleAlg;

/// A window of source values read as `f64`, with an optional validity mask
pub struct SourceChunk<'a> {
    pub values: &'a [f64],
    /// One byte per value; 0 marks an invalid pixel
    pub mask: Option<&'a [u8]>,
    pub x_off: usize,
    pub y_off: usize,
    pub width: usize,
    pub height: usize,
}

impl SourceChunk<'_> {
    #[inline]
    fn is_valid(&self, index: usize) -> bool {
        self.mask.map_or(true, |mask| mask[index] != 0)
    }
}

/// Placement of destination pixels in source coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleGeometry {
    pub x_ratio: f64,
    pub y_ratio: f64,
    pub x_origin: f64,
    pub y_origin: f64,
}

impl SampleGeometry {
    #[inline]
    fn center_x(&self, d: usize) -> f64 {
        (d as f64 + 0.5) * self.x_ratio + self.x_origin
    }

    #[inline]
    fn center_y(&self, d: usize) -> f64 {
        (d as f64 + 0.5) * self.y_ratio + self.y_origin
    }
}

/// Resamples the destination pixels `dst_x` x `dst_y` from `chunk`.
///
/// Returns the values row by row.
pub fn resample(
    alg: ResampleAlg,
    chunk: &SourceChunk<'_>,
    geometry: &SampleGeometry,
    dst_x: Range<usize>,
    dst_y: Range<usize>,
    fill: f64,
) -> Vec<f64> {
    match alg {
        ResampleAlg::Nearest => nearest(chunk, geometry, dst_x, dst_y, fill),
        ResampleAlg::Average => footprint_reduce(chunk, geometry, dst_x, dst_y, fill, average),
        ResampleAlg::Mode => footprint_reduce(chunk, geometry, dst_x, dst_y, fill, mode),
        ResampleAlg::Bilinear => convolve(chunk, geometry, dst_x, dst_y, fill, triangle, 1.0),
        ResampleAlg::Cubic => convolve(chunk, geometry, dst_x, dst_y, fill, keys_cubic, 2.0),
        ResampleAlg::CubicSpline => convolve(chunk, geometry, dst_x, dst_y, fill, cubic_bspline, 2.0),
        ResampleAlg::Lanczos => convolve(chunk, geometry, dst_x, dst_y, fill, lanczos3, 3.0),
        ResampleAlg::Gauss => convolve(chunk, geometry, dst_x, dst_y, fill, gaussian, 1.0),
    }
}

fn nearest(
    chunk: &SourceChunk<'_>,
    geometry: &SampleGeometry,
    dst_x: Range<usize>,
    dst_y: Range<usize>,
    fill: f64,
) -> Vec<f64> {
    let pick = |center: f64, off: usize, len: usize| -> usize {
        let absolute = center.floor().max(off as f64) as usize;
        absolute.min(off + len - 1) - off
    };
    let cols: Vec<usize> = dst_x
        .map(|d| pick(geometry.center_x(d), chunk.x_off, chunk.width))
        .collect();

    let mut out = Vec::with_capacity(cols.len() * dst_y.len());
    for d in dst_y {
        let row = pick(geometry.center_y(d), chunk.y_off, chunk.height);
        for &col in &cols {
            let index = row * chunk.width + col;
            out.push(if chunk.is_valid(index) {
                chunk.values[index]
            } else {
                fill
            });
        }
    }
    out
}

/// Source pixels, in chunk-local indices, of the taps of one axis
struct Taps {
    first: usize,
    weights: Vec<f64>,
}

fn taps(center: f64, radius: f64, ratio: f64, off: usize, len: usize, kernel: fn(f64) -> f64) -> Taps {
    let scale = ratio.max(1.0);
    let support = radius * scale;
    let lo = ((center - 0.5 - support).ceil() as i64).max(off as i64);
    let hi = ((center - 0.5 + support).floor() as i64).min((off + len) as i64 - 1);
    if lo > hi {
        return Taps {
            first: 0,
            weights: Vec::new(),
        };
    }
    let weights = (lo..=hi)
        .map(|i| kernel((i as f64 + 0.5 - center) / scale))
        .collect();
    Taps {
        first: (lo - off as i64) as usize,
        weights,
    }
}

fn convolve(
    chunk: &SourceChunk<'_>,
    geometry: &SampleGeometry,
    dst_x: Range<usize>,
    dst_y: Range<usize>,
    fill: f64,
    kernel: fn(f64) -> f64,
    radius: f64,
) -> Vec<f64> {
    let col_taps: Vec<Taps> = dst_x
        .map(|d| taps(geometry.center_x(d), radius, geometry.x_ratio, chunk.x_off, chunk.width, kernel))
        .collect();

    let mut out = Vec::with_capacity(col_taps.len() * dst_y.len());
    for d in dst_y {
        let row_taps = taps(geometry.center_y(d), radius, geometry.y_ratio, chunk.y_off, chunk.height, kernel);
        for col in &col_taps {
            let mut sum = 0.0;
            let mut weight_sum = 0.0;
            for (r, wy) in row_taps.weights.iter().enumerate() {
                let base = (row_taps.first + r) * chunk.width + col.first;
                for (c, wx) in col.weights.iter().enumerate() {
                    let index = base + c;
                    if chunk.is_valid(index) {
                        let weight = wy * wx;
                        sum += weight * chunk.values[index];
                        weight_sum += weight;
                    }
                }
            }
            out.push(if weight_sum.abs() > f64::EPSILON {
                sum / weight_sum
            } else {
                fill
            });
        }
    }
    out
}

/// Source span `[start, end)` covered by destination pixel `d` of one axis
fn footprint(d: usize, ratio: f64, origin: f64, off: usize, len: usize) -> Range<usize> {
    let lo = (origin + d as f64 * ratio + 0.5).floor() as i64;
    let mut hi = (origin + (d + 1) as f64 * ratio + 0.5).floor() as i64;
    if hi <= lo {
        hi = lo + 1;
    }
    let start = lo.clamp(off as i64, (off + len) as i64) as usize;
    let end = hi.clamp(off as i64, (off + len) as i64) as usize;
    start - off..end - off
}

fn footprint_reduce(
    chunk: &SourceChunk<'_>,
    geometry: &SampleGeometry,
    dst_x: Range<usize>,
    dst_y: Range<usize>,
    fill: f64,
    reduce: fn(&[f64]) -> Option<f64>,
) -> Vec<f64> {
    let col_spans: Vec<Range<usize>> = dst_x
        .map(|d| footprint(d, geometry.x_ratio, geometry.x_origin, chunk.x_off, chunk.width))
        .collect();

    let mut out = Vec::with_capacity(col_spans.len() * dst_y.len());
    let mut samples = Vec::new();
    for d in dst_y {
        let rows = footprint(d, geometry.y_ratio, geometry.y_origin, chunk.y_off, chunk.height);
        for cols in &col_spans {
            samples.clear();
            for row in rows.clone() {
                for col in cols.clone() {
                    let index = row * chunk.width + col;
                    if chunk.is_valid(index) {
                        samples.push(chunk.values[index]);
                    }
                }
            }
            out.push(reduce(&samples).unwrap_or(fill));
        }
    }
    out
}

fn average(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Most frequent value; the earliest one wins ties
fn mode(samples: &[f64]) -> Option<f64> {
    let mut counts: Vec<(f64, usize)> = Vec::new();
    for &value in samples {
        match counts.iter_mut().find(|(v, _)| v.to_bits() == value.to_bits()) {
            Some((_, count)) => *count += 1,
            None => counts.push((value, 1)),
        }
    }
    let mut best: Option<(f64, usize)> = None;
    for (value, count) in counts {
        if best.map_or(true, |(_, n)| count > n) {
            best = Some((value, count));
        }
    }
    best.map(|(value, _)| value)
}

fn triangle(x: f64) -> f64 {
    (1.0 - x.abs()).max(0.0)
}

/// Keys cubic convolution with a = -0.5
fn keys_cubic(x: f64) -> f64 {
    let x = x.abs();
    if x <= 1.0 {
        (1.5 * x - 2.5) * x * x + 1.0
    } else if x < 2.0 {
        ((-0.5 * x + 2.5) * x - 4.0) * x + 2.0
    } else {
        0.0
    }
}

fn cubic_bspline(x: f64) -> f64 {
    let x = x.abs();
    if x < 1.0 {
        (4.0 - 6.0 * x * x + 3.0 * x * x * x) / 6.0
    } else if x < 2.0 {
        (2.0 - x).powi(3) / 6.0
    } else {
        0.0
    }
}

fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        (PI * x).sin() / (PI * x)
    }
}

fn lanczos3(x: f64) -> f64 {
    if x.abs() >= 3.0 {
        0.0
    } else {
        sinc(x) * sinc(x / 3.0)
    }
}

fn gaussian(x: f64) -> f64 {
    if x.abs() > 1.0 {
        0.0
    } else {
        (-4.5 * x * x).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn row_chunk<'a>(values: &'a [f64], mask: Option<&'a [u8]>) -> SourceChunk<'a> {
        SourceChunk {
            values,
            mask,
            x_off: 0,
            y_off: 0,
            width: values.len(),
            height: 1,
        }
    }

    fn geometry(x_ratio: f64) -> SampleGeometry {
        SampleGeometry {
            x_ratio,
            y_ratio: 1.0,
            x_origin: 0.0,
            y_origin: 0.0,
        }
    }

    #[test]
    fn test_bilinear_magnification() {
        let values = [0.0, 10.0];
        let out = resample(ResampleAlg::Bilinear, &row_chunk(&values, None), &geometry(0.5), 0..4, 0..1, -1.0);
        let expected = [0.0, 2.5, 7.5, 10.0];
        for (got, want) in out.iter().zip(expected) {
            assert_relative_eq!(*got, want, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_average_decimation() {
        let values = [1.0, 2.0, 3.0, 4.0];
        let out = resample(ResampleAlg::Average, &row_chunk(&values, None), &geometry(2.0), 0..2, 0..1, 0.0);
        assert_eq!(out, vec![1.5, 3.5]);
    }

    #[test]
    fn test_average_skips_masked_pixels() {
        let values = [1.0, 100.0, 3.0, 4.0];
        let mask = [255, 0, 0, 0];
        let out = resample(ResampleAlg::Average, &row_chunk(&values, Some(&mask)), &geometry(2.0), 0..2, 0..1, -9.0);
        assert_eq!(out, vec![1.0, -9.0]);
    }

    #[test]
    fn test_mode_first_seen_wins_ties() {
        let values = [5.0, 7.0, 7.0, 5.0, 2.0, 2.0, 2.0, 9.0];
        let out = resample(ResampleAlg::Mode, &row_chunk(&values, None), &geometry(4.0), 0..2, 0..1, 0.0);
        assert_eq!(out, vec![5.0, 2.0]);
    }

    #[test]
    fn test_convolution_preserves_constant() {
        let values = [6.0; 16];
        for alg in [
            ResampleAlg::Bilinear,
            ResampleAlg::Cubic,
            ResampleAlg::CubicSpline,
            ResampleAlg::Lanczos,
            ResampleAlg::Gauss,
        ] {
            let out = resample(alg, &row_chunk(&values, None), &geometry(2.0), 0..8, 0..1, 0.0);
            for value in out {
                assert_relative_eq!(value, 6.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_fully_masked_gets_fill() {
        let values = [1.0, 2.0];
        let mask = [0, 0];
        let out = resample(ResampleAlg::Cubic, &row_chunk(&values, Some(&mask)), &geometry(0.5), 0..4, 0..1, -1.0);
        assert_eq!(out, vec![-1.0; 4]);
    }

    #[test]
    fn test_nearest_respects_chunk_offset() {
        let values = [10.0, 11.0, 12.0];
        let chunk = SourceChunk {
            values: &values,
            mask: None,
            x_off: 4,
            y_off: 2,
            width: 3,
            height: 1,
        };
        let geometry = SampleGeometry {
            x_ratio: 1.0,
            y_ratio: 1.0,
            x_origin: 4.0,
            y_origin: 2.0,
        };
        let out = resample(ResampleAlg::Nearest, &chunk, &geometry, 0..3, 0..1, 0.0);
        assert_eq!(out, vec![10.0, 11.0, 12.0]);
    }

    #[test]
    fn test_kernel_shapes() {
        assert_relative_eq!(keys_cubic(0.0), 1.0);
        assert_relative_eq!(keys_cubic(1.0), 0.0);
        assert_relative_eq!(cubic_bspline(0.0), 4.0 / 6.0);
        assert_relative_eq!(cubic_bspline(1.0), 1.0 / 6.0);
        assert_relative_eq!(lanczos3(0.0), 1.0);
        assert!(lanczos3(1.0).abs() < 1e-12);
        assert_relative_eq!(gaussian(0.0), 1.0);
        assert_eq!(triangle(1.5), 0.0);
    }
}
