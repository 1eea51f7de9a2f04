//! Arbitrary waveform buffers.
//!
//! An arbitrary waveform is 2048 points with 12 bit resolution, transferred as
//! 16 slices of 128 samples. Each sample is `0..=4095` with `2048` as the
//! nominal center. Here samples are handled as floats in `-1.0..=1.0` and only
//! mapped onto the instrument's range when building the slice commands.

use core::f64::consts::PI;

use crate::error::ValueError;

pub const NUM_POINTS: usize = 2048;
pub const NUM_SLICES: usize = 16;
pub const SAMPLES_PER_SLICE: usize = NUM_POINTS / NUM_SLICES;
pub const MAX_SAMPLE: u16 = 4095;

pub const INPUT_MIN: f64 = -1.0;
pub const INPUT_MAX: f64 = 1.0;

/// Point count of the older file format, expanded to [`NUM_POINTS`] on conversion.
pub const LEGACY_NUM_POINTS: usize = 1024;

/// Exactly [`NUM_POINTS`] samples, nominally in `-1.0..=1.0`.
#[derive(Debug, Clone, PartialEq)]
pub struct ArbitraryWaveform {
    samples: Vec<f64>,
}

impl TryFrom<Vec<f64>> for ArbitraryWaveform {
    type Error = ValueError;

    fn try_from(samples: Vec<f64>) -> Result<Self, Self::Error> {
        if samples.len() != NUM_POINTS {
            return Err(ValueError::InvalidLength {
                expected: NUM_POINTS,
                got: samples.len(),
            });
        }
        Ok(Self { samples })
    }
}

impl ArbitraryWaveform {
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Map every sample onto the instrument's `0..=4095` range.
    ///
    /// Samples outside `-1.0..=1.0` are clamped with a warning.
    pub fn to_raw(&self) -> Vec<u16> {
        self.samples.iter().copied().map(sample_to_raw).collect()
    }

    /// Raw samples grouped into the 16 slices sent to the instrument.
    pub fn raw_slices(&self) -> Vec<Vec<u16>> {
        self.to_raw()
            .chunks(SAMPLES_PER_SLICE)
            .map(<[u16]>::to_vec)
            .collect()
    }
}

fn sample_to_raw(sample: f64) -> u16 {
    let clamped = sample.clamp(INPUT_MIN, INPUT_MAX);
    if clamped != sample {
        log::warn!("adjusting bad sample value {} to {}", sample, clamped);
    }
    let scaled = (clamped - INPUT_MIN) * MAX_SAMPLE as f64 / (INPUT_MAX - INPUT_MIN);
    scaled.round() as u16
}

/// `sin(x) / x`, `1.0` at zero.
pub fn sinc(x: f64) -> f64 {
    if x != 0.0 { x.sin() / x } else { 1.0 }
}

pub fn normalized_sinc(x: f64) -> f64 {
    sinc(x * PI)
}

fn sample_function(start: f64, end: f64, function: impl Fn(f64) -> f64) -> ArbitraryWaveform {
    let step = (end - start) / NUM_POINTS as f64;
    let samples = (0..NUM_POINTS)
        .map(|i| function(start + step * i as f64))
        .collect();
    ArbitraryWaveform { samples }
}

/// Sinc sampled over `[-6π, 5π)`.
pub fn generate_sinc() -> ArbitraryWaveform {
    sample_function(-6.0 * PI, 5.0 * PI, sinc)
}

/// Normalized sinc sampled over `[-4π, 3π)`.
pub fn generate_normalized_sinc() -> ArbitraryWaveform {
    sample_function(-4.0 * PI, 3.0 * PI, normalized_sinc)
}

/// Linearly rescale `data` from `in_min..=in_max` to `out_min..=out_max`.
///
/// A degenerate input range maps everything to the middle of the output range.
pub fn normalize(data: &mut [f64], in_min: f64, in_max: f64, out_min: f64, out_max: f64) {
    log::debug!("normalize {}, {} -> {}, {}", in_min, in_max, out_min, out_max);
    let in_span = in_max - in_min;
    for v in data.iter_mut() {
        *v = if in_span == 0.0 {
            (out_min + out_max) / 2.0
        } else {
            out_min + (*v - in_min) * (out_max - out_min) / in_span
        };
    }
}

/// Rescale `data` from its observed range to `out_min..=out_max`.
///
/// Non-negative data is assumed to be offset encoded (e.g. `0..=1023`). The
/// minimum is then taken as `0` and the maximum is rounded up to the next
/// `2^n - 1` so the original bit depth is kept.
pub fn auto_normalize(data: &mut [f64], out_min: f64, out_max: f64) {
    let Some(mut min) = data.iter().copied().reduce(f64::min) else {
        return;
    };
    let mut max = data.iter().copied().fold(min, f64::max);
    if min >= 0.0 {
        min = 0.0;
        if let Some(boundary) = [255.0, 511.0, 1023.0, 2047.0, 4095.0, 8191.0]
            .into_iter()
            .find(|boundary| max < *boundary + 1.0)
        {
            max = boundary;
        }
    }
    normalize(data, min, max, out_min, out_max);
}

/// Double a 1024 point waveform by interpolating between neighbours, wrapping
/// the last sample around to the first.
pub fn expand_legacy(data: &[f64]) -> Vec<f64> {
    let mut expanded = Vec::with_capacity(data.len() * 2);
    for (i, v) in data.iter().enumerate() {
        let next = data[(i + 1) % data.len()];
        expanded.push(*v);
        expanded.push((*v + next) * 0.5);
    }
    expanded
}

/// Parse one number per line, skipping blank lines and `#` comments.
fn parse_lines(text: &str) -> Result<Vec<f64>, ValueError> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line, s)| {
            s.parse().map_err(|_| ValueError::InvalidSample {
                line,
                text: s.to_string(),
            })
        })
        .collect()
}

/// Parse a waveform file of [`NUM_POINTS`] samples in `-1.0..=1.0`.
pub fn parse_samples(text: &str) -> Result<ArbitraryWaveform, ValueError> {
    let samples = parse_lines(text)?;
    if let Some(bad) = samples.iter().find(|v| !(INPUT_MIN..=INPUT_MAX).contains(*v)) {
        return Err(ValueError::OutOfRange {
            quantity: "sample",
            value: *bad,
            min: INPUT_MIN,
            max: INPUT_MAX,
        });
    }
    ArbitraryWaveform::try_from(samples)
}

/// Convert raw numeric data of any scale into `-1.0..=1.0` samples.
///
/// Data in the older 1024 point format is expanded to 2048 points.
pub fn convert_samples(text: &str) -> Result<Vec<f64>, ValueError> {
    let mut data = parse_lines(text)?;
    auto_normalize(&mut data, INPUT_MIN, INPUT_MAX);
    if data.len() == LEGACY_NUM_POINTS {
        data = expand_legacy(&data);
    }
    Ok(data)
}
