//! Conversions between human units and the integers written to the registers.
//!
//! Every `*_to_raw` function validates its input before producing a raw value,
//! nothing out of range should ever reach the wire. The float converters treat
//! `NaN` as "leave unchanged" and return `Ok(None)` for it.

use fugit::SecsDurationU32;

use crate::{
    error::ValueError,
    types::{Attenuation, MeasureKind},
};

pub const MIN_FREQUENCY_HZ: f64 = 0.0;
pub const MAX_FREQUENCY_HZ: f64 = 25.0e6;
pub const MIN_DUTY_PERCENT: f64 = 0.0;
pub const MAX_DUTY_PERCENT: f64 = 99.9;
pub const MAX_PHASE_DEGREES: u16 = 360;
pub const MAX_OFFSET_PERCENT: f64 = 120.0;
pub const MAX_SWEEP_SECONDS: u32 = 999;

/// Raw offset values are biased so that `0%` is `120`.
const OFFSET_BIAS: f64 = 120.0;

/// Amplitude range and raw multiplier for one attenuation setting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmplitudeScale {
    pub min_volts: f64,
    pub max_volts: f64,
    /// Multiplier from volts to the raw register value.
    pub multiplier: f64,
}

impl AmplitudeScale {
    /// Convert volts to the raw register value.
    pub fn volts_to_raw(&self, volts: f64) -> Result<u32, ValueError> {
        let volts = ValueError::check_range("amplitude", volts, self.min_volts, self.max_volts)?;
        Ok((volts * self.multiplier).round() as u32)
    }

    /// Convert a raw register value to volts.
    pub fn raw_to_volts(&self, raw: u32) -> f64 {
        raw as f64 / self.multiplier
    }
}

impl Attenuation {
    /// The amplitude scale in effect while this attenuation is selected.
    ///
    /// With the attenuator engaged the register is in millivolts, otherwise
    /// it is in centivolts.
    pub const fn amplitude_scale(self) -> AmplitudeScale {
        match self {
            Attenuation::Minus20dB => AmplitudeScale {
                min_volts: 5e-3,
                max_volts: 2.0,
                multiplier: 1000.0,
            },
            Attenuation::ZerodB => AmplitudeScale {
                min_volts: 5e-3,
                max_volts: 20.0,
                multiplier: 100.0,
            },
        }
    }
}

/// Hertz to hundredths of a hertz.
pub fn frequency_to_raw(hz: f64) -> Result<Option<u32>, ValueError> {
    if hz.is_nan() {
        return Ok(None);
    }
    let hz = ValueError::check_range("frequency", hz, MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)?;
    Ok(Some((hz * 100.0).round() as u32))
}

pub fn raw_to_frequency(raw: u32) -> f64 {
    raw as f64 / 100.0
}

/// Percent to tenths of a percent.
pub fn duty_to_raw(percent: f64) -> Result<Option<u32>, ValueError> {
    if percent.is_nan() {
        return Ok(None);
    }
    let percent =
        ValueError::check_range("duty cycle", percent, MIN_DUTY_PERCENT, MAX_DUTY_PERCENT)?;
    Ok(Some((percent * 10.0).round() as u32))
}

pub fn raw_to_duty(raw: u32) -> f64 {
    raw as f64 / 10.0
}

pub fn amplitude_to_raw(volts: f64, attenuation: Attenuation) -> Result<Option<u32>, ValueError> {
    if volts.is_nan() {
        return Ok(None);
    }
    attenuation.amplitude_scale().volts_to_raw(volts).map(Some)
}

pub fn raw_to_amplitude(raw: u32, attenuation: Attenuation) -> f64 {
    attenuation.amplitude_scale().raw_to_volts(raw)
}

/// An offset in volts, relative to the current amplitude, to the raw register value.
pub fn offset_to_raw(volts: f64, amplitude: f64) -> Result<Option<u32>, ValueError> {
    if volts.is_nan() {
        return Ok(None);
    }
    let percent = volts / amplitude * 100.0;
    let percent =
        ValueError::check_range("offset", percent, -MAX_OFFSET_PERCENT, MAX_OFFSET_PERCENT)?;
    Ok(Some((percent.round() + OFFSET_BIAS) as u32))
}

pub fn raw_to_offset(raw: u32, amplitude: f64) -> f64 {
    amplitude * (raw as f64 - OFFSET_BIAS) / 100.0
}

pub fn phase_to_raw(degrees: u16) -> Result<u32, ValueError> {
    if degrees > MAX_PHASE_DEGREES {
        return Err(ValueError::OutOfRange {
            quantity: "phase",
            value: degrees as f64,
            min: 0.0,
            max: MAX_PHASE_DEGREES as f64,
        });
    }
    Ok(degrees as u32)
}

pub fn sweep_duration_to_raw(duration: SecsDurationU32) -> Result<u32, ValueError> {
    let seconds = duration.to_secs();
    if seconds > MAX_SWEEP_SECONDS {
        return Err(ValueError::OutOfRange {
            quantity: "sweep duration",
            value: seconds as f64,
            min: 0.0,
            max: MAX_SWEEP_SECONDS as f64,
        });
    }
    Ok(seconds)
}

/// SI prefix letter for a power of ten that is a multiple of 3.
pub fn si_prefix(exponent: i32) -> &'static str {
    match exponent {
        3 => "K",
        6 => "M",
        9 => "G",
        12 => "T",
        15 => "P",
        18 => "E",
        21 => "Z",
        24 => "Y",
        -3 => "m",
        -6 => "u",
        -9 => "n",
        -12 => "p",
        -15 => "f",
        -18 => "a",
        -21 => "z",
        -24 => "y",
        _ => "",
    }
}

/// Format `value` with three significant digits, dropping trailing zeros.
fn significant(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return format!("{}", value);
    }
    let magnitude = value.abs().log10().floor() as i32;
    if !(-4..3).contains(&magnitude) {
        let formatted = format!("{:.2e}", value);
        return match formatted.split_once('e') {
            Some((mantissa, exponent)) => format!("{}e{}", trim_zeros(mantissa), exponent),
            None => formatted,
        };
    }
    let decimals = (2 - magnitude).max(0) as usize;
    trim_zeros(&format!("{:.*}", decimals, value)).to_string()
}

fn trim_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Format a value with its units.
///
/// In engineering mode the value is rescaled by powers of 1000 and the
/// matching SI prefix is prepended to the units.
pub fn format_units(value: f64, units: &str, engineering: bool) -> String {
    if !engineering {
        return format!("{} {}", significant(value), units);
    }
    let mut value = value;
    let mut exponent = 0;
    while value.abs() >= 1.0e3 && exponent < 24 {
        exponent += 3;
        value *= 1.0e-3;
    }
    while value.abs() > 0.0 && value.abs() < 1.0 && exponent > -24 {
        exponent -= 3;
        value *= 1.0e3;
    }
    format!("{} {}{}", significant(value), si_prefix(exponent), units)
}

pub fn frequency_string(hz: f64) -> String {
    format_units(hz, "Hz", true)
}

pub fn amplitude_string(volts: f64) -> String {
    format_units(volts, "V", true)
}

pub fn duty_string(percent: f64) -> String {
    format!("{:.1}%", percent)
}

pub fn phase_string(degrees: u16) -> String {
    format!("{}°", degrees)
}

/// Interpret a raw counter reading for the selected measurement.
///
/// Periods and pulse widths are counted in nanoseconds, duty cycle in tenths
/// of a percent.
pub fn counter_to_measurement(kind: MeasureKind, raw: u32) -> f64 {
    match kind {
        MeasureKind::Frequency | MeasureKind::Count => raw as f64,
        MeasureKind::Period | MeasureKind::PulseWidth | MeasureKind::NegativePulseWidth => {
            raw as f64 * 1.0e-9
        }
        MeasureKind::DutyCycle => raw as f64 / 10.0,
    }
}

pub fn measurement_string(kind: MeasureKind, value: f64) -> String {
    match kind {
        MeasureKind::Frequency => frequency_string(value),
        MeasureKind::Count => format!("{}", value as u64),
        MeasureKind::Period | MeasureKind::PulseWidth | MeasureKind::NegativePulseWidth => {
            format_units(value, "s", true)
        }
        MeasureKind::DutyCycle => duty_string(value),
    }
}
