//! This module contains the symbolic vocabularies used by the instrument:
//! channels, slots, waveforms, attenuation, sweep types and counter modes.

use core::{fmt, str::FromStr};

use strum_macros::EnumIter;

use crate::{config::ProtocolRevision, error::ValueError};

/// Output channel. Sweeps are only available on [`Channel::One`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Channel {
    One = 1,
    Two = 2,
}

impl TryFrom<u8> for Channel {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Channel::One),
            2 => Ok(Channel::Two),
            _ => Err(ValueError::OutOfRange {
                quantity: "channel",
                value: value as f64,
                min: 1.0,
                max: 2.0,
            }),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

/// One of the 16 storage locations on the instrument, used both for saved
/// configurations and for arbitrary waveforms.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Slot(u8);

impl Slot {
    pub const COUNT: u8 = 16;
    /// The slot synthesized sinc waveforms are uploaded to.
    pub const RESERVED: Slot = Slot(15);

    pub const fn index(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Slot {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value < Self::COUNT {
            Ok(Slot(value))
        } else {
            Err(ValueError::OutOfRange {
                quantity: "slot",
                value: value as f64,
                min: 0.0,
                max: (Self::COUNT - 1) as f64,
            })
        }
    }
}

impl TryFrom<u32> for Slot {
    type Error = ValueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .map_err(|_| ValueError::OutOfRange {
                quantity: "slot",
                value: value as f64,
                min: 0.0,
                max: (Self::COUNT - 1) as f64,
            })
            .and_then(|index: u8| Slot::try_from(index))
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Used to be less ambiguous and whether something is on or off.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum State {
    /// Disabled.
    #[default]
    Off,
    /// Enabled.
    On,
}

impl From<State> for bool {
    fn from(value: State) -> Self {
        match value {
            State::Off => false,
            State::On => true,
        }
    }
}

impl From<bool> for State {
    fn from(value: bool) -> Self {
        match value {
            true => State::On,
            false => State::Off,
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Off => f.write_str("Off"),
            State::On => f.write_str("On"),
        }
    }
}

/// Output attenuation pad.
#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Attenuation {
    /// Attenuator engaged. Amplitude is limited to 2V.
    Minus20dB = 0,
    /// Attenuator bypassed. Amplitude is limited to 20V.
    ZerodB = 1,
}

impl TryFrom<u32> for Attenuation {
    type Error = ValueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Attenuation::Minus20dB),
            1 => Ok(Attenuation::ZerodB),
            _ => Err(ValueError::OutOfRange {
                quantity: "attenuation",
                value: value as f64,
                min: 0.0,
                max: 1.0,
            }),
        }
    }
}

impl fmt::Display for Attenuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Attenuation::Minus20dB => f.write_str("-20dB"),
            Attenuation::ZerodB => f.write_str("0dB"),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum SweepType {
    Linear = 0,
    Logarithmic = 1,
}

impl TryFrom<u32> for SweepType {
    type Error = ValueError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SweepType::Linear),
            1 => Ok(SweepType::Logarithmic),
            _ => Err(ValueError::OutOfRange {
                quantity: "sweep type",
                value: value as f64,
                min: 0.0,
                max: 1.0,
            }),
        }
    }
}

impl FromStr for SweepType {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linear" => Ok(SweepType::Linear),
            "logarithmic" | "log" => Ok(SweepType::Logarithmic),
            _ => Err(ValueError::UnknownName {
                quantity: "sweep type",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for SweepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepType::Linear => f.write_str("linear"),
            SweepType::Logarithmic => f.write_str("logarithmic"),
        }
    }
}

/// Waveforms the instrument can output.
///
/// [`Waveform::Sinc`] and [`Waveform::NormalizedSinc`] are not native to the
/// instrument, they are synthesized and uploaded to [`Slot::RESERVED`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    RisingSawtooth,
    DescendingSawtooth,
    Sinc,
    NormalizedSinc,
    Arbitrary(Slot),
}

impl Waveform {
    const ARBITRARY: &'static str = "arbitrary";
    const ARBITRARY_SHORT: &'static str = "arb";
    const ARBITRARY_BASE: u32 = 100;
    const ARBITRARY_BASE_LEGACY: u32 = 10;

    /// The code to write to the waveform register.
    pub fn code(self, revision: ProtocolRevision) -> u32 {
        match self {
            Waveform::Sine => 0,
            Waveform::Square => 1,
            Waveform::Triangle => 2,
            Waveform::RisingSawtooth => 3,
            Waveform::DescendingSawtooth => 4,
            Waveform::Sinc => 5,
            Waveform::NormalizedSinc => 6,
            Waveform::Arbitrary(slot) => {
                let base = match revision {
                    ProtocolRevision::Mhs5200A => Self::ARBITRARY_BASE,
                    ProtocolRevision::Legacy => Self::ARBITRARY_BASE_LEGACY,
                };
                base + slot.index() as u32
            }
        }
    }

    /// Interpret a waveform register value. Both arbitrary ranges are accepted.
    pub fn from_code(code: u32) -> Option<Waveform> {
        let arbitrary = |base: u32| Slot::try_from(code - base).ok().map(Waveform::Arbitrary);
        match code {
            0 => Some(Waveform::Sine),
            1 => Some(Waveform::Square),
            2 => Some(Waveform::Triangle),
            3 => Some(Waveform::RisingSawtooth),
            4 => Some(Waveform::DescendingSawtooth),
            5 => Some(Waveform::Sinc),
            6 => Some(Waveform::NormalizedSinc),
            c if c >= Self::ARBITRARY_BASE => arbitrary(Self::ARBITRARY_BASE),
            c if c >= Self::ARBITRARY_BASE_LEGACY => arbitrary(Self::ARBITRARY_BASE_LEGACY),
            _ => None,
        }
    }

    pub const fn is_arbitrary(self) -> bool {
        matches!(self, Waveform::Arbitrary(_))
    }
}

/// Human readable name for a raw waveform code, `"unknown"` if it is not one.
pub fn waveform_name(code: u32) -> String {
    match Waveform::from_code(code) {
        Some(waveform) => waveform.to_string(),
        None => "unknown".to_string(),
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Waveform::Sine => f.write_str("sine"),
            Waveform::Square => f.write_str("square"),
            Waveform::Triangle => f.write_str("triangle"),
            Waveform::RisingSawtooth => f.write_str("rising sawtooth"),
            Waveform::DescendingSawtooth => f.write_str("descending sawtooth"),
            Waveform::Sinc => f.write_str("sinc"),
            Waveform::NormalizedSinc => f.write_str("normsinc"),
            Waveform::Arbitrary(slot) => write!(f, "{}{}", Self::ARBITRARY, slot),
        }
    }
}

impl FromStr for Waveform {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ValueError::UnknownName {
            quantity: "waveform",
            name: s.to_string(),
        };
        match s {
            "sine" => Ok(Waveform::Sine),
            "square" => Ok(Waveform::Square),
            "triangle" => Ok(Waveform::Triangle),
            "rising sawtooth" => Ok(Waveform::RisingSawtooth),
            "descending sawtooth" => Ok(Waveform::DescendingSawtooth),
            "sinc" => Ok(Waveform::Sinc),
            "normsinc" => Ok(Waveform::NormalizedSinc),
            _ => {
                // Long prefix first, "arbitrary" also starts with "arb".
                let index = s
                    .strip_prefix(Self::ARBITRARY)
                    .or_else(|| s.strip_prefix(Self::ARBITRARY_SHORT))
                    .ok_or_else(unknown)?;
                let index: u8 = index.parse().map_err(|_| unknown())?;
                Ok(Waveform::Arbitrary(Slot::try_from(index)?))
            }
        }
    }
}

/// Counter measurement modes.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum MeasureKind {
    #[default]
    Frequency = 0,
    Count = 1,
    Period = 2,
    PulseWidth = 3,
    NegativePulseWidth = 4,
    DutyCycle = 5,
}

impl FromStr for MeasureKind {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frequency" => Ok(MeasureKind::Frequency),
            "count" => Ok(MeasureKind::Count),
            "period" => Ok(MeasureKind::Period),
            "pulsewidth" => Ok(MeasureKind::PulseWidth),
            "negativepulsewidth" => Ok(MeasureKind::NegativePulseWidth),
            "duty" => Ok(MeasureKind::DutyCycle),
            _ => Err(ValueError::UnknownName {
                quantity: "measurement",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for MeasureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasureKind::Frequency => f.write_str("frequency"),
            MeasureKind::Count => f.write_str("count"),
            MeasureKind::Period => f.write_str("period"),
            MeasureKind::PulseWidth => f.write_str("pulse width"),
            MeasureKind::NegativePulseWidth => f.write_str("negative pulse width"),
            MeasureKind::DutyCycle => f.write_str("duty cycle"),
        }
    }
}

/// Argument to [`Mhs5200::measure`](crate::mhs5200::Mhs5200::measure).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MeasureCommand {
    Stop,
    Start(MeasureKind),
}

impl FromStr for MeasureCommand {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "stop" {
            Ok(MeasureCommand::Stop)
        } else {
            s.parse().map(MeasureCommand::Start)
        }
    }
}
