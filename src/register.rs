//! This module is used to define the registers on the MHS-5200A.
//!
//! A register is addressed by an optional single digit index followed by a
//! one letter field code. For per-channel registers the index is the channel
//! number, for the global registers it selects which function the field
//! addresses, e.g. `1b` is output on/off whereas `8b` is the sweep state.

use core::fmt;

use crate::types::Channel;

/// One letter field codes understood by the instrument.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Field {
    /// __R/W__ - Frequency, in hundredths of a hertz.
    Frequency,
    /// __R/W__ - Waveform code.
    Waveform,
    /// __R/W__ - Amplitude, scale depends on attenuation.
    Amplitude,
    /// __R/W__ - Duty cycle, in tenths of a percent.
    Duty,
    /// __R/W__ - Offset, percentage of amplitude biased by `120`.
    Offset,
    /// __R/W__ - Phase, in degrees.
    Phase,
    /// __R/W__ - Attenuation. `0` is -20dB, `1` is 0dB.
    Attenuation,
    /// __R/W__ - Output on/off, channel select or sweep state/type.
    State,
    /// __R/W__ - Sweep duration, in seconds.
    Time,
    /// __W__ - Counter measurement type select.
    Measure,
    /// __R__ - Counter value.
    Counter,
    /// __W__ - Save the current configuration to a slot.
    Save,
    /// __W__ - Load a configuration from a slot.
    Load,
    /// __R__ - Identity registers (model, firmware, serial).
    Identity,
}

impl Field {
    pub const fn code(self) -> char {
        match self {
            Field::Frequency => 'f',
            Field::Waveform => 'w',
            Field::Amplitude => 'a',
            Field::Duty => 'd',
            Field::Offset => 'o',
            Field::Phase => 'p',
            Field::Attenuation => 'y',
            Field::State => 'b',
            Field::Time => 't',
            Field::Measure => 'm',
            Field::Counter => 'e',
            Field::Save => 'u',
            Field::Load => 'v',
            Field::Identity => 'c',
        }
    }
}

/// A fully addressed register, e.g. `1f` (channel 1 frequency).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Register {
    pub index: Option<u8>,
    pub field: Field,
}

impl Register {
    pub const fn new(index: u8, field: Field) -> Self {
        Self {
            index: Some(index),
            field,
        }
    }

    /// A register with no index digit, such as save and load.
    pub const fn global(field: Field) -> Self {
        Self { index: None, field }
    }

    pub const fn channel(channel: Channel, field: Field) -> Self {
        Self::new(channel as u8, field)
    }

    /// Output on/off.
    pub const ON_OFF: Register = Register::new(1, Field::State);
    /// Currently selected channel.
    pub const CHANNEL_SELECT: Register = Register::new(2, Field::State);
    /// Measurement timer stop. Only present on [`ProtocolRevision::Mhs5200A`](crate::config::ProtocolRevision).
    pub const MEASURE_STOP: Register = Register::new(6, Field::State);
    /// Sweep type, linear or logarithmic.
    pub const SWEEP_TYPE: Register = Register::new(7, Field::State);
    /// Sweep running state.
    pub const SWEEP_STATE: Register = Register::new(8, Field::State);
    /// Sweep start frequency.
    pub const SWEEP_START: Register = Register::new(3, Field::Frequency);
    /// Sweep end frequency.
    pub const SWEEP_END: Register = Register::new(4, Field::Frequency);
    /// Sweep duration.
    pub const SWEEP_DURATION: Register = Register::new(1, Field::Time);
    /// Counter readout.
    pub const COUNTER: Register = Register::new(0, Field::Counter);
    pub const MODEL: Register = Register::new(0, Field::Identity);
    pub const FIRMWARE: Register = Register::new(1, Field::Identity);
    pub const SERIAL: Register = Register::new(2, Field::Identity);
    pub const SAVE: Register = Register::global(Field::Save);
    pub const LOAD: Register = Register::global(Field::Load);
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(index) = self.index {
            write!(f, "{}", index)?;
        }
        write!(f, "{}", self.field.code())
    }
}
