use core::{fmt, time::Duration};
use std::{
    path::Path,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        mpsc::{self, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::Instant,
};

use embedded_io::{Error as _, ErrorKind};
use fugit::SecsDurationU32;

use crate::{
    codec::{self, Command},
    config::{Config, ProtocolRevision},
    error::{Error, ProtocolError, Result},
    register::{Field, Register},
    scaling,
    types::{
        Attenuation, Channel, MeasureCommand, MeasureKind, Slot, State, SweepType, Waveform,
        waveform_name,
    },
    waveform::{self, ArbitraryWaveform},
};

/// Responses are short, the longest is an identity register.
const RESPONSE_CAPACITY: usize = 64;

/// Called by the poller with every measurement taken.
pub type Reporter = Box<dyn FnMut(Measurement) + Send>;

/// Whether the poller is reporting, and what it reports.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct MeasurementState {
    pub active: bool,
    pub kind: MeasureKind,
}

/// A single counter reading converted to the units of its kind.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Measurement {
    pub kind: MeasureKind,
    pub value: f64,
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&scaling::measurement_string(self.kind, self.value))
    }
}

/// Target state for one channel. Fields left as `None` are not touched.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelConfig {
    pub channel: Channel,
    pub frequency: Option<f64>,
    pub waveform: Option<Waveform>,
    pub amplitude: Option<f64>,
    pub phase: Option<u16>,
    pub duty: Option<f64>,
    /// Absolute offset in volts, stored by the instrument relative to amplitude.
    pub offset: Option<f64>,
    pub attenuation: Option<Attenuation>,
}

impl ChannelConfig {
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            frequency: None,
            waveform: None,
            amplitude: None,
            phase: None,
            duty: None,
            offset: None,
            attenuation: None,
        }
    }
}

/// Sweep settings. Sweeps only run on channel 1.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SweepConfig {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub duration: Option<SecsDurationU32>,
    pub sweep_type: Option<SweepType>,
    pub waveform: Option<Waveform>,
    pub duty: Option<f64>,
}

/// Sweep settings as read back from the instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct SweepSettings {
    pub duty: f64,
    /// Raw waveform code of channel 1.
    pub waveform: u32,
    pub start: f64,
    pub end: f64,
    pub duration: SecsDurationU32,
    pub sweep_type: SweepType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelReport {
    pub channel: Channel,
    pub frequency: f64,
    /// Raw waveform code, may be one this crate has no name for.
    pub waveform: u32,
    pub amplitude: f64,
    pub duty: f64,
    pub offset: f64,
    pub phase: u16,
    pub attenuation: Attenuation,
}

impl fmt::Display for ChannelReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Channel {} config", self.channel)?;
        writeln!(f, "\tFrequency:\t{}", scaling::frequency_string(self.frequency))?;
        writeln!(f, "\tWaveform:\t{}", waveform_name(self.waveform))?;
        writeln!(f, "\tAmplitude:\t{}", scaling::amplitude_string(self.amplitude))?;
        writeln!(f, "\tDutyCycle:\t{}", scaling::duty_string(self.duty))?;
        writeln!(f, "\tOffset:\t\t{}", scaling::amplitude_string(self.offset))?;
        writeln!(f, "\tPhase:\t\t{}", scaling::phase_string(self.phase))?;
        writeln!(f, "\tAttenuation:\t{}", self.attenuation)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConfigReport {
    pub model: String,
    pub serial: String,
    pub firmware: f64,
    pub channels: [ChannelReport; 2],
}

impl fmt::Display for ConfigReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model:\t\t{}", self.model)?;
        writeln!(f, "Serial:\t\t{}", self.serial)?;
        writeln!(f, "Firmware:\t{}", self.firmware)?;
        for channel in &self.channels {
            writeln!(f)?;
            write!(f, "{}", channel)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SweepReport {
    pub active: State,
    pub settings: SweepSettings,
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let settings = &self.settings;
        writeln!(f, "Sweep config")?;
        writeln!(f, "\tActive:\t\t{}", if bool::from(self.active) { "True" } else { "False" })?;
        writeln!(f, "\tWaveform:\t{}", waveform_name(settings.waveform))?;
        // Duty cycle only means something for a square wave.
        if Waveform::from_code(settings.waveform) == Some(Waveform::Square) {
            writeln!(f, "\tDutyCycle:\t{}", scaling::duty_string(settings.duty))?;
        }
        writeln!(f, "\tStart:\t\t{}", scaling::frequency_string(settings.start))?;
        writeln!(f, "\tEnd:\t\t{}", scaling::frequency_string(settings.end))?;
        writeln!(f, "\tDuration:\t{} seconds", settings.duration.to_secs())?;
        writeln!(f, "\tType:\t\t{}", settings.sweep_type)
    }
}

/// State shared between the session and its poller thread.
struct Shared<S> {
    /// Held for one full command/response exchange.
    transport: Mutex<S>,
    measurement: Mutex<MeasurementState>,
    config: Config,
}

impl<S: embedded_io::Read + embedded_io::Write> Shared<S> {
    fn measurement(&self) -> MutexGuard<'_, MeasurementState> {
        self.measurement
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Send one command line and wait for the newline terminated response.
    fn exchange(&self, command: &str) -> Result<String, S::Error> {
        let mut transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        self.discard_stale(&mut transport)?;

        log::trace!("send: {}", command);
        transport
            .write_all(command.as_bytes())
            .map_err(Error::SerialError)?;
        transport.write_all(b"\n").map_err(Error::SerialError)?;
        transport.flush().map_err(Error::SerialError)?;

        let deadline = Instant::now() + self.config.response_timeout;
        let mut pending: heapless::Vec<u8, RESPONSE_CAPACITY> = heapless::Vec::new();
        let mut chunk = [0u8; 16];
        loop {
            while let Some(end) = pending.iter().position(|b| *b == b'\n') {
                let line = String::from_utf8_lossy(codec::trim_response(&pending[..end])).into_owned();
                pending = heapless::Vec::from_slice(&pending[end + 1..])
                    .map_err(|_| Error::BufferError)?;
                if codec::is_response_to(command, &line) {
                    log::trace!("receive: {}", line);
                    return Ok(line);
                }
                // A late answer to an earlier command that timed out.
                log::trace!("discarding stale response: {:?}", line);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(self.config.response_timeout));
            }
            match transport.read(&mut chunk) {
                Ok(bytes_read) => {
                    if pending.extend_from_slice(&chunk[..bytes_read]).is_err() {
                        return Err(Error::BufferError);
                    }
                }
                // The port's own read timeout expiring just means nothing arrived yet.
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::Interrupted) => {}
                Err(e) => return Err(Error::SerialError(e)),
            }
        }
    }

    /// Drop whatever is already waiting on the transport before a new command
    /// goes out.
    fn discard_stale(&self, transport: &mut S) -> Result<(), S::Error> {
        let deadline = Instant::now() + self.config.response_timeout;
        let mut chunk = [0u8; 16];
        loop {
            match transport.read(&mut chunk) {
                Ok(0) => return Ok(()),
                Ok(bytes_read) => log::trace!(
                    "discarding stale bytes: {:?}",
                    String::from_utf8_lossy(&chunk[..bytes_read])
                ),
                Err(e) if e.kind() == ErrorKind::TimedOut => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::SerialError(e)),
            }
            if Instant::now() >= deadline {
                return Ok(());
            }
        }
    }

    fn get(&self, register: Register) -> Result<u32, S::Error> {
        let command = codec::encode_get(register)?;
        let response = self.exchange(&command)?;
        Ok(codec::decode_value(&response)?)
    }

    fn read_measurement(&self, kind: MeasureKind) -> Result<Measurement, S::Error> {
        let raw = self.get(Register::COUNTER)?;
        Ok(Measurement {
            kind,
            value: scaling::counter_to_measurement(kind, raw),
        })
    }

    /// One poller tick. A failed read is logged and polling carries on.
    fn poll(&self, reporter: &mut Reporter) {
        let state = *self.measurement();
        if !state.active {
            return;
        }
        match self.read_measurement(state.kind) {
            Ok(measurement) => reporter(measurement),
            Err(e) => log::warn!("failed to read {} measurement: {}", state.kind, e),
        }
    }
}

struct Poller {
    stop: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// You can create a Mhs5200 using any interface which implements [embedded_io::Read] & [embedded_io::Write].
///
/// Methods take `&self`, every exchange with the instrument holds the
/// transport lock for its full duration, so commands from the caller and reads
/// from the measurement poller never interleave. Composite operations are not
/// atomic, only the individual exchanges are.
///
/// "set" writes a configuration value and "get" reads one back.
///
/// __Note:__ sweeps only run on channel 1 but the instrument accepts sweep
/// settings whichever channel is selected. Select channel 1 first.
pub struct Mhs5200<S: embedded_io::Read + embedded_io::Write + Send + 'static> {
    shared: Arc<Shared<S>>,
    poller: Option<Poller>,
}

impl<S: embedded_io::Read + embedded_io::Write + Send + 'static> Mhs5200<S> {
    /// Start a session whose measurements are written to the log.
    pub fn new(interface: S, config: Config) -> Result<Self, S::Error> {
        Self::with_reporter(
            interface,
            config,
            Box::new(|measurement| log::info!("{}", measurement)),
        )
    }

    /// Start a session which hands every polled measurement to `reporter`.
    pub fn with_reporter(
        interface: S,
        config: Config,
        reporter: Reporter,
    ) -> Result<Self, S::Error> {
        let interval = config.poll_interval;
        let shared = Arc::new(Shared {
            transport: Mutex::new(interface),
            measurement: Mutex::new(MeasurementState::default()),
            config,
        });
        let poller = spawn_poller(Arc::clone(&shared), interval, reporter)?;
        log::debug!("session started on {}", shared.config.port);
        Ok(Self {
            shared,
            poller: Some(poller),
        })
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    fn revision(&self) -> ProtocolRevision {
        self.shared.config.revision
    }

    /// Write a value to a register and expect the acknowledgement.
    fn set(&self, register: Register, value: u32) -> Result<(), S::Error> {
        let command = codec::encode_set(register, value)?;
        self.send_expect_ack(&command)
    }

    /// Skip the write entirely when there is nothing to set.
    fn set_optional(&self, register: Register, value: Option<u32>) -> Result<(), S::Error> {
        match value {
            Some(value) => self.set(register, value),
            None => Ok(()),
        }
    }

    fn send_expect_ack(&self, command: &Command) -> Result<(), S::Error> {
        let response = self.shared.exchange(command)?;
        codec::decode_ack(&response)?;
        Ok(())
    }

    fn get(&self, register: Register) -> Result<u32, S::Error> {
        self.shared.get(register)
    }

    /// Set the output frequency in Hz. `NaN` leaves it unchanged.
    pub fn set_frequency(&self, channel: Channel, hz: f64) -> Result<(), S::Error> {
        let raw = scaling::frequency_to_raw(hz)?;
        self.set_optional(Register::channel(channel, Field::Frequency), raw)
    }

    pub fn get_frequency(&self, channel: Channel) -> Result<f64, S::Error> {
        let raw = self.get(Register::channel(channel, Field::Frequency))?;
        Ok(scaling::raw_to_frequency(raw))
    }

    /// Select the output waveform.
    ///
    /// Sinc waveforms are generated and uploaded to [`Slot::RESERVED`] first.
    /// After selecting any arbitrary waveform this blocks for the configured
    /// settle time while the instrument loads it, without holding the
    /// transport.
    pub fn set_waveform(&self, channel: Channel, waveform: Waveform) -> Result<(), S::Error> {
        match waveform {
            Waveform::Sinc => {
                self.set_arbitrary_waveform(Slot::RESERVED, &waveform::generate_sinc())?;
                self.set_waveform(channel, Waveform::Arbitrary(Slot::RESERVED))
            }
            Waveform::NormalizedSinc => {
                self.set_arbitrary_waveform(Slot::RESERVED, &waveform::generate_normalized_sinc())?;
                self.set_waveform(channel, Waveform::Arbitrary(Slot::RESERVED))
            }
            _ => {
                let register = Register::channel(channel, Field::Waveform);
                self.set(register, waveform.code(self.revision()))?;
                if waveform.is_arbitrary() {
                    log::debug!("waiting for {} to load", waveform);
                    thread::sleep(self.shared.config.arbitrary_settle);
                }
                Ok(())
            }
        }
    }

    /// Parse a waveform name and select it, e.g. `"square"` or `"arb3"`.
    pub fn set_waveform_str(&self, channel: Channel, name: &str) -> Result<(), S::Error> {
        let waveform: Waveform = name.parse()?;
        self.set_waveform(channel, waveform)
    }

    /// Raw waveform code, see [`Waveform::from_code`] and [`waveform_name`].
    pub fn get_waveform(&self, channel: Channel) -> Result<u32, S::Error> {
        self.get(Register::channel(channel, Field::Waveform))
    }

    /// Set the amplitude in volts. `NaN` leaves it unchanged.
    ///
    /// The valid range depends on the channel's attenuation, which is read
    /// back from the instrument every time.
    pub fn set_amplitude(&self, channel: Channel, volts: f64) -> Result<(), S::Error> {
        if volts.is_nan() {
            return Ok(());
        }
        let attenuation = self.get_attenuation(channel)?;
        let raw = scaling::amplitude_to_raw(volts, attenuation)?;
        self.set_optional(Register::channel(channel, Field::Amplitude), raw)
    }

    pub fn get_amplitude(&self, channel: Channel) -> Result<f64, S::Error> {
        let attenuation = self.get_attenuation(channel)?;
        let raw = self.get(Register::channel(channel, Field::Amplitude))?;
        Ok(scaling::raw_to_amplitude(raw, attenuation))
    }

    /// Set the duty cycle in percent. `NaN` leaves it unchanged.
    pub fn set_duty_cycle(&self, channel: Channel, percent: f64) -> Result<(), S::Error> {
        let raw = scaling::duty_to_raw(percent)?;
        self.set_optional(Register::channel(channel, Field::Duty), raw)
    }

    pub fn get_duty_cycle(&self, channel: Channel) -> Result<f64, S::Error> {
        let raw = self.get(Register::channel(channel, Field::Duty))?;
        Ok(scaling::raw_to_duty(raw))
    }

    /// Set the DC offset in volts. `NaN` leaves it unchanged.
    ///
    /// The instrument stores offset as a percentage of amplitude so the
    /// current amplitude is read first. The offset must be within 120% of it.
    pub fn set_offset(&self, channel: Channel, volts: f64) -> Result<(), S::Error> {
        if volts.is_nan() {
            return Ok(());
        }
        let amplitude = self.get_amplitude(channel)?;
        let raw = scaling::offset_to_raw(volts, amplitude)?;
        self.set_optional(Register::channel(channel, Field::Offset), raw)
    }

    pub fn get_offset(&self, channel: Channel) -> Result<f64, S::Error> {
        let amplitude = self.get_amplitude(channel)?;
        let raw = self.get(Register::channel(channel, Field::Offset))?;
        Ok(scaling::raw_to_offset(raw, amplitude))
    }

    /// Set the phase in degrees, `0..=360`.
    pub fn set_phase(&self, channel: Channel, degrees: u16) -> Result<(), S::Error> {
        let raw = scaling::phase_to_raw(degrees)?;
        self.set(Register::channel(channel, Field::Phase), raw)
    }

    pub fn get_phase(&self, channel: Channel) -> Result<u16, S::Error> {
        let raw = self.get(Register::channel(channel, Field::Phase))?;
        let degrees =
            u16::try_from(raw).map_err(|_| ProtocolError::InvalidNumber(raw.to_string()))?;
        Ok(degrees)
    }

    pub fn set_attenuation(
        &self,
        channel: Channel,
        attenuation: Attenuation,
    ) -> Result<(), S::Error> {
        self.set(
            Register::channel(channel, Field::Attenuation),
            attenuation as u32,
        )
    }

    pub fn get_attenuation(&self, channel: Channel) -> Result<Attenuation, S::Error> {
        let raw = self.get(Register::channel(channel, Field::Attenuation))?;
        Ok(Attenuation::try_from(raw)?)
    }

    /// Enable/disable the outputs.
    pub fn set_on_off(&self, state: impl Into<State>) -> Result<(), S::Error> {
        let state: State = state.into();
        self.set(Register::ON_OFF, bool::from(state) as u32)
    }

    /// Select the channel shown and edited on the front panel.
    pub fn select_channel(&self, channel: Channel) -> Result<(), S::Error> {
        self.set(Register::CHANNEL_SELECT, channel as u32)
    }

    /// Save the current configuration to a slot.
    pub fn save(&self, slot: Slot) -> Result<(), S::Error> {
        self.set(Register::SAVE, slot.index() as u32)
    }

    /// Load a configuration from a slot.
    pub fn load(&self, slot: Slot) -> Result<(), S::Error> {
        self.set(Register::LOAD, slot.index() as u32)
    }

    /// Start/stop the sweep.
    pub fn set_sweep_state(&self, state: impl Into<State>) -> Result<(), S::Error> {
        let state: State = state.into();
        self.set(Register::SWEEP_STATE, bool::from(state) as u32)
    }

    pub fn get_sweep_state(&self) -> Result<State, S::Error> {
        let raw = self.get(Register::SWEEP_STATE)?;
        Ok(State::from(raw != 0))
    }

    /// Set the sweep start frequency in Hz. `NaN` leaves it unchanged.
    pub fn set_sweep_start(&self, hz: f64) -> Result<(), S::Error> {
        let raw = scaling::frequency_to_raw(hz)?;
        self.set_optional(Register::SWEEP_START, raw)
    }

    pub fn get_sweep_start(&self) -> Result<f64, S::Error> {
        Ok(scaling::raw_to_frequency(self.get(Register::SWEEP_START)?))
    }

    /// Set the sweep end frequency in Hz. `NaN` leaves it unchanged.
    pub fn set_sweep_end(&self, hz: f64) -> Result<(), S::Error> {
        let raw = scaling::frequency_to_raw(hz)?;
        self.set_optional(Register::SWEEP_END, raw)
    }

    pub fn get_sweep_end(&self) -> Result<f64, S::Error> {
        Ok(scaling::raw_to_frequency(self.get(Register::SWEEP_END)?))
    }

    pub fn set_sweep_duration(&self, duration: SecsDurationU32) -> Result<(), S::Error> {
        let raw = scaling::sweep_duration_to_raw(duration)?;
        self.set(Register::SWEEP_DURATION, raw)
    }

    pub fn get_sweep_duration(&self) -> Result<SecsDurationU32, S::Error> {
        let seconds = self.get(Register::SWEEP_DURATION)?;
        Ok(SecsDurationU32::secs(seconds))
    }

    pub fn set_sweep_type(&self, sweep_type: SweepType) -> Result<(), S::Error> {
        self.set(Register::SWEEP_TYPE, sweep_type as u32)
    }

    pub fn get_sweep_type(&self) -> Result<SweepType, S::Error> {
        let raw = self.get(Register::SWEEP_TYPE)?;
        Ok(SweepType::try_from(raw)?)
    }

    /// Apply the given sweep settings, in the order duty, waveform, start,
    /// end, duration and type. Stops at the first failure.
    pub fn set_sweep(&self, sweep: &SweepConfig) -> Result<(), S::Error> {
        if let Some(duty) = sweep.duty {
            self.set_duty_cycle(Channel::One, duty)?;
        }
        if let Some(waveform) = sweep.waveform {
            self.set_waveform(Channel::One, waveform)?;
        }
        if let Some(start) = sweep.start {
            self.set_sweep_start(start)?;
        }
        if let Some(end) = sweep.end {
            self.set_sweep_end(end)?;
        }
        if let Some(duration) = sweep.duration {
            self.set_sweep_duration(duration)?;
        }
        if let Some(sweep_type) = sweep.sweep_type {
            self.set_sweep_type(sweep_type)?;
        }
        Ok(())
    }

    pub fn get_sweep(&self) -> Result<SweepSettings, S::Error> {
        Ok(SweepSettings {
            duty: self.get_duty_cycle(Channel::One)?,
            waveform: self.get_waveform(Channel::One)?,
            start: self.get_sweep_start()?,
            end: self.get_sweep_end()?,
            duration: self.get_sweep_duration()?,
            sweep_type: self.get_sweep_type()?,
        })
    }

    /// Start or stop the frequency counter.
    ///
    /// Starting selects the measurement on the instrument and enables
    /// polling. Stopping disables polling and, where the revision supports
    /// it, stops the instrument's measurement timer.
    pub fn measure(&self, command: MeasureCommand) -> Result<(), S::Error> {
        match command {
            MeasureCommand::Stop => {
                self.shared.measurement().active = false;
                match self.revision() {
                    ProtocolRevision::Mhs5200A => self.set(Register::MEASURE_STOP, 0)?,
                    ProtocolRevision::Legacy => {
                        log::debug!("no measurement stop register, polling stopped")
                    }
                }
            }
            MeasureCommand::Start(kind) => {
                let command = codec::encode_trigger(Register::new(kind as u8, Field::Measure))?;
                self.send_expect_ack(&command)?;
                *self.shared.measurement() = MeasurementState { active: true, kind };
            }
        }
        Ok(())
    }

    /// [`Self::measure`] with a name, e.g. `"frequency"` or `"stop"`.
    pub fn measure_str(&self, name: &str) -> Result<(), S::Error> {
        let command: MeasureCommand = name
            .parse()
            .map_err(|_| Error::UnknownParameter(name.to_string()))?;
        self.measure(command)
    }

    pub fn measurement_state(&self) -> MeasurementState {
        *self.shared.measurement()
    }

    /// Raw value of the frequency counter.
    pub fn get_counter_value(&self) -> Result<u32, S::Error> {
        self.get(Register::COUNTER)
    }

    /// Read the counter, interpreted for the currently selected measurement.
    pub fn get_measurement(&self) -> Result<Measurement, S::Error> {
        let kind = self.shared.measurement().kind;
        self.shared.read_measurement(kind)
    }

    /// Model name, e.g. `MHS-5225A`.
    pub fn get_model(&self) -> Result<String, S::Error> {
        let response = self.shared.exchange(&codec::encode_get(Register::MODEL)?)?;
        Ok(codec::decode_model(&response)?)
    }

    pub fn get_firmware_version(&self) -> Result<f64, S::Error> {
        let response = self
            .shared
            .exchange(&codec::encode_get(Register::FIRMWARE)?)?;
        Ok(codec::decode_firmware_version(&response)?)
    }

    pub fn get_serial(&self) -> Result<String, S::Error> {
        let response = self.shared.exchange(&codec::encode_get(Register::SERIAL)?)?;
        Ok(codec::decode_serial(&response)?)
    }

    /// Upload an arbitrary waveform to a slot, one slice at a time.
    ///
    /// The first slice which isn't acknowledged aborts the transfer.
    pub fn set_arbitrary_waveform(
        &self,
        slot: Slot,
        waveform: &ArbitraryWaveform,
    ) -> Result<(), S::Error> {
        log::debug!("uploading arbitrary waveform to slot {}", slot);
        for (index, samples) in waveform.raw_slices().iter().enumerate() {
            let command = codec::encode_arbitrary_slice(slot, index, samples)?;
            if let Err(e) = self.send_expect_ack(&command) {
                log::error!("failed to send arbitrary waveform slice {}: {}", index, e);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Upload raw samples, which must be exactly [`waveform::NUM_POINTS`] long.
    pub fn set_arbitrary_samples(&self, slot: Slot, samples: &[f64]) -> Result<(), S::Error> {
        let waveform = ArbitraryWaveform::try_from(samples.to_vec())?;
        self.set_arbitrary_waveform(slot, &waveform)
    }

    /// Upload a waveform file to a slot and select it on channel 1.
    ///
    /// See [`waveform::parse_samples`] for the file format.
    pub fn set_arbitrary_waveform_from_file(
        &self,
        slot: Slot,
        path: impl AsRef<Path>,
    ) -> Result<(), S::Error> {
        let text = std::fs::read_to_string(path)?;
        let waveform = waveform::parse_samples(&text)?;
        self.set_arbitrary_waveform(slot, &waveform)?;
        self.set_waveform(Channel::One, Waveform::Arbitrary(slot))
    }

    /// Apply every field that is set, in the order channel select,
    /// attenuation, frequency, waveform, amplitude, phase, duty and offset.
    ///
    /// Attenuation goes before amplitude and amplitude before offset since
    /// each is interpreted relative to the one before. Stops at the first
    /// failure.
    pub fn apply_channel_config(&self, config: &ChannelConfig) -> Result<(), S::Error> {
        let channel = config.channel;
        log::debug!("applying {:?}", config);
        self.select_channel(channel)?;
        if let Some(attenuation) = config.attenuation {
            self.set_attenuation(channel, attenuation)?;
        }
        if let Some(frequency) = config.frequency {
            self.set_frequency(channel, frequency)?;
        }
        if let Some(waveform) = config.waveform {
            self.set_waveform(channel, waveform)?;
        }
        if let Some(amplitude) = config.amplitude {
            self.set_amplitude(channel, amplitude)?;
        }
        if let Some(phase) = config.phase {
            self.set_phase(channel, phase)?;
        }
        if let Some(duty) = config.duty {
            self.set_duty_cycle(channel, duty)?;
        }
        if let Some(offset) = config.offset {
            self.set_offset(channel, offset)?;
        }
        Ok(())
    }

    /// Select a channel and read back its full configuration.
    pub fn show_channel_config(&self, channel: Channel) -> Result<ChannelReport, S::Error> {
        self.select_channel(channel)?;
        Ok(ChannelReport {
            channel,
            frequency: self.get_frequency(channel)?,
            waveform: self.get_waveform(channel)?,
            amplitude: self.get_amplitude(channel)?,
            duty: self.get_duty_cycle(channel)?,
            offset: self.get_offset(channel)?,
            phase: self.get_phase(channel)?,
            attenuation: self.get_attenuation(channel)?,
        })
    }

    /// Identity and both channel configurations.
    pub fn show_config(&self) -> Result<ConfigReport, S::Error> {
        let model = self.get_model()?;
        let serial = self.get_serial()?;
        let firmware = self.get_firmware_version()?;
        Ok(ConfigReport {
            model,
            serial,
            firmware,
            channels: [
                self.show_channel_config(Channel::One)?,
                self.show_channel_config(Channel::Two)?,
            ],
        })
    }

    pub fn show_sweep_config(&self) -> Result<SweepReport, S::Error> {
        let active = self.get_sweep_state()?;
        let settings = self.get_sweep()?;
        Ok(SweepReport { active, settings })
    }

    /// Stop the poller and hand back the transport.
    ///
    /// Returns `None` if the transport is somehow still shared.
    pub fn close(mut self) -> Option<S> {
        self.stop_poller();
        let shared = Arc::clone(&self.shared);
        drop(self);
        Arc::try_unwrap(shared).ok().map(|shared| {
            shared
                .transport
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)
        })
    }

    fn stop_poller(&mut self) {
        if let Some(poller) = self.poller.take() {
            // A send error means the thread is already gone.
            let _ = poller.stop.send(());
            if poller.handle.join().is_err() {
                log::error!("measurement poller panicked");
            }
            log::debug!("session stopped");
        }
    }
}

impl<S: embedded_io::Read + embedded_io::Write + Send + 'static> Drop for Mhs5200<S> {
    fn drop(&mut self) {
        self.stop_poller();
    }
}

fn spawn_poller<S: embedded_io::Read + embedded_io::Write + Send + 'static>(
    shared: Arc<Shared<S>>,
    interval: Duration,
    mut reporter: Reporter,
) -> Result<Poller, S::Error> {
    let (stop, stopped) = mpsc::channel::<()>();
    let handle = thread::Builder::new()
        .name("mhs5200-poller".to_string())
        .spawn(move || {
            loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => shared.poll(&mut reporter),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })?;
    Ok(Poller { stop, handle })
}
