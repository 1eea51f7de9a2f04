//! JSON scripts played back against a session.
//!
//! A script names the port to use and a list of commands, each with an
//! optional list of parameter blocks:
//!
//! ```json
//! {
//!     "port": "/dev/ttyUSB0",
//!     "cmds": [
//!         { "cmd": "config", "data": [{ "channel": 1, "frequency": 1000, "waveform": "sine" }] },
//!         { "cmd": "on" },
//!         { "cmd": "sleep", "data": [{ "seconds": 5 }] },
//!         { "cmd": "off" }
//!     ]
//! }
//! ```
//!
//! Commands run in order and playback stops at the first failure.

use std::{
    io,
    path::{Path, PathBuf},
    thread,
    time::Duration,
};

use fugit::SecsDurationU32;
use serde::Deserialize;
use thiserror::Error;

use crate::{
    error::{Error, Result, ValueError},
    mhs5200::{ChannelConfig, Mhs5200, SweepConfig},
    scaling::MAX_PHASE_DEGREES,
    types::{Attenuation, Channel, Slot, SweepType, Waveform},
};

/// How long `sleep` and `delay` wait when no duration is given.
const DEFAULT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Script {
    /// Overrides any port given on the command line.
    pub port: Option<String>,
    pub cmds: Vec<ScriptCommand>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScriptCommand {
    pub cmd: String,
    #[serde(default)]
    pub data: Vec<CommandParams>,
}

/// Parameters of a script command. Which ones are used depends on the command.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CommandParams {
    pub channel: Option<u8>,
    pub frequency: Option<f64>,
    pub waveform: Option<String>,
    pub amplitude: Option<f64>,
    pub phase: Option<f64>,
    pub duty: Option<f64>,
    pub offset: Option<f64>,
    /// `true` engages the -20dB attenuator.
    pub attenuation: Option<bool>,
    pub seconds: Option<u32>,
    pub slot: Option<u8>,
    pub startf: Option<f64>,
    pub endf: Option<f64>,
    #[serde(rename = "type")]
    pub sweep_type: Option<String>,
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("Invalid script: {0}")]
    Json(#[from] serde_json::Error),
}

/// Problems with the parameters of a single command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamError {
    #[error("missing {0} parameter")]
    Missing(&'static str),
    #[error(transparent)]
    Invalid(#[from] ValueError),
}

impl ParamError {
    fn into_error<I: embedded_io::Error>(self, command: &str) -> Error<I> {
        match self {
            ParamError::Missing(parameter) => Error::MissingParameter {
                command: command.to_string(),
                parameter,
            },
            ParamError::Invalid(e) => Error::InvalidValue(e),
        }
    }
}

impl CommandParams {
    /// The channel configuration described by these parameters. `channel` is
    /// required, everything else is optional.
    pub fn to_channel_config(&self) -> core::result::Result<ChannelConfig, ParamError> {
        let channel = self.channel.ok_or(ParamError::Missing("channel"))?;
        let mut config = ChannelConfig::new(Channel::try_from(channel)?);
        config.frequency = self.frequency;
        config.waveform = self
            .waveform
            .as_deref()
            .map(str::parse::<Waveform>)
            .transpose()?;
        config.amplitude = self.amplitude;
        config.phase = self.phase.map(phase_degrees).transpose()?;
        config.duty = self.duty;
        config.offset = self.offset;
        config.attenuation = self.attenuation.map(|engaged| {
            if engaged {
                Attenuation::Minus20dB
            } else {
                Attenuation::ZerodB
            }
        });
        Ok(config)
    }

    pub fn to_sweep_config(&self) -> core::result::Result<SweepConfig, ParamError> {
        Ok(SweepConfig {
            start: self.startf,
            end: self.endf,
            duration: self.seconds.map(SecsDurationU32::secs),
            sweep_type: self
                .sweep_type
                .as_deref()
                .map(str::parse::<SweepType>)
                .transpose()?,
            waveform: self
                .waveform
                .as_deref()
                .map(str::parse::<Waveform>)
                .transpose()?,
            duty: self.duty,
        })
    }

    fn slot(&self) -> core::result::Result<Slot, ValueError> {
        Slot::try_from(self.slot.unwrap_or(0))
    }
}

/// Phase is given as a number in scripts, the instrument wants whole degrees.
fn phase_degrees(phase: f64) -> core::result::Result<u16, ValueError> {
    let phase = ValueError::check_range("phase", phase, 0.0, MAX_PHASE_DEGREES as f64)?;
    Ok(phase.round() as u16)
}

/// `Jan  2 15:04:05`, local time.
fn timestamp() -> String {
    chrono::Local::now().format("%b %e %H:%M:%S").to_string()
}

impl Script {
    pub fn from_json(json: &str) -> core::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn load(path: impl AsRef<Path>) -> core::result::Result<Self, LoadError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let script = Self::from_json(&json)?;
        log::debug!("loaded {} commands from {}", script.cmds.len(), path.display());
        Ok(script)
    }

    /// The port to open: the script's own if it names one, otherwise `fallback`.
    pub fn resolve_port(&self, fallback: Option<&str>) -> Option<String> {
        self.port
            .as_deref()
            .filter(|port| !port.is_empty())
            .or(fallback)
            .map(str::to_string)
    }

    /// Run every command against `device`, writing progress and reports to `out`.
    pub fn play<S>(&self, device: &Mhs5200<S>, out: &mut impl io::Write) -> Result<(), S::Error>
    where
        S: embedded_io::Read + embedded_io::Write + Send + 'static,
    {
        for command in &self.cmds {
            log::debug!("script command {}", command.cmd);
            let name = command.cmd.as_str();
            let param_error = |e: ParamError| e.into_error::<S::Error>(name);
            match name {
                "config" => {
                    for data in &command.data {
                        let config = data.to_channel_config().map_err(param_error)?;
                        writeln!(out, "{}: Configuring channel {}", timestamp(), config.channel)?;
                        device.apply_channel_config(&config)?;
                    }
                }
                "showconfig" => {
                    if command.data.is_empty() {
                        write!(out, "{}", device.show_config()?)?;
                    }
                    for data in &command.data {
                        match data.channel {
                            Some(channel) => {
                                let channel = Channel::try_from(channel)?;
                                write!(out, "{}", device.show_channel_config(channel)?)?;
                            }
                            None => write!(out, "{}", device.show_config()?)?,
                        }
                    }
                }
                "delay" | "sleep" => {
                    if command.data.is_empty() {
                        thread::sleep(DEFAULT_DELAY);
                    }
                    for seconds in command.data.iter().filter_map(|data| data.seconds) {
                        writeln!(out, "{}: Sleeping {} seconds", timestamp(), seconds)?;
                        thread::sleep(Duration::from_secs(seconds as u64));
                    }
                }
                "on" => {
                    writeln!(out, "{}: Output on", timestamp())?;
                    device.set_on_off(true)?;
                }
                "off" => {
                    writeln!(out, "{}: Output off", timestamp())?;
                    device.set_on_off(false)?;
                }
                "save" => {
                    if command.data.is_empty() {
                        device.save(Slot::try_from(0u8)?)?;
                    }
                    for data in &command.data {
                        let slot = data.slot()?;
                        writeln!(out, "{}: Saving to slot {}", timestamp(), slot)?;
                        device.save(slot)?;
                    }
                }
                "load" => {
                    if command.data.is_empty() {
                        device.load(Slot::try_from(0u8)?)?;
                    }
                    for data in &command.data {
                        let slot = data.slot()?;
                        writeln!(out, "{}: Loading from slot {}", timestamp(), slot)?;
                        device.load(slot)?;
                    }
                }
                "showsweep" => write!(out, "{}", device.show_sweep_config()?)?,
                "configsweep" => {
                    for data in &command.data {
                        let sweep = data.to_sweep_config().map_err(param_error)?;
                        writeln!(out, "{}: Configuring sweep", timestamp())?;
                        device.set_sweep(&sweep)?;
                    }
                }
                "sweepon" => {
                    writeln!(out, "{}: Sweep on", timestamp())?;
                    device.set_sweep_state(true)?;
                }
                "sweepoff" => {
                    writeln!(out, "{}: Sweep off", timestamp())?;
                    device.set_sweep_state(false)?;
                }
                other => return Err(Error::UnknownCommand(other.to_string())),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, mock_serial::MockSerial};

    fn session() -> (Mhs5200<MockSerial>, MockSerial) {
        let mock = MockSerial::new();
        let config = Config::default()
            .with_response_timeout(Duration::from_millis(50))
            .with_arbitrary_settle(Duration::ZERO);
        (Mhs5200::new(mock.clone(), config).unwrap(), mock)
    }

    #[test]
    fn test_channel_params() {
        let params = CommandParams {
            channel: Some(2),
            frequency: Some(1000.0),
            waveform: Some("arb4".to_string()),
            phase: Some(89.6),
            attenuation: Some(true),
            ..Default::default()
        };
        let config = params.to_channel_config().unwrap();
        assert_eq!(config.channel, Channel::Two);
        assert_eq!(config.frequency, Some(1000.0));
        assert_eq!(config.waveform, Some(Waveform::Arbitrary(Slot::try_from(4u8).unwrap())));
        assert_eq!(config.phase, Some(90));
        assert_eq!(config.attenuation, Some(Attenuation::Minus20dB));
        assert_eq!(config.amplitude, None);
        assert_eq!(config.offset, None);
    }

    #[test]
    fn test_channel_params_errors() {
        let missing = CommandParams::default();
        assert_eq!(missing.to_channel_config(), Err(ParamError::Missing("channel")));

        let bad_channel = CommandParams {
            channel: Some(3),
            ..Default::default()
        };
        assert!(matches!(bad_channel.to_channel_config(), Err(ParamError::Invalid(_))));

        let bad_waveform = CommandParams {
            channel: Some(1),
            waveform: Some("noise".to_string()),
            ..Default::default()
        };
        assert!(matches!(bad_waveform.to_channel_config(), Err(ParamError::Invalid(_))));
    }

    #[test]
    fn test_sweep_params() {
        let params = CommandParams {
            startf: Some(10.0),
            endf: Some(100.0),
            seconds: Some(30),
            sweep_type: Some("log".to_string()),
            ..Default::default()
        };
        let sweep = params.to_sweep_config().unwrap();
        assert_eq!(sweep.start, Some(10.0));
        assert_eq!(sweep.end, Some(100.0));
        assert_eq!(sweep.duration, Some(SecsDurationU32::secs(30)));
        assert_eq!(sweep.sweep_type, Some(SweepType::Logarithmic));
        assert_eq!(sweep.waveform, None);
    }

    #[test]
    fn test_play_commands_in_order() {
        let (generator, mock) = session();
        let script = Script::from_json(
            r#"{"cmds": [
                {"cmd": "config", "data": [{"channel": 1, "frequency": 50, "attenuation": false}]},
                {"cmd": "on"},
                {"cmd": "sleep", "data": [{"seconds": 0}]},
                {"cmd": "save", "data": [{"slot": 3}]},
                {"cmd": "configsweep", "data": [{"startf": 1, "endf": 2, "type": "linear"}]},
                {"cmd": "sweepon"},
                {"cmd": "off"}
            ]}"#,
        )
        .unwrap();
        let mut out = Vec::new();
        script.play(&generator, &mut out).unwrap();
        assert_eq!(
            mock.lines(),
            vec![":s2b1", ":s1y1", ":s1f5000", ":s1b1", ":su03", ":s3f100", ":s4f200", ":s7b0", ":s8b1", ":s1b0"]
        );
        let out = String::from_utf8(out).unwrap();
        assert!(out.contains(": Configuring channel 1\n"));
        assert!(out.contains(": Sleeping 0 seconds\n"));
        assert!(out.contains(": Saving to slot 3\n"));
    }

    #[test]
    fn test_play_stops_at_unknown_command() {
        let (generator, mock) = session();
        let script = Script::from_json(r#"{"cmds": [{"cmd": "on"}, {"cmd": "explode"}, {"cmd": "off"}]}"#)
            .unwrap();
        let result = script.play(&generator, &mut io::sink());
        assert!(matches!(result, Err(Error::UnknownCommand(ref c)) if c == "explode"));
        assert_eq!(mock.lines(), vec![":s1b1"]);
    }

    #[test]
    fn test_play_reports_missing_channel() {
        let (generator, mock) = session();
        let script =
            Script::from_json(r#"{"cmds": [{"cmd": "config", "data": [{"frequency": 1}]}]}"#).unwrap();
        let result = script.play(&generator, &mut io::sink());
        assert!(matches!(
            result,
            Err(Error::MissingParameter { parameter: "channel", .. })
        ));
        assert!(mock.lines().is_empty());
    }

    #[test]
    fn test_show_sweep_and_channel() {
        let (generator, mock) = session();
        mock.store("1w", "1");
        let script = Script::from_json(
            r#"{"cmds": [{"cmd": "showsweep"}, {"cmd": "showconfig", "data": [{"channel": 2}]}]}"#,
        )
        .unwrap();
        let mut out = Vec::new();
        script.play(&generator, &mut out).unwrap();
        let out = String::from_utf8(out).unwrap();
        assert!(out.starts_with("Sweep config\n"));
        assert!(out.contains("\tWaveform:\tsquare\n"));
        assert!(out.contains("Channel 2 config\n"));
    }
}
