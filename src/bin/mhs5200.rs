//! Command line control of an MHS-5200A function generator.
//!
//! Commands are given as a sequence of words and run in order against the
//! currently selected channel (channel 1 unless changed):
//!
//! ```bash
//! mhs5200 --port /dev/ttyUSB0 channel 2 frequency 1000 waveform square duty 25 on
//! mhs5200 --script sweep.json showsweep
//! mhs5200 measure frequency sleep 5 measure stop
//! mhs5200 convert capture.txt > waveform.txt
//! ```
//!
//! A failing command is logged and the remaining ones still run. The exit
//! status is 10 if any command failed and 2 if the command line could not
//! be parsed.

use std::{path::PathBuf, process, time::Duration};

use clap::{ArgAction, Parser};
use env_logger::Env;
use fugit::SecsDurationU32;
use inquire::Select;
use thiserror::Error;

use mhs5200a::{
    config::{Config, ProtocolRevision},
    error::{Error, ValueError},
    mhs5200::{Mhs5200, Reporter},
    script::Script,
    transport::{self, IoError, SerialTransport},
    types::{Attenuation, Channel, MeasureCommand, Slot, State, SweepType, Waveform},
    waveform,
};

const EXIT_USAGE: i32 = 2;
const EXIT_FAILURE: i32 = 10;

#[derive(Parser, Debug)]
#[command(name = "mhs5200")]
#[command(version)]
#[command(about = "Control an MHS-5200A function generator over serial", long_about = None)]
struct Cli {
    /// Serial port, e.g. /dev/ttyUSB0. Prompted for when not given.
    #[arg(short, long)]
    port: Option<String>,

    /// JSON script to run before any commands.
    #[arg(short, long, value_name = "FILE")]
    script: Option<PathBuf>,

    /// Use the older command set (arbitrary waveforms at 10+N, no counter stop).
    #[arg(long)]
    legacy: bool,

    /// More logging, repeat for more detail.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Commands to run, e.g. `channel 2 frequency 1000 on`.
    #[arg(value_name = "COMMAND", trailing_var_arg = true, allow_hyphen_values = true)]
    commands: Vec<String>,
}

#[derive(Error, Debug, PartialEq)]
enum UsageError {
    #[error("unknown command {0:?}")]
    UnknownCommand(String),
    #[error("{0} needs a value")]
    MissingValue(&'static str),
    #[error("{command}: {value:?} is not a valid value")]
    InvalidValue { command: &'static str, value: String },
    #[error("{command}: {source}")]
    Value {
        command: &'static str,
        source: ValueError,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Action {
    Channel(Channel),
    Frequency(f64),
    Waveform(Waveform),
    Amplitude(f64),
    Duty(f64),
    Offset(f64),
    Phase(u16),
    Attenuation(Attenuation),
    SweepStart(f64),
    SweepEnd(f64),
    SweepDuration(u32),
    SweepType(SweepType),
    Output(State),
    Sweep(State),
    Save(Slot),
    Load(Slot),
    Sleep(Duration),
    ShowConfig,
    ShowAll,
    ShowSweep,
    Measure(MeasureCommand),
    ArbFile(Slot, PathBuf),
    Convert(PathBuf),
}

impl Action {
    /// Everything but file conversion talks to the instrument.
    fn needs_device(&self) -> bool {
        !matches!(self, Action::Convert(_) | Action::Sleep(_))
    }
}

fn parse_number<T: std::str::FromStr>(command: &'static str, value: &str) -> Result<T, UsageError> {
    value.parse().map_err(|_| UsageError::InvalidValue {
        command,
        value: value.to_string(),
    })
}

fn parse_slot(command: &'static str, value: &str) -> Result<Slot, UsageError> {
    let index: u8 = parse_number(command, value)?;
    Slot::try_from(index).map_err(|source| UsageError::Value { command, source })
}

/// Turn the command words into actions, before anything is sent.
fn parse_actions(words: &[String]) -> Result<Vec<Action>, UsageError> {
    let mut words = words.iter().map(String::as_str);
    let mut actions = Vec::new();
    while let Some(word) = words.next() {
        let mut value = |command: &'static str| words.next().ok_or(UsageError::MissingValue(command));
        let action = match word {
            "channel" => {
                let index: u8 = parse_number("channel", value("channel")?)?;
                Action::Channel(
                    Channel::try_from(index).map_err(|source| UsageError::Value {
                        command: "channel",
                        source,
                    })?,
                )
            }
            "frequency" => Action::Frequency(parse_number("frequency", value("frequency")?)?),
            "waveform" => {
                let name = value("waveform")?;
                Action::Waveform(name.parse().map_err(|source| UsageError::Value {
                    command: "waveform",
                    source,
                })?)
            }
            "amplitude" => Action::Amplitude(parse_number("amplitude", value("amplitude")?)?),
            "duty" => Action::Duty(parse_number("duty", value("duty")?)?),
            "offset" => Action::Offset(parse_number("offset", value("offset")?)?),
            "phase" => Action::Phase(parse_number("phase", value("phase")?)?),
            "attenuation" => match value("attenuation")? {
                "on" => Action::Attenuation(Attenuation::Minus20dB),
                "off" => Action::Attenuation(Attenuation::ZerodB),
                other => {
                    return Err(UsageError::InvalidValue {
                        command: "attenuation",
                        value: other.to_string(),
                    });
                }
            },
            "sweepstart" => Action::SweepStart(parse_number("sweepstart", value("sweepstart")?)?),
            "sweepend" => Action::SweepEnd(parse_number("sweepend", value("sweepend")?)?),
            "sweepduration" => {
                Action::SweepDuration(parse_number("sweepduration", value("sweepduration")?)?)
            }
            "sweeptype" => {
                let name = value("sweeptype")?;
                Action::SweepType(name.parse().map_err(|source| UsageError::Value {
                    command: "sweeptype",
                    source,
                })?)
            }
            "on" => Action::Output(State::On),
            "off" => Action::Output(State::Off),
            "sweepon" => Action::Sweep(State::On),
            "sweepoff" => Action::Sweep(State::Off),
            "save" => Action::Save(parse_slot("save", value("save")?)?),
            "load" => Action::Load(parse_slot("load", value("load")?)?),
            "sleep" | "delay" => {
                let raw = value("sleep")?;
                let seconds: f64 = parse_number("sleep", raw)?;
                let duration = Duration::try_from_secs_f64(seconds).map_err(|_| {
                    UsageError::InvalidValue {
                        command: "sleep",
                        value: raw.to_string(),
                    }
                })?;
                Action::Sleep(duration)
            }
            "showconfig" => Action::ShowConfig,
            "showall" => Action::ShowAll,
            "showsweep" => Action::ShowSweep,
            "measure" => {
                let name = value("measure")?;
                Action::Measure(name.parse().map_err(|source| UsageError::Value {
                    command: "measure",
                    source,
                })?)
            }
            "arbfile" => {
                let target = value("arbfile")?;
                let invalid = || UsageError::InvalidValue {
                    command: "arbfile",
                    value: target.to_string(),
                };
                let (slot, path) = target.split_once(':').ok_or_else(invalid)?;
                if path.is_empty() {
                    return Err(invalid());
                }
                Action::ArbFile(parse_slot("arbfile", slot)?, PathBuf::from(path))
            }
            "convert" => Action::Convert(PathBuf::from(value("convert")?)),
            other => return Err(UsageError::UnknownCommand(other.to_string())),
        };
        actions.push(action);
    }
    Ok(actions)
}

/// Run actions against a device, tracking the selected channel.
struct Runner<'a> {
    device: Option<&'a Mhs5200<SerialTransport>>,
    channel: Channel,
}

impl Runner<'_> {
    fn run(&mut self, action: &Action) -> Result<(), Error<IoError>> {
        log::debug!("running {:?}", action);
        let channel = self.channel;
        if let Action::Convert(path) = action {
            let text = std::fs::read_to_string(path)?;
            for sample in waveform::convert_samples(&text)? {
                println!("{}", sample);
            }
            return Ok(());
        }
        if let Action::Sleep(duration) = action {
            std::thread::sleep(*duration);
            return Ok(());
        }
        let Some(device) = self.device else {
            return Err(Error::UnknownCommand(format!("{:?} without a device", action)));
        };
        match action {
            Action::Channel(selected) => {
                device.select_channel(*selected)?;
                self.channel = *selected;
            }
            Action::Frequency(hz) => device.set_frequency(channel, *hz)?,
            Action::Waveform(waveform) => device.set_waveform(channel, *waveform)?,
            Action::Amplitude(volts) => device.set_amplitude(channel, *volts)?,
            Action::Duty(percent) => device.set_duty_cycle(channel, *percent)?,
            Action::Offset(volts) => device.set_offset(channel, *volts)?,
            Action::Phase(degrees) => device.set_phase(channel, *degrees)?,
            Action::Attenuation(attenuation) => device.set_attenuation(channel, *attenuation)?,
            Action::SweepStart(hz) => device.set_sweep_start(*hz)?,
            Action::SweepEnd(hz) => device.set_sweep_end(*hz)?,
            Action::SweepDuration(seconds) => {
                device.set_sweep_duration(SecsDurationU32::secs(*seconds))?
            }
            Action::SweepType(sweep_type) => device.set_sweep_type(*sweep_type)?,
            Action::Output(state) => device.set_on_off(*state)?,
            Action::Sweep(state) => device.set_sweep_state(*state)?,
            Action::Save(slot) => device.save(*slot)?,
            Action::Load(slot) => device.load(*slot)?,
            Action::ShowConfig => print!("{}", device.show_channel_config(channel)?),
            Action::ShowAll => print!("{}", device.show_config()?),
            Action::ShowSweep => print!("{}", device.show_sweep_config()?),
            Action::Measure(command) => device.measure(*command)?,
            Action::ArbFile(slot, path) => device.set_arbitrary_waveform_from_file(*slot, path)?,
            Action::Convert(_) | Action::Sleep(_) => {}
        }
        Ok(())
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

/// Ask which port to use when none was given.
fn prompt_port() -> Option<String> {
    let ports = match transport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            log::error!("Failed to list serial ports: {}", e);
            return None;
        }
    };
    if ports.is_empty() {
        log::error!("No serial ports found");
        return None;
    }
    match Select::new("Select serial port:", ports).prompt() {
        Ok(port) => Some(port),
        Err(e) => {
            log::error!("No port selected: {}", e);
            None
        }
    }
}

fn open(port: String, revision: ProtocolRevision) -> Option<Mhs5200<SerialTransport>> {
    let config = Config::new(port).with_revision(revision);
    let transport = match SerialTransport::open(&config) {
        Ok(transport) => transport,
        Err(e) => {
            log::error!("Failed to open {}: {}", config.port, e);
            return None;
        }
    };
    let reporter: Reporter = Box::new(|measurement| println!("{}", measurement));
    match Mhs5200::with_reporter(transport, config, reporter) {
        Ok(device) => Some(device),
        Err(e) => {
            log::error!("Failed to start session: {}", e);
            None
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let actions = match parse_actions(&cli.commands) {
        Ok(actions) => actions,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(EXIT_USAGE);
        }
    };

    let script = match cli.script.as_deref().map(|path| Script::load(path)).transpose() {
        Ok(script) => script,
        Err(e) => {
            log::error!("{}", e);
            process::exit(EXIT_FAILURE);
        }
    };

    let needs_device = script.is_some() || actions.iter().any(Action::needs_device);
    let revision = if cli.legacy {
        ProtocolRevision::Legacy
    } else {
        ProtocolRevision::Mhs5200A
    };
    let device = if needs_device {
        let port = match &script {
            Some(script) => script.resolve_port(cli.port.as_deref()),
            None => cli.port.clone(),
        };
        let Some(device) = port.or_else(prompt_port).and_then(|port| open(port, revision)) else {
            process::exit(EXIT_FAILURE);
        };
        Some(device)
    } else {
        None
    };

    let mut failed = false;
    if let (Some(script), Some(device)) = (&script, &device) {
        if let Err(e) = script.play(device, &mut std::io::stdout()) {
            log::error!("Script failed: {}", e);
            failed = true;
        }
    }

    let mut runner = Runner {
        device: device.as_ref(),
        channel: Channel::One,
    };
    for action in &actions {
        if let Err(e) = runner.run(action) {
            log::error!("{:?} failed: {}", action, e);
            failed = true;
        }
    }

    if let Some(device) = device {
        device.close();
    }
    if failed {
        process::exit(EXIT_FAILURE);
    }
}
