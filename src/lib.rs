//! This crate provides an interface for controlling the MHS-5200A series of
//! two channel function generators over their USB serial port.
//!
//! Example model numbers which this should work with:
//! * MHS-5200A
//! * MHS-5206A
//! * MHS-5212A
//! * MHS-5220A
//! * MHS-5225A
//!
//! The instrument speaks a line based ASCII protocol. Every command is a
//! `:` followed by an opcode, a register and a decimal value, terminated by a
//! newline. Set commands are answered with `ok`, read commands echo the
//! command header followed by the value.
//!
//! The serial port used for instrument comms should be configured like so:
//! * Baud rate: 57600
//! * Data bits: 8
//! * Stop bits: 1
//! * Parity: None
//!
//! [`transport::SerialTransport`] does this for you with the `serial` feature.
//! Any other [embedded_io] transport can be handed to [`mhs5200::Mhs5200`]
//! directly.
//!
//! ```no_run
//! use mhs5200a::{config::Config, mhs5200::Mhs5200, transport::SerialTransport, types::*};
//!
//! let config = Config::new("/dev/ttyUSB0");
//! let port = SerialTransport::open(&config).unwrap();
//! let generator = Mhs5200::new(port, config).unwrap();
//! generator.set_waveform(Channel::One, Waveform::Square).unwrap();
//! generator.set_frequency(Channel::One, 1000.0).unwrap();
//! generator.set_on_off(State::On).unwrap();
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod mhs5200;
pub mod register;
pub mod scaling;
pub mod script;
pub mod types;
pub mod waveform;

#[cfg(feature = "serial")]
pub mod transport;

#[cfg(test)]
mod mock_serial;
