//! We use this mocking module in unit tests to emulate the instrument on the
//! other end of a serial port.
//!
//! Set commands are stored in a register map and acknowledged with `ok`, read
//! commands are answered with the header echo and the stored value (`0` if
//! nothing was stored). Clones share the same state so a test can keep a
//! handle after moving the port into a session.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use thiserror::Error;

/// Our mock type used to emulate a serial port.
#[derive(Clone, Default)]
pub struct MockSerial {
    state: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    /// Stored register values, keyed by register address e.g. `1f`.
    registers: HashMap<String, String>,
    /// Bytes of a command line not yet terminated.
    pending: Vec<u8>,
    /// Response bytes waiting to be read.
    read_buffer: VecDeque<u8>,
    /// Every complete command line received.
    lines: Vec<String>,
    /// Don't answer at all.
    silent: bool,
    /// Hold back the next reply until another command is written.
    hold_next_reply: bool,
    held: Vec<u8>,
    /// Answer without the terminating line end.
    unterminated: bool,
    /// Answer every set command with this instead of `ok`.
    reply_override: Option<String>,
    /// Answer set commands with `err` once this many have been acknowledged.
    reject_after: Option<usize>,
    acknowledged: usize,
    /// Flag to simulate write errors
    should_error_on_write: bool,
    /// Flag to simulate read errors
    should_error_on_read: bool,
}

#[derive(Error, Debug)]
pub enum MockSerialError {
    /// Nothing to read, like a serial port read timing out.
    #[error("Mock read timed out")]
    Timeout,
    /// Generic simulated error for testing
    #[error("Simulated serial error")]
    SimulatedError,
}

impl embedded_io::Error for MockSerialError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            MockSerialError::Timeout => embedded_io::ErrorKind::TimedOut,
            MockSerialError::SimulatedError => embedded_io::ErrorKind::Other,
        }
    }
}

impl embedded_io::ErrorType for MockSerial {
    type Error = MockSerialError;
}

impl embedded_io::Write for MockSerial {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut state = self.state();
        if state.should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        let held = core::mem::take(&mut state.held);
        state.read_buffer.extend(held);
        for &byte in buf {
            if byte == b'\n' {
                let line = String::from_utf8_lossy(&state.pending).into_owned();
                state.pending.clear();
                state.respond(line);
            } else {
                state.pending.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        if self.state().should_error_on_write {
            return Err(MockSerialError::SimulatedError);
        }
        Ok(())
    }
}

impl embedded_io::Read for MockSerial {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let mut state = self.state();
        if state.should_error_on_read {
            return Err(MockSerialError::SimulatedError);
        }
        if state.read_buffer.is_empty() {
            return Err(MockSerialError::Timeout);
        }
        let count = buf.len().min(state.read_buffer.len());
        for (slot, byte) in buf.iter_mut().zip(state.read_buffer.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

impl MockState {
    fn respond(&mut self, line: String) {
        self.lines.push(line.clone());
        if self.silent {
            return;
        }
        let reply = if let Some(rest) = line.strip_prefix(":s") {
            let (key, value) = split_register(rest);
            self.registers.insert(key.to_string(), value.to_string());
            self.ack()
        } else if let Some(rest) = line.strip_prefix(":a") {
            let key = format!("a{}", &rest[..rest.len().min(2)]);
            self.registers.insert(key, rest[rest.len().min(2)..].to_string());
            self.ack()
        } else if let Some(key) = line.strip_prefix(":r") {
            let value = self.registers.get(key).map_or("0", String::as_str);
            format!(":r{}{}", key, value)
        } else {
            "?".to_string()
        };
        let mut reply = reply.into_bytes();
        if !self.unterminated {
            reply.extend_from_slice(b"\r\n");
        }
        if self.hold_next_reply {
            self.hold_next_reply = false;
            self.held.extend(reply);
        } else {
            self.read_buffer.extend(reply);
        }
    }

    fn ack(&mut self) -> String {
        if self.reject_after.is_some_and(|limit| self.acknowledged >= limit) {
            return "err".to_string();
        }
        self.acknowledged += 1;
        self.reply_override
            .clone()
            .unwrap_or_else(|| "ok".to_string())
    }
}

/// `1f1000` -> (`1f`, `1000`), `u05` -> (`u`, `05`).
fn split_register(rest: &str) -> (&str, &str) {
    let key_len = match rest.chars().next() {
        Some(c) if c.is_ascii_digit() => 2,
        _ => 1,
    };
    let key_len = key_len.min(rest.len());
    rest.split_at(key_len)
}

impl MockSerial {
    /// Create a new MockSerial instance with an empty register map
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Preload a register value, e.g. `store("1y", "1")`.
    pub fn store(&self, register: &str, value: &str) {
        self.state()
            .registers
            .insert(register.to_string(), value.to_string());
    }

    /// The value last stored in a register.
    pub fn stored(&self, register: &str) -> Option<String> {
        self.state().registers.get(register).cloned()
    }

    /// All command lines received so far, without their newline.
    pub fn lines(&self) -> Vec<String> {
        self.state().lines.clone()
    }

    /// Clear the record of received lines.
    pub fn clear_lines(&self) {
        self.state().lines.clear();
    }

    /// Stop answering commands.
    pub fn set_silent(&self, silent: bool) {
        self.state().silent = silent;
    }

    /// Deliver the next reply only once the following command is written,
    /// as if it arrived late.
    pub fn hold_next_reply(&self) {
        self.state().hold_next_reply = true;
    }

    /// Leave the line end off every reply.
    pub fn set_unterminated(&self, unterminated: bool) {
        self.state().unterminated = unterminated;
    }

    /// Put bytes on the wire as if the instrument had sent them unprompted.
    pub fn inject(&self, bytes: &[u8]) {
        self.state().read_buffer.extend(bytes);
    }

    /// Answer set commands with `reply` instead of `ok`.
    pub fn set_reply_override(&self, reply: Option<&str>) {
        self.state().reply_override = reply.map(str::to_string);
    }

    /// Start rejecting set commands once `count` more have been acknowledged.
    pub fn reject_after(&self, count: usize) {
        let mut state = self.state();
        state.reject_after = Some(state.acknowledged + count);
    }

    /// Configure whether write operations should fail with an error
    pub fn set_write_error(&self, should_error: bool) {
        self.state().should_error_on_write = should_error;
    }

    /// Configure whether read operations should fail with an error
    pub fn set_read_error(&self, should_error: bool) {
        self.state().should_error_on_read = should_error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_io::{Error, Read, Write};

    fn read_all(mock: &mut MockSerial) -> String {
        let mut buffer = [0u8; 64];
        let mut response = Vec::new();
        while let Ok(count) = mock.read(&mut buffer) {
            response.extend_from_slice(&buffer[..count]);
        }
        String::from_utf8(response).unwrap()
    }

    #[test]
    fn test_set_then_read() {
        let mut mock = MockSerial::new();
        mock.write_all(b":s1f1000000\n").unwrap();
        assert_eq!(read_all(&mut mock), "ok\r\n");
        mock.write_all(b":r1f\n").unwrap();
        assert_eq!(read_all(&mut mock), ":r1f1000000\r\n");
        assert_eq!(mock.lines(), vec![":s1f1000000", ":r1f"]);
    }

    #[test]
    fn test_command_split_across_writes() {
        let mut mock = MockSerial::new();
        mock.write_all(b":s2").unwrap();
        assert!(mock.read(&mut [0u8; 8]).is_err());
        mock.write_all(b"y0\n").unwrap();
        assert_eq!(read_all(&mut mock), "ok\r\n");
        assert_eq!(mock.stored("2y").as_deref(), Some("0"));
    }

    #[test]
    fn test_global_and_trigger_registers() {
        assert_eq!(split_register("u05"), ("u", "05"));
        assert_eq!(split_register("0m"), ("0m", ""));
        assert_eq!(split_register("8b1"), ("8b", "1"));
    }

    #[test]
    fn test_unset_register_reads_zero() {
        let mut mock = MockSerial::new();
        mock.write_all(b":r2p\n").unwrap();
        assert_eq!(read_all(&mut mock), ":r2p0\r\n");
    }

    #[test]
    fn test_silent() {
        let mut mock = MockSerial::new();
        mock.set_silent(true);
        mock.write_all(b":s1b1\n").unwrap();
        let err = mock.read(&mut [0u8; 8]).unwrap_err();
        assert!(matches!(err.kind(), embedded_io::ErrorKind::TimedOut));
    }

    #[test]
    fn test_held_reply_arrives_with_next_command() {
        let mut mock = MockSerial::new();
        mock.hold_next_reply();
        mock.write_all(b":s1b1\n").unwrap();
        assert!(mock.read(&mut [0u8; 8]).is_err());
        mock.write_all(b":r1b\n").unwrap();
        assert_eq!(read_all(&mut mock), "ok\r\n:r1b1\r\n");
    }

    #[test]
    fn test_unterminated() {
        let mut mock = MockSerial::new();
        mock.set_unterminated(true);
        mock.write_all(b":s1b1\n").unwrap();
        assert_eq!(read_all(&mut mock), "ok");
    }

    #[test]
    fn test_reject_after() {
        let mut mock = MockSerial::new();
        mock.reject_after(1);
        mock.write_all(b":s1b1\n").unwrap();
        assert_eq!(read_all(&mut mock), "ok\r\n");
        mock.write_all(b":s1b0\n").unwrap();
        assert_eq!(read_all(&mut mock), "err\r\n");
    }

    #[test]
    fn test_error_flags_toggle() {
        let mut mock = MockSerial::new();

        mock.set_write_error(true);
        assert!(mock.write(b"test").is_err());
        mock.set_write_error(false);
        assert!(mock.write(b":s1b1\n").is_ok());

        mock.set_read_error(true);
        assert!(matches!(
            mock.read(&mut [0u8; 8]),
            Err(MockSerialError::SimulatedError)
        ));
        mock.set_read_error(false);
        assert_eq!(read_all(&mut mock), "ok\r\n");
    }
}
