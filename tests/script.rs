//! Drives the public API through a scripted session against a fake instrument.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use mhs5200a::{
    config::Config,
    error::Error,
    mhs5200::Mhs5200,
    script::Script,
    types::{Channel, State},
};

#[derive(thiserror::Error, Debug)]
#[error("Nothing to read")]
struct Timeout;

impl embedded_io::Error for Timeout {
    fn kind(&self) -> embedded_io::ErrorKind {
        embedded_io::ErrorKind::TimedOut
    }
}

/// Acknowledges every set command and answers every read with zero.
#[derive(Clone, Default)]
struct FakeInstrument {
    lines: Arc<Mutex<Vec<String>>>,
    pending: Vec<u8>,
    replies: VecDeque<u8>,
}

impl embedded_io::ErrorType for FakeInstrument {
    type Error = Timeout;
}

impl embedded_io::Write for FakeInstrument {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        for &byte in buf {
            if byte != b'\n' {
                self.pending.push(byte);
                continue;
            }
            let line = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            let reply = match line.strip_prefix(":r") {
                Some(register) => format!(":r{}0\r\n", register),
                None => "ok\r\n".to_string(),
            };
            self.replies.extend(reply.bytes());
            self.lines.lock().unwrap().push(line);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

impl embedded_io::Read for FakeInstrument {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if self.replies.is_empty() {
            return Err(Timeout);
        }
        let count = buf.len().min(self.replies.len());
        for (slot, byte) in buf.iter_mut().zip(self.replies.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }
}

fn session() -> (Mhs5200<FakeInstrument>, Arc<Mutex<Vec<String>>>) {
    let instrument = FakeInstrument::default();
    let lines = Arc::clone(&instrument.lines);
    let config = Config::new("fake").with_response_timeout(Duration::from_millis(100));
    (Mhs5200::new(instrument, config).unwrap(), lines)
}

const SCRIPT: &str = r#"{
    "port": "/dev/ttyUSB3",
    "cmds": [
        {"cmd": "config", "data": [
            {"channel": 2, "frequency": 440, "waveform": "triangle", "attenuation": false}
        ]},
        {"cmd": "configsweep", "data": [{"startf": 10, "endf": 20, "seconds": 5, "type": "linear"}]},
        {"cmd": "save", "data": [{"slot": 7}]},
        {"cmd": "on"},
        {"cmd": "showsweep"}
    ]
}"#;

#[test]
fn test_script_runs_against_instrument() {
    let script = Script::from_json(SCRIPT).unwrap();
    assert_eq!(script.cmds.len(), 5);
    assert_eq!(
        script.resolve_port(Some("/dev/ttyUSB0")).as_deref(),
        Some("/dev/ttyUSB3")
    );

    let (generator, lines) = session();
    let mut out = Vec::new();
    script.play(&generator, &mut out).unwrap();

    let lines = lines.lock().unwrap().clone();
    assert_eq!(lines[0], ":s2b2");
    assert!(lines.contains(&":s2y1".to_string()));
    assert!(lines.contains(&":s2f44000".to_string()));
    assert!(lines.contains(&":s2w2".to_string()));
    assert!(lines.contains(&":s3f1000".to_string()));
    assert!(lines.contains(&":s4f2000".to_string()));
    assert!(lines.contains(&":s1t5".to_string()));
    assert!(lines.contains(&":su07".to_string()));
    assert!(lines.contains(&":s1b1".to_string()));

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("Configuring channel 2"));
    assert!(out.contains("Saving to slot 7"));
    assert!(out.contains("Output on"));
}

#[test]
fn test_unknown_script_command_stops_playback() {
    let script = Script::from_json(r#"{"cmds": [{"cmd": "on"}, {"cmd": "explode"}, {"cmd": "off"}]}"#)
        .unwrap();
    assert_eq!(script.resolve_port(Some("/dev/ttyS0")).as_deref(), Some("/dev/ttyS0"));

    let (generator, lines) = session();
    let result = script.play(&generator, &mut Vec::new());
    assert!(matches!(result, Err(Error::UnknownCommand(ref cmd)) if cmd == "explode"));
    assert_eq!(lines.lock().unwrap().clone(), vec![":s1b1"]);
}

#[test]
fn test_direct_control() {
    let (generator, lines) = session();
    generator.set_on_off(State::On).unwrap();
    generator.set_frequency(Channel::One, 1000.0).unwrap();
    assert_eq!(generator.get_frequency(Channel::One).unwrap(), 0.0);
    assert!(generator.close().is_some());
    assert_eq!(
        lines.lock().unwrap().clone(),
        vec![":s1b1", ":s1f100000", ":r1f"]
    );
}
