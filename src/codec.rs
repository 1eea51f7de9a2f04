//! Encoding of command lines and decoding of the instrument's responses.
//!
//! Commands look like `:s1f1000000` (set channel 1 frequency) or `:r1f`
//! (read it back). Set commands are acknowledged with `ok`, reads are answered
//! with a 4 byte echo of the request header followed by the decimal value,
//! e.g. `:r1f1000000`.
//!
//! Nothing in here checks whether a value makes sense for a register, that is
//! the job of [`crate::scaling`].

use core::fmt::Write;

use crate::{error::ProtocolError, register::Register, types::Slot};

/// Fits the largest command, an arbitrary waveform slice of 128 samples.
pub const COMMAND_CAPACITY: usize = 768;

pub type Command = heapless::String<COMMAND_CAPACITY>;

/// The literal acknowledgement of a successful set command.
pub const ACK: &str = "ok";

/// Length of the register echo preceding every read response.
pub const HEADER_LEN: usize = 4;

fn command(args: core::fmt::Arguments<'_>) -> Result<Command, ProtocolError> {
    let mut cmd = Command::new();
    cmd.write_fmt(args)
        .map_err(|_| ProtocolError::CommandTooLong)?;
    Ok(cmd)
}

/// `:s<register><value>`. Save and load slots are always two digits.
pub fn encode_set(register: Register, value: u32) -> Result<Command, ProtocolError> {
    if register.index.is_none() {
        command(format_args!(":s{}{:02}", register, value))
    } else {
        command(format_args!(":s{}{}", register, value))
    }
}

/// `:s<register>` with no payload, used to select the counter mode.
pub fn encode_trigger(register: Register) -> Result<Command, ProtocolError> {
    command(format_args!(":s{}", register))
}

/// `:r<register>`.
pub fn encode_get(register: Register) -> Result<Command, ProtocolError> {
    command(format_args!(":r{}", register))
}

/// `:a<slot><slice><v0>,<v1>,...` with slot and slice as single hex digits.
pub fn encode_arbitrary_slice(
    slot: Slot,
    slice: usize,
    samples: &[u16],
) -> Result<Command, ProtocolError> {
    let mut cmd = command(format_args!(":a{:x}{:x}", slot.index(), slice))?;
    for (i, sample) in samples.iter().enumerate() {
        if i > 0 {
            cmd.push(',').map_err(|_| ProtocolError::CommandTooLong)?;
        }
        write!(cmd, "{}", sample).map_err(|_| ProtocolError::CommandTooLong)?;
    }
    Ok(cmd)
}

/// Strip trailing spaces, carriage returns and newlines.
pub fn trim_response(response: &[u8]) -> &[u8] {
    let end = response
        .iter()
        .rposition(|b| !matches!(b, b' ' | b'\r' | b'\n'))
        .map_or(0, |i| i + 1);
    &response[..end]
}

pub fn decode_ack(response: &str) -> Result<(), ProtocolError> {
    if response == ACK {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedResponse {
            expected: ACK.to_string(),
            got: response.to_string(),
        })
    }
}

/// Whether `response` can be the answer to `command`.
///
/// Reads are answered with an echo of their header. Everything else gets a
/// plain acknowledgement, which never looks like a read response.
pub fn is_response_to(command: &str, response: &str) -> bool {
    if command.starts_with(":r") {
        let header = command.get(..HEADER_LEN).unwrap_or(command);
        response.starts_with(header)
    } else {
        !response.is_empty() && !response.starts_with(":r")
    }
}

/// The part of a read response following the register echo.
pub fn decode_payload(response: &str) -> Result<&str, ProtocolError> {
    if response.len() < HEADER_LEN {
        return Err(ProtocolError::ResponseTooShort {
            expected: HEADER_LEN,
            got: response.len(),
        });
    }
    // Long enough, but the header ends inside a replaced invalid byte.
    response
        .get(HEADER_LEN..)
        .ok_or_else(|| ProtocolError::InvalidNumber(response.to_string()))
}

pub fn decode_value(response: &str) -> Result<u32, ProtocolError> {
    let payload = decode_payload(response)?;
    payload
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber(payload.to_string()))
}

/// Take `len` bytes of the response starting at `start`.
fn field(response: &str, start: usize, len: usize) -> Result<&str, ProtocolError> {
    if response.len() < start + len {
        return Err(ProtocolError::ResponseTooShort {
            expected: start + len,
            got: response.len(),
        });
    }
    response
        .get(start..start + len)
        .ok_or_else(|| ProtocolError::InvalidNumber(response.to_string()))
}

/// Model name from the `0c` identity register, e.g. `MHS-5225A`.
pub fn decode_model(response: &str) -> Result<String, ProtocolError> {
    let model = field(response, HEADER_LEN, 5)?;
    Ok(format!("MHS-{}", model))
}

/// Firmware version from the `1c` identity register, `120` -> `1.2`.
pub fn decode_firmware_version(response: &str) -> Result<f64, ProtocolError> {
    let version = field(response, 9, 3)?;
    let version: u32 = version
        .parse()
        .map_err(|_| ProtocolError::InvalidNumber(version.to_string()))?;
    Ok(version as f64 / 100.0)
}

/// Serial number from the `2c` identity register.
pub fn decode_serial(response: &str) -> Result<String, ProtocolError> {
    field(response, 12, 4).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{register::Field, types::Channel};

    #[test]
    fn test_set_commands() {
        let frequency = Register::channel(Channel::One, Field::Frequency);
        assert_eq!(encode_set(frequency, 1_000_000).unwrap(), ":s1f1000000");
        assert_eq!(encode_set(Register::SWEEP_STATE, 1).unwrap(), ":s8b1");
        assert_eq!(encode_set(Register::SAVE, 5).unwrap(), ":su05");
        assert_eq!(encode_set(Register::LOAD, 12).unwrap(), ":sv12");
        assert_eq!(encode_trigger(Register::new(2, Field::Measure)).unwrap(), ":s2m");
    }

    #[test]
    fn test_get_commands() {
        let offset = Register::channel(Channel::Two, Field::Offset);
        assert_eq!(encode_get(offset).unwrap(), ":r2o");
        assert_eq!(encode_get(Register::COUNTER).unwrap(), ":r0e");
    }

    #[test]
    fn test_arbitrary_slice() {
        let samples = [0u16; 128];
        let slot = Slot::try_from(10u8).unwrap();
        let cmd = encode_arbitrary_slice(slot, 15, &samples).unwrap();
        assert!(cmd.starts_with(":aaf0,0,"));
        assert_eq!(cmd.split(',').count(), 128);

        // Worst case still fits.
        let samples = [4095u16; 128];
        assert!(encode_arbitrary_slice(slot, 15, &samples).is_ok());
    }

    #[test]
    fn test_trims_line_endings() {
        assert_eq!(trim_response(b"ok\r\n"), b"ok");
        assert_eq!(trim_response(b":r1f100 \n"), b":r1f100");
        assert_eq!(trim_response(b"\r\n"), b"");
    }

    #[test]
    fn test_acknowledgement() {
        assert!(decode_ack("ok").is_ok());
        assert_eq!(
            decode_ack("err"),
            Err(ProtocolError::UnexpectedResponse {
                expected: "ok".to_string(),
                got: "err".to_string()
            })
        );
    }

    #[test]
    fn test_values() {
        assert_eq!(decode_value(":r1f1000000"), Ok(1_000_000));
        assert_eq!(decode_value(":r1y0"), Ok(0));
        assert_eq!(
            decode_value(":r1"),
            Err(ProtocolError::ResponseTooShort {
                expected: 4,
                got: 3
            })
        );
        assert!(matches!(decode_value(":r1f"), Err(ProtocolError::InvalidNumber(_))));
        assert!(matches!(decode_value(":r1fabc"), Err(ProtocolError::InvalidNumber(_))));
    }

    #[test]
    fn test_header_split_by_replacement_character() {
        // The 4th header byte falls inside the 3 byte U+FFFD.
        let response = String::from_utf8_lossy(b"ab\xff12").into_owned();
        assert_eq!(response.len(), 7);
        assert_eq!(
            decode_payload(&response),
            Err(ProtocolError::InvalidNumber(response.clone()))
        );
        assert!(matches!(decode_value(&response), Err(ProtocolError::InvalidNumber(_))));
        assert!(matches!(decode_serial(&response), Err(ProtocolError::ResponseTooShort { .. })));
        assert!(matches!(
            decode_firmware_version("ab\u{FFFD}\u{FFFD}\u{FFFD}00"),
            Err(ProtocolError::InvalidNumber(_))
        ));
    }

    #[test]
    fn test_matching_responses_to_commands() {
        assert!(is_response_to(":r1f", ":r1f1000000"));
        assert!(!is_response_to(":r1f", "ok"));
        assert!(!is_response_to(":r1f", ":r2f100"));
        assert!(is_response_to(":s1b1", "ok"));
        assert!(is_response_to(":s1b1", "err"));
        assert!(!is_response_to(":s1b1", ":r1f1000000"));
        assert!(!is_response_to(":s1b1", ""));
        assert!(is_response_to(":a20", "ok"));
    }

    #[test]
    fn test_identity() {
        assert_eq!(decode_model(":r0c5225A0000").unwrap(), "MHS-5225A");
        assert_eq!(decode_firmware_version(":r1c00000120").unwrap(), 1.2);
        assert_eq!(decode_serial(":r2c000000001234").unwrap(), "1234");
        assert!(decode_model(":r0c52").is_err());
        assert!(decode_serial(":r2c").is_err());
    }
}
