//! 2JCIE-BU serial frame codec.
//!
//! Frames are little-endian:
//!
//! ```text
//! 0x52 0x42 | length (u16) | command | address (u16) | data ... | CRC-16/MODBUS (u16)
//! ```
//!
//! `length` counts everything after itself, CRC included.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use sensorhub_framework::{FetchError, Fields};

pub const HEADER: [u8; 2] = [0x52, 0x42];

/// "Latest data long" memory address.
pub const LATEST_DATA_LONG: u16 = 0x5021;

pub const COMMAND_READ: u8 = 0x01;

/// Set on the command byte of an error response.
const ERROR_FLAG: u8 = 0x80;

/// Shortest valid "latest data long" response (through the seismic
/// intensity word, plus CRC).
pub const MIN_RESPONSE_LEN: usize = 37;

/// Upper bound on the length field; anything larger is line noise.
const MAX_PAYLOAD_LEN: usize = 256;

pub const TEMPERATURE: &str = "temperature";
pub const HUMIDITY: &str = "humidity";
pub const LIGHT: &str = "light";
pub const PRESSURE: &str = "pressure";
pub const NOISE: &str = "noise";
pub const ETVOC: &str = "etvoc";
pub const ECO2: &str = "eco2";
pub const DISCOMFORT: &str = "discomfort";
pub const HEAT: &str = "heat";
pub const SEISMIC: &str = "seismic";

/// CRC-16/MODBUS (poly 0xA001 reflected, init 0xFFFF).
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Wrap `command`, `address` and `data` in a complete frame.
pub fn encode(command: u8, address: u16, data: &[u8]) -> Vec<u8> {
    let length = (1 + 2 + data.len() + 2) as u16;
    let mut frame = Vec::with_capacity(4 + length as usize);
    frame.extend_from_slice(&HEADER);
    frame.extend_from_slice(&length.to_le_bytes());
    frame.push(command);
    frame.extend_from_slice(&address.to_le_bytes());
    frame.extend_from_slice(data);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Read request for the latest sensing data.
pub fn latest_data_request() -> Vec<u8> {
    encode(COMMAND_READ, LATEST_DATA_LONG, &[])
}

fn u16_at(frame: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([frame[offset], frame[offset + 1]])
}

fn i16_at(frame: &[u8], offset: usize) -> i16 {
    i16::from_le_bytes([frame[offset], frame[offset + 1]])
}

fn i32_at(frame: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        frame[offset],
        frame[offset + 1],
        frame[offset + 2],
        frame[offset + 3],
    ])
}

/// Validate a complete response frame and decode its readings.
pub fn decode_latest_data(frame: &[u8]) -> Result<Fields, FetchError> {
    if frame.len() < 9 || frame[..2] != HEADER {
        return Err(FetchError::Malformed("bad header".to_string()));
    }

    let length = u16_at(frame, 2) as usize;
    if length != frame.len() - 4 {
        return Err(FetchError::Malformed(format!(
            "length field {} does not match frame size {}",
            length,
            frame.len()
        )));
    }

    let body = frame.len() - 2;
    let expected = crc16(&frame[..body]);
    let actual = u16_at(frame, body);
    if expected != actual {
        return Err(FetchError::Malformed(format!(
            "CRC mismatch: expected {:#06x}, got {:#06x}",
            expected, actual
        )));
    }

    let command = frame[4];
    if command & ERROR_FLAG != 0 {
        return Err(FetchError::Read(format!(
            "sensor returned error code {:#04x}",
            frame[7]
        )));
    }
    if command != COMMAND_READ || u16_at(frame, 5) != LATEST_DATA_LONG {
        return Err(FetchError::Malformed(format!(
            "unexpected response {:#04x} @ {:#06x}",
            command,
            u16_at(frame, 5)
        )));
    }
    if frame.len() < MIN_RESPONSE_LEN {
        return Err(FetchError::Malformed(format!(
            "short response: {} bytes",
            frame.len()
        )));
    }

    // frame[7] is the sequence number
    Ok(Fields::new()
        .with(TEMPERATURE, i16_at(frame, 8) as f64 / 100.0)
        .with(HUMIDITY, u16_at(frame, 10) as f64 / 100.0)
        .with(LIGHT, u16_at(frame, 12) as f64)
        .with(PRESSURE, i32_at(frame, 14) as f64 / 1000.0)
        .with(NOISE, u16_at(frame, 18) as f64 / 100.0)
        .with(ETVOC, u16_at(frame, 20) as f64)
        .with(ECO2, u16_at(frame, 22) as f64)
        .with(DISCOMFORT, u16_at(frame, 24) as f64 / 100.0)
        .with(HEAT, i16_at(frame, 26) as f64 / 100.0)
        .with(SEISMIC, u16_at(frame, 33) as f64 / 1000.0))
}

/// Read one frame from `stream`.
pub async fn read_frame<S>(stream: &mut S) -> Result<Vec<u8>, FetchError>
where
    S: AsyncRead + Unpin,
{
    let mut frame = vec![0u8; 4];
    stream.read_exact(&mut frame).await?;
    if frame[..2] != HEADER {
        return Err(FetchError::Malformed(format!(
            "bad header {:02x} {:02x}",
            frame[0], frame[1]
        )));
    }

    let length = u16_at(&frame, 2) as usize;
    if !(5..=MAX_PAYLOAD_LEN).contains(&length) {
        return Err(FetchError::Malformed(format!("bad length {}", length)));
    }

    frame.resize(4 + length, 0);
    stream.read_exact(&mut frame[4..]).await?;
    Ok(frame)
}

/// Send the latest-data request and decode the reply.
pub async fn exchange<S>(stream: &mut S) -> Result<Fields, FetchError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(&latest_data_request()).await?;
    stream.flush().await?;
    let frame = read_frame(stream).await?;
    decode_latest_data(&frame)
}
