//! Fixed length ISO15765 frame layout: 4 address bytes, a length byte, payload and zero padding up to 12 bytes.
use tracing::{debug, warn};

use crate::passthru::ProtocolId;
use crate::reconstruct::error::Error;

pub const FRAME_LENGTH: usize = 12;
pub const ADDRESS_LENGTH: usize = 4;
const PADDING: u8 = 0x00;

/// Payload bytes carried by a single frame
const SINGLE_FRAME_DATA: usize = FRAME_LENGTH - ADDRESS_LENGTH - 1;
const FIRST_FRAME_DATA: usize = SINGLE_FRAME_DATA - 1;
const CONSECUTIVE_FRAME_DATA: usize = SINGLE_FRAME_DATA;

/// ISO15765 payloads starting with a zero padded 11 bit address (`00 00 0X XX`) are framed. Raw CAN frames
/// already are physical frames and stay as logged.
pub fn needs_framing(protocol: ProtocolId, data: &[u8]) -> bool {
    protocol == ProtocolId::ISO15765 && data.len() > ADDRESS_LENGTH && data[0] == 0x00 && data[1] == 0x00
}

/// Number of physical frames a logical payload of `len` bytes is sent as.
pub fn physical_frame_count(len: usize) -> usize {
    match len <= SINGLE_FRAME_DATA {
        true => 1,
        false => 1 + (len - FIRST_FRAME_DATA).div_ceil(CONSECUTIVE_FRAME_DATA),
    }
}

fn pad(buf: &mut Vec<u8>) {
    let len = FRAME_LENGTH.saturating_sub(buf.len());
    buf.extend(std::iter::repeat(PADDING).take(len));
}

/// Builds the first physical frame of an addressed payload. The address is kept, the rest is treated as the
/// logical payload and prefixed with its length. Only the first frame is produced, later frames of a long payload
/// are logged as separate messages of their own.
pub fn frame(data: &[u8]) -> Result<Vec<u8>, Error> {
    let (address, payload) = data.split_at(ADDRESS_LENGTH.min(data.len()));
    if payload.len() > u8::MAX as usize {
        return Err(Error::PayloadTooLong(payload.len()));
    }

    let frames = physical_frame_count(payload.len());
    if frames > 2 {
        warn!(
            "Payload {} spans {} physical frames, only the first is reconstructed",
            hex::encode(data),
            frames
        );
    }

    let mut buf = address.to_vec();
    buf.push(payload.len() as u8);
    buf.extend(payload);
    pad(&mut buf);
    buf.truncate(FRAME_LENGTH);

    debug!("Framed {} as {}", hex::encode(data), hex::encode(&buf));
    Ok(buf)
}

/// Reverses [`frame`] for payloads that fit a single frame. Anything else is returned unchanged.
pub fn unframe(data: &[u8]) -> Vec<u8> {
    if data.len() != FRAME_LENGTH {
        return data.to_vec();
    }

    let len = data[ADDRESS_LENGTH] as usize;
    let start = ADDRESS_LENGTH + 1;
    if len == 0 || len > SINGLE_FRAME_DATA || data[start + len..].iter().any(|b| *b != PADDING) {
        return data.to_vec();
    }

    let mut buf = data[..ADDRESS_LENGTH].to_vec();
    buf.extend(&data[start..start + len]);
    buf
}
