//! Art-Net timecode (ArtTimeCode, opcode 0x9700) over UDP port 6454.
//!
//! The packet codec is pure; [`input`] wraps it in a timeout-polling receive
//! thread and [`output`] in a paced broadcast sender.

pub mod input;
pub mod output;

use crate::types::{FrameRate, Timecode};

pub use input::ArtnetInput;
pub use output::ArtnetOutput;

/// Art-Net well-known UDP port.
pub const ARTNET_PORT: u16 = 6454;

/// Socket-level failures surfaced by the UDP handlers.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("UDP socket error: {0}")]
    Bind(#[from] std::io::Error),
}

/// ArtTimeCode packets are exactly 19 bytes.
pub const PACKET_LEN: usize = 19;

const SIGNATURE: [u8; 8] = *b"Art-Net\0";
const OP_TIMECODE: u16 = 0x9700;
const PROTOCOL_VERSION: u16 = 14;

/// Why an incoming packet was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("packet shorter than 19 bytes")]
    TooShort,
    #[error("missing Art-Net signature")]
    BadSignature,
    #[error("not an ArtTimeCode opcode")]
    WrongOpcode,
    #[error("protocol version below 14")]
    OldProtocol,
    #[error("timecode fields out of range")]
    FieldRange,
}

/// A decoded ArtTimeCode payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimecodePacket {
    pub timecode: Timecode,
    pub fps: FrameRate,
    /// The reserved upper 6 bits of the type byte; zero on anything we send,
    /// tolerated (and surfaced for logging) on receive.
    pub reserved_bits: u8,
}

/// Build the 19-byte wire form.
pub fn encode(tc: Timecode, fps: FrameRate) -> [u8; PACKET_LEN] {
    let mut packet = [0u8; PACKET_LEN];
    packet[..8].copy_from_slice(&SIGNATURE);
    // Opcode is little-endian, protocol version big-endian; bytes 12..14
    // are filler.
    packet[8..10].copy_from_slice(&OP_TIMECODE.to_le_bytes());
    packet[10..12].copy_from_slice(&PROTOCOL_VERSION.to_be_bytes());
    packet[14] = tc.frames;
    packet[15] = tc.seconds;
    packet[16] = tc.minutes;
    packet[17] = tc.hours;
    packet[18] = fps.rate_code();
    packet
}

/// Validate and decode an incoming datagram.
pub fn decode(data: &[u8]) -> Result<TimecodePacket, PacketError> {
    if data.len() < PACKET_LEN {
        return Err(PacketError::TooShort);
    }
    if data[..8] != SIGNATURE {
        return Err(PacketError::BadSignature);
    }
    if u16::from_le_bytes([data[8], data[9]]) != OP_TIMECODE {
        return Err(PacketError::WrongOpcode);
    }
    if u16::from_be_bytes([data[10], data[11]]) < PROTOCOL_VERSION {
        return Err(PacketError::OldProtocol);
    }

    let timecode = Timecode {
        frames: data[14],
        seconds: data[15],
        minutes: data[16],
        hours: data[17],
    };
    if timecode.hours > 23 || timecode.minutes > 59 || timecode.seconds > 59 || timecode.frames > 29
    {
        return Err(PacketError::FieldRange);
    }

    Ok(TimecodePacket {
        timecode,
        fps: FrameRate::from_rate_code(data[18]),
        reserved_bits: data[18] >> 2,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_bytes_for_known_timecode() {
        // 10:20:30.07 at 25 fps, byte for byte.
        let packet = encode(Timecode::new(10, 20, 30, 7), FrameRate::Fps25);
        assert_eq!(&packet[..8], b"Art-Net\0");
        assert_eq!(packet[8..10], [0x00, 0x97]);
        assert_eq!(packet[10..12], [0x00, 0x0E]);
        assert_eq!(packet[12..14], [0x00, 0x00]);
        assert_eq!(packet[14..18], [0x07, 0x1E, 0x14, 0x0A]);
        assert_eq!(packet[18], 0x01);
    }

    #[test]
    fn decode_roundtrip() {
        for fps in [FrameRate::Fps24, FrameRate::Fps25, FrameRate::Fps2997, FrameRate::Fps30] {
            let tc = Timecode::new(23, 45, 6, 12);
            let decoded = decode(&encode(tc, fps)).unwrap();
            assert_eq!(decoded.timecode, tc);
            assert_eq!(decoded.fps, fps);
            assert_eq!(decoded.reserved_bits, 0);
        }
    }

    #[test]
    fn reserved_bits_are_tolerated() {
        let mut packet = encode(Timecode::new(1, 2, 3, 4), FrameRate::Fps30);
        packet[18] |= 0b1010_0000;
        let decoded = decode(&packet).unwrap();
        assert_eq!(decoded.fps, FrameRate::Fps30);
        assert_eq!(decoded.reserved_bits, 0b10_1000);
    }

    #[test]
    fn rejects_malformed_packets() {
        let good = encode(Timecode::new(1, 2, 3, 4), FrameRate::Fps25);

        assert_eq!(decode(&good[..18]), Err(PacketError::TooShort));

        let mut bad = good;
        bad[0] = b'X';
        assert_eq!(decode(&bad), Err(PacketError::BadSignature));

        let mut bad = good;
        bad[9] = 0x50;
        assert_eq!(decode(&bad), Err(PacketError::WrongOpcode));

        let mut bad = good;
        bad[11] = 0x0D;
        assert_eq!(decode(&bad), Err(PacketError::OldProtocol));

        let mut bad = good;
        bad[17] = 24; // hours
        assert_eq!(decode(&bad), Err(PacketError::FieldRange));
        let mut bad = good;
        bad[14] = 30; // frames
        assert_eq!(decode(&bad), Err(PacketError::FieldRange));
    }

    #[test]
    fn oversized_datagram_still_decodes() {
        let mut data = encode(Timecode::new(9, 8, 7, 6), FrameRate::Fps24).to_vec();
        data.extend_from_slice(&[0xFF; 13]);
        assert!(decode(&data).is_ok());
    }
}
