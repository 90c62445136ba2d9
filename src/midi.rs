//! Decodes USB-MIDI transfer chunks into note events.
//!
//! Every USB-MIDI packet is exactly 4 bytes: a header byte (cable number in
//! the high nibble, Code Index Number in the low nibble) followed by up to
//! three MIDI bytes. Framing is self-delimiting, so decoding is stateless.

use std::fmt;

use thiserror::Error;

/// Size of one USB-MIDI event packet.
pub const PACKET_SIZE: usize = 4;

/// Header of a single-byte/realtime packet on cable 0. Filtered out.
const HEADER_REALTIME: u8 = 0x0F;

/// Header of a Note-On packet on cable 0.
const HEADER_NOTE_ON: u8 = 0x09;

/// Note On, channel 0.
const STATUS_NOTE_ON: u8 = 0x90;

pub const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Octave-independent note name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PitchClass(u8);

impl PitchClass {
    #[must_use]
    pub const fn from_note_number(note_number: u8) -> Self {
        Self(note_number % 12)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        PITCH_NAMES[self.0 as usize]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodedEvent {
    NoteOn { pitch_class: PitchClass, velocity: u8 },
    /// Note-On status with velocity 0.
    NoteOff { pitch_class: PitchClass },
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoteOn {
                pitch_class,
                velocity,
            } => write!(f, "NoteOn {pitch_class} with {velocity}/127 velocity"),
            Self::NoteOff { pitch_class } => write!(f, "NoteOff {pitch_class}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("data length is not a multiple of 4: {length}")]
    Misframed { length: usize },

    #[error("unknown first byte {byte0:#04x} ({byte0:08b})")]
    UnknownFrameType { byte0: u8 },

    #[error("unknown status byte {byte1:#04x} ({byte1:08b})")]
    UnknownStatus { byte1: u8 },
}

/// Decodes one transfer chunk.
///
/// Packets are visited in offset order and the events are returned in the
/// same order. Reads shorter than a packet carry nothing and yield no events.
/// The first unsupported packet fails the whole chunk.
pub fn decode(chunk: &[u8]) -> Result<Vec<DecodedEvent>, DecodeError> {
    if chunk.len() < PACKET_SIZE {
        return Ok(Vec::new());
    }
    if chunk.len() % PACKET_SIZE != 0 {
        return Err(DecodeError::Misframed {
            length: chunk.len(),
        });
    }
    let mut events = Vec::with_capacity(chunk.len() / PACKET_SIZE);
    for packet in chunk.chunks_exact(PACKET_SIZE) {
        if let Some(event) = decode_packet([packet[0], packet[1], packet[2], packet[3]])? {
            events.push(event);
        }
    }
    Ok(events)
}

/// Returns `true` if every packet of the chunk is realtime filler.
#[must_use]
pub fn is_realtime_only(chunk: &[u8]) -> bool {
    chunk
        .chunks(PACKET_SIZE)
        .all(|packet| packet[0] == HEADER_REALTIME)
}

fn decode_packet(packet: [u8; PACKET_SIZE]) -> Result<Option<DecodedEvent>, DecodeError> {
    let [header, status, note_number, velocity] = packet;
    match header {
        HEADER_REALTIME => {
            log::trace!("Skipping realtime packet {packet:02x?}");
            Ok(None)
        }
        HEADER_NOTE_ON => {
            if status != STATUS_NOTE_ON {
                return Err(DecodeError::UnknownStatus { byte1: status });
            }
            let pitch_class = PitchClass::from_note_number(note_number);
            let event = if velocity == 0 {
                DecodedEvent::NoteOff { pitch_class }
            } else {
                DecodedEvent::NoteOn {
                    pitch_class,
                    velocity,
                }
            };
            Ok(Some(event))
        }
        byte0 => Err(DecodeError::UnknownFrameType { byte0 }),
    }
}
