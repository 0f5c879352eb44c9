//! AER record parsing and address codec.
//!
//! Wire record (8 bytes, little-endian):
//!   [0..4]  address: u32
//!   [4..8]  timestamp: u32
//!
//! Address layout (after `address_shift`):
//!   bit  0      polarity (1 = ON)
//!   bits 7:1    x
//!   bits 14:8   y
//!   bit  15     camera (1 = LEFT)

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const RECORD_BYTES: usize = 8;

const POLARITY_MASK: u32 = 0x0000_0001;
const X_MASK: u32 = 0x0000_00FE;
const X_SHIFT: u32 = 1;
const Y_MASK: u32 = 0x0000_7F00;
const Y_SHIFT: u32 = 8;
const CAMERA_SHIFT: u32 = 15;
const CAMERA_MASK: u32 = 1 << CAMERA_SHIFT;
const COORD_MASK: u16 = 0x7F;

/// One raw (address, timestamp) record as delivered by the sensor transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AerWord {
    pub address: u32,
    pub timestamp: u32,
}

impl AerWord {
    pub const fn new(address: u32, timestamp: u32) -> Self {
        Self { address, timestamp }
    }

    pub fn to_le_bytes(self) -> [u8; RECORD_BYTES] {
        let mut out = [0u8; RECORD_BYTES];
        out[..4].copy_from_slice(&self.address.to_le_bytes());
        out[4..].copy_from_slice(&self.timestamp.to_le_bytes());
        out
    }

    pub fn from_le_bytes(bytes: [u8; RECORD_BYTES]) -> Self {
        let [a0, a1, a2, a3, t0, t1, t2, t3] = bytes;
        Self {
            address: u32::from_le_bytes([a0, a1, a2, a3]),
            timestamp: u32::from_le_bytes([t0, t1, t2, t3]),
        }
    }
}

/// Event polarity: brightness increase (ON) or decrease (OFF).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Polarity {
    On,
    Off,
}

impl Polarity {
    #[inline]
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            Polarity::On
        } else {
            Polarity::Off
        }
    }

    #[inline]
    pub fn bit(self) -> u16 {
        match self {
            Polarity::On => 1,
            Polarity::Off => 0,
        }
    }
}

/// Which sensor of the stereo pair produced an event.
///
/// The two sensors are optically mirrored, so each variant carries its own
/// retina mirroring rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Camera {
    Left,
    Right,
}

impl Camera {
    pub const BOTH: [Camera; 2] = [Camera::Left, Camera::Right];

    #[inline]
    pub fn from_bit(bit: bool) -> Self {
        if bit {
            Camera::Left
        } else {
            Camera::Right
        }
    }

    /// Wire bit (bit 15 of the address).
    #[inline]
    pub fn bit(self) -> u16 {
        match self {
            Camera::Left => 1,
            Camera::Right => 0,
        }
    }

    /// Array slot for per-camera state.
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Camera::Left => 0,
            Camera::Right => 1,
        }
    }

    /// Mirror a retina coordinate into lookup-table space.
    ///
    /// LEFT flips x only: `(R - x - 1, y)`. RIGHT flips both axes without the
    /// `- 1`: `(R - x, R - y)`, so RIGHT coordinate 0 lands on `R`, one past the
    /// grid edge.
    #[inline]
    pub fn mirror(self, x: u16, y: u16, retina_size: usize) -> (usize, usize) {
        let r = retina_size;
        let (x, y) = (x as usize, y as usize);
        match self {
            Camera::Left => (r.saturating_sub(x + 1), y),
            Camera::Right => (r.saturating_sub(x), r.saturating_sub(y)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Camera::Left => "left",
            Camera::Right => "right",
        }
    }
}

/// A decoded sensor event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DecodedEvent {
    pub x: u16,
    pub y: u16,
    pub polarity: Polarity,
    pub camera: Camera,
    pub timestamp: u32,
}

/// Address codec for the sensor's AER layout.
pub trait EventCodec {
    /// Decode a raw record. `None` for words that carry no usable event.
    fn decode(&self, word: AerWord) -> Option<DecodedEvent>;

    /// Camera a record belongs to. Must agree with [`decode`](Self::decode)
    /// for every word `decode` accepts; the sequencer relies on it.
    fn camera(&self, word: AerWord) -> Camera;

    /// Pack a feature cell into a 16-bit spatial code.
    fn encode(&self, x: u16, y: u16, polarity: Polarity, camera: Camera) -> u16;

    /// Wrap a spatial code into an outgoing record.
    fn to_word(&self, spatial_code: u16, timestamp: u32) -> AerWord;
}

/// Standard DVS128 stereo codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AerCodec {
    retina_size: u16,
    shift: u8,
}

impl AerCodec {
    pub fn new(retina_size: usize, shift: u8) -> Self {
        Self {
            retina_size: retina_size.min(u16::MAX as usize) as u16,
            shift,
        }
    }
}

impl Default for AerCodec {
    fn default() -> Self {
        Self::new(128, 0)
    }
}

impl AerCodec {
    #[inline]
    fn shifted(&self, word: AerWord) -> u32 {
        word.address.checked_shr(self.shift as u32).unwrap_or(0)
    }
}

impl EventCodec for AerCodec {
    fn decode(&self, word: AerWord) -> Option<DecodedEvent> {
        let address = self.shifted(word);
        let x = ((address & X_MASK) >> X_SHIFT) as u16;
        let y = ((address & Y_MASK) >> Y_SHIFT) as u16;
        if x >= self.retina_size || y >= self.retina_size {
            return None;
        }
        Some(DecodedEvent {
            x,
            y,
            polarity: Polarity::from_bit(address & POLARITY_MASK != 0),
            camera: Camera::from_bit(address & CAMERA_MASK != 0),
            timestamp: word.timestamp,
        })
    }

    fn camera(&self, word: AerWord) -> Camera {
        Camera::from_bit(self.shifted(word) & CAMERA_MASK != 0)
    }

    fn encode(&self, x: u16, y: u16, polarity: Polarity, camera: Camera) -> u16 {
        polarity.bit()
            | ((x & COORD_MASK) << X_SHIFT)
            | ((y & COORD_MASK) << Y_SHIFT)
            | (camera.bit() << CAMERA_SHIFT)
    }

    fn to_word(&self, spatial_code: u16, timestamp: u32) -> AerWord {
        AerWord::new((spatial_code as u32) << self.shift, timestamp)
    }
}

/// Parse a packed ingest buffer.
///
/// Returns the records and the number of trailing bytes that did not form a
/// full record.
pub fn parse_records(bytes: &[u8]) -> (Vec<AerWord>, usize) {
    let chunks = bytes.chunks_exact(RECORD_BYTES);
    let truncated = chunks.remainder().len();
    let words = chunks
        .map(|c| {
            let mut record = [0u8; RECORD_BYTES];
            record.copy_from_slice(c);
            AerWord::from_le_bytes(record)
        })
        .collect();
    (words, truncated)
}

/// Serialize records back into the packed wire layout.
pub fn records_to_bytes(words: &[AerWord]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * RECORD_BYTES);
    for w in words {
        out.extend_from_slice(&w.to_le_bytes());
    }
    out
}
