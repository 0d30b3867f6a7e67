//! Fixed-size records exchanged with the robot controller.
//!
//! Every field is a little-endian `i32`; records have no framing beyond
//! their fixed size.  The last word of each record is a [`crc_words`] over
//! all preceding words.
//!
//! | Record | Words | Bytes |
//! |---|---|---|
//! | [`OutgoingFrame`] | 115 | 460 |
//! | [`IncomingFrame`] | 36 | 144 |

use chrono::{DateTime, Utc};

use seamtrack_types::{INCREMENT_BATCH, IO_PORTS, Increment, POSE_WORDS, RobotStatus, SeamError};

use crate::crc::crc_words;

/// Type tag of a relative Cartesian motion increment.
pub const MOTION_INCREMENT_TYPE: i32 = 0x90;

/// Fixed-point scale of poses reported by the controller.
pub const POSE_SCALE: f64 = 1000.0;

// ────────────────────────────────────────────────────────────────────────────
// Word codec
// ────────────────────────────────────────────────────────────────────────────

struct WordWriter {
    words: Vec<i32>,
}

impl WordWriter {
    fn with_capacity(n: usize) -> Self {
        Self {
            words: Vec::with_capacity(n),
        }
    }

    fn put(&mut self, word: i32) {
        self.words.push(word);
    }

    fn put_all(&mut self, words: &[i32]) {
        self.words.extend_from_slice(words);
    }
}

struct WordReader<'a> {
    words: &'a [i32],
    pos: usize,
}

impl<'a> WordReader<'a> {
    fn new(words: &'a [i32]) -> Self {
        Self { words, pos: 0 }
    }

    // Callers check the total length up front.
    fn take(&mut self) -> i32 {
        let word = self.words[self.pos];
        self.pos += 1;
        word
    }

    fn take_array<const N: usize>(&mut self) -> [i32; N] {
        let mut out = [0; N];
        out.copy_from_slice(&self.words[self.pos..self.pos + N]);
        self.pos += N;
        out
    }
}

/// Little-endian byte image of `words`.
pub fn words_to_bytes(words: &[i32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(words.len() * 4);
    for word in words {
        bytes.extend_from_slice(&word.to_le_bytes());
    }
    bytes
}

/// Inverse of [`words_to_bytes`].
///
/// # Errors
///
/// [`SeamError::DimensionMismatch`] unless `bytes` holds exactly
/// `expected_words` words.
pub fn bytes_to_words(bytes: &[u8], expected_words: usize) -> Result<Vec<i32>, SeamError> {
    if bytes.len() != expected_words * 4 {
        return Err(SeamError::dimension("wire record bytes", expected_words * 4, bytes.len()));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

// ────────────────────────────────────────────────────────────────────────────
// OutgoingFrame
// ────────────────────────────────────────────────────────────────────────────

/// One slot of the increment batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IncrementEntry {
    /// `[dx, dy, dz, drx, dry, drz, 0, 0]`.
    pub inc: [i32; POSE_WORDS],
    pub tool_no: i32,
    pub inc_type: i32,
}

impl IncrementEntry {
    pub fn motion(increment: &Increment, tool_no: i32) -> Self {
        let mut inc = [0; POSE_WORDS];
        inc[..6].copy_from_slice(increment);
        Self {
            inc,
            tool_no,
            inc_type: MOTION_INCREMENT_TYPE,
        }
    }
}

/// Host → controller record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutgoingFrame {
    pub serial: i32,
    pub entries: [IncrementEntry; INCREMENT_BATCH],
    pub output_io: [i32; IO_PORTS],
    /// Number of populated `entries`.
    pub count: i32,
    /// `0` asks the controller to flush its motion queue, `1` enqueues.
    pub enqueue_flag: i32,
    pub request_data: i32,
    pub stop: i32,
    pub set_io: i32,
    pub crc: i32,
}

impl OutgoingFrame {
    pub const WORDS: usize = 1 + INCREMENT_BATCH * (POSE_WORDS + 2) + IO_PORTS + 6;
    pub const BYTES: usize = Self::WORDS * 4;

    /// Empty request-data frame with the given serial.  The CRC is not yet
    /// sealed.
    pub fn new(serial: i32) -> Self {
        Self {
            serial,
            entries: [IncrementEntry::default(); INCREMENT_BATCH],
            output_io: [0; IO_PORTS],
            count: 0,
            enqueue_flag: 1,
            request_data: 1,
            stop: 0,
            set_io: 0,
            crc: 0,
        }
    }

    /// Frame without motion payload; resent while waiting for a reply.
    pub fn is_heartbeat(&self) -> bool {
        self.count == 0
    }

    pub fn to_words(&self) -> Vec<i32> {
        let mut w = WordWriter::with_capacity(Self::WORDS);
        w.put(self.serial);
        for entry in &self.entries {
            w.put_all(&entry.inc);
            w.put(entry.tool_no);
            w.put(entry.inc_type);
        }
        w.put_all(&self.output_io);
        w.put(self.count);
        w.put(self.enqueue_flag);
        w.put(self.request_data);
        w.put(self.stop);
        w.put(self.set_io);
        w.put(self.crc);
        w.words
    }

    pub fn from_words(words: &[i32]) -> Result<Self, SeamError> {
        if words.len() != Self::WORDS {
            return Err(SeamError::dimension("outgoing frame", Self::WORDS, words.len()));
        }
        let mut r = WordReader::new(words);
        let serial = r.take();
        let mut entries = [IncrementEntry::default(); INCREMENT_BATCH];
        for entry in &mut entries {
            entry.inc = r.take_array();
            entry.tool_no = r.take();
            entry.inc_type = r.take();
        }
        Ok(Self {
            serial,
            entries,
            output_io: r.take_array(),
            count: r.take(),
            enqueue_flag: r.take(),
            request_data: r.take(),
            stop: r.take(),
            set_io: r.take(),
            crc: r.take(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        words_to_bytes(&self.to_words())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SeamError> {
        Self::from_words(&bytes_to_words(bytes, Self::WORDS)?)
    }

    /// CRC over every word before the CRC field.
    pub fn compute_crc(&self) -> i32 {
        let words = self.to_words();
        crc_words(&words[..Self::WORDS - 1])
    }

    /// Store [`compute_crc`](Self::compute_crc) in the CRC field.
    pub fn seal(mut self) -> Self {
        self.crc = self.compute_crc();
        self
    }

    pub fn crc_valid(&self) -> bool {
        self.crc == self.compute_crc()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// IncomingFrame
// ────────────────────────────────────────────────────────────────────────────

/// Controller → host record.  Poses are in 0.001 mm / 0.001°.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IncomingFrame {
    pub serial: i32,
    pub pulse_pos: [i32; POSE_WORDS],
    pub tool_pos: [i32; POSE_WORDS],
    pub flange_pos: [i32; POSE_WORDS],
    pub input_io: [i32; IO_PORTS],
    pub queue_count: i32,
    /// `1` when the controller accepted the CRC of our last frame.
    pub crc_ok: i32,
    pub crc: i32,
}

impl IncomingFrame {
    pub const WORDS: usize = 1 + 3 * POSE_WORDS + IO_PORTS + 3;
    pub const BYTES: usize = Self::WORDS * 4;

    pub fn to_words(&self) -> Vec<i32> {
        let mut w = WordWriter::with_capacity(Self::WORDS);
        w.put(self.serial);
        w.put_all(&self.pulse_pos);
        w.put_all(&self.tool_pos);
        w.put_all(&self.flange_pos);
        w.put_all(&self.input_io);
        w.put(self.queue_count);
        w.put(self.crc_ok);
        w.put(self.crc);
        w.words
    }

    pub fn from_words(words: &[i32]) -> Result<Self, SeamError> {
        if words.len() != Self::WORDS {
            return Err(SeamError::dimension("incoming frame", Self::WORDS, words.len()));
        }
        let mut r = WordReader::new(words);
        Ok(Self {
            serial: r.take(),
            pulse_pos: r.take_array(),
            tool_pos: r.take_array(),
            flange_pos: r.take_array(),
            input_io: r.take_array(),
            queue_count: r.take(),
            crc_ok: r.take(),
            crc: r.take(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        words_to_bytes(&self.to_words())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, SeamError> {
        Self::from_words(&bytes_to_words(bytes, Self::WORDS)?)
    }

    pub fn compute_crc(&self) -> i32 {
        let words = self.to_words();
        crc_words(&words[..Self::WORDS - 1])
    }

    pub fn seal(mut self) -> Self {
        self.crc = self.compute_crc();
        self
    }

    pub fn crc_valid(&self) -> bool {
        self.crc == self.compute_crc()
    }

    /// Decoded status in real units, stamped with `at`.
    pub fn to_status(&self, at: DateTime<Utc>) -> RobotStatus {
        RobotStatus {
            pulse_pos: self.pulse_pos,
            tool_pos: self.tool_pos.map(|v| f64::from(v) / POSE_SCALE),
            flange_pos: self.flange_pos.map(|v| f64::from(v) / POSE_SCALE),
            input_io: self.input_io,
            queue_count: self.queue_count,
            updated_at: Some(at),
        }
    }
}
