//! Word-wise CRC used by both directions of the controller protocol.
//!
//! The controller folds whole 32-bit words, not bytes, into a signed
//! accumulator seeded with `0xFFFF` and shifts it arithmetically eight times
//! per word with polynomial `0xA001`.  Receivers must replicate this exactly,
//! sign extension included.

/// Initial accumulator value.
pub const CRC_SEED: i32 = 0xFFFF;

/// Reflected polynomial applied after each shift that drops a set bit.
pub const CRC_POLY: i32 = 0xA001;

/// CRC over `words`.
pub fn crc_words(words: &[i32]) -> i32 {
    let mut crc = CRC_SEED;
    for &word in words {
        crc ^= word;
        for _ in 0..8 {
            let carry = crc & 1;
            crc >>= 1;
            if carry != 0 {
                crc ^= CRC_POLY;
            }
        }
    }
    crc
}
