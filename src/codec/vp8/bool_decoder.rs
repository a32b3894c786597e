// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A VP8 boolean entropy decoder, as described in RFC 6386, section 7.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BoolDecoderError {
    #[error("end of input")]
    EndOfInput,
    #[error("cannot convert the decoded value into the requested type")]
    CannotConvert,
}

pub type BoolDecoderResult<T> = Result<T, BoolDecoderError>;

/// Decodes booleans, literals and signed values from an arithmetic-coded VP8 partition.
pub struct BoolDecoder<'a> {
    data: &'a [u8],
    /// Index of the next byte of `data` to shift into `value`.
    offset: usize,
    /// Two-byte window over the coded value.
    value: u32,
    range: u32,
    /// Number of bits shifted since the last byte was loaded.
    bit_count: u32,
    /// Number of zero bytes loaded past the end of `data`.
    overrun: usize,
    /// Number of bits shifted out of the window so far.
    pos: usize,
}

impl<'a> BoolDecoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut bd = Self {
            data,
            offset: 0,
            value: 0,
            range: 255,
            bit_count: 0,
            overrun: 0,
            pos: 0,
        };

        let hi = u32::from(bd.next_byte());
        let lo = u32::from(bd.next_byte());
        bd.value = (hi << 8) | lo;

        bd
    }

    fn next_byte(&mut self) -> u8 {
        match self.data.get(self.offset) {
            Some(&byte) => {
                self.offset += 1;
                byte
            }
            None => {
                self.overrun += 1;
                0
            }
        }
    }

    /// Reads a boolean whose probability of being `false` is `prob / 256`.
    pub fn read_bool_with_prob(&mut self, prob: u8) -> BoolDecoderResult<bool> {
        // Past this point the window only contains padding.
        if self.overrun >= 2 {
            return Err(BoolDecoderError::EndOfInput);
        }

        let split = 1 + (((self.range - 1) * u32::from(prob)) >> 8);
        let big_split = split << 8;

        let bit = if self.value >= big_split {
            self.range -= split;
            self.value -= big_split;
            true
        } else {
            self.range = split;
            false
        };

        while self.range < 128 {
            self.value <<= 1;
            self.range <<= 1;
            self.pos += 1;
            self.bit_count += 1;

            if self.bit_count == 8 {
                self.bit_count = 0;
                self.value |= u32::from(self.next_byte());
            }
        }

        Ok(bit)
    }

    /// Reads a boolean with even probability.
    pub fn read_bool(&mut self) -> BoolDecoderResult<bool> {
        self.read_bool_with_prob(128)
    }

    /// Reads an unsigned literal of `bits` bits, most significant bit first.
    pub fn read_uint<U: TryFrom<u32>>(&mut self, bits: usize) -> BoolDecoderResult<U> {
        let mut value = 0u32;

        for _ in 0..bits {
            value = (value << 1) | u32::from(self.read_bool()?);
        }

        U::try_from(value).map_err(|_| BoolDecoderError::CannotConvert)
    }

    /// Reads a `bits`-bit magnitude followed by a sign flag.
    pub fn read_sint<U: TryFrom<i32>>(&mut self, bits: usize) -> BoolDecoderResult<U> {
        let magnitude = self.read_uint::<i32>(bits)?;
        let value = if self.read_bool()? {
            -magnitude
        } else {
            magnitude
        };

        U::try_from(value).map_err(|_| BoolDecoderError::CannotConvert)
    }

    /// Number of bits consumed from the partition so far.
    pub fn pos(&self) -> usize {
        self.pos
    }
}

#[cfg(test)]
mod tests {
    use super::BoolDecoder;
    use super::BoolDecoderError;

    #[test]
    fn zeroes_decode_as_false() {
        let data = [0u8; 4];
        let mut bd = BoolDecoder::new(&data);

        assert!(!bd.read_bool().unwrap());
        assert_eq!(bd.read_uint::<u8>(7).unwrap(), 0);
        assert_eq!(bd.read_sint::<i8>(4).unwrap(), 0);
    }

    #[test]
    fn empty_input() {
        let mut bd = BoolDecoder::new(&[]);

        assert_eq!(bd.read_bool(), Err(BoolDecoderError::EndOfInput));
    }

    #[test]
    fn runs_out_of_input() {
        let data = [0u8; 2];
        let mut bd = BoolDecoder::new(&data);

        // Two bytes cannot hold more than a few dozen even-probability bits.
        let res = (0..64).try_for_each(|_| bd.read_bool().map(|_| ()));
        assert_eq!(res, Err(BoolDecoderError::EndOfInput));
    }

    #[test]
    fn literal_too_large_for_type() {
        let data = [0xffu8; 8];
        let mut bd = BoolDecoder::new(&data);

        assert_eq!(bd.read_uint::<u8>(12), Err(BoolDecoderError::CannotConvert));
    }
}
