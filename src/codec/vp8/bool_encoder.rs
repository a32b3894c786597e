// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A VP8 boolean entropy encoder, the counterpart of
//! [`BoolDecoder`](crate::codec::vp8::bool_decoder::BoolDecoder). See RFC 6386, section 7.3.

pub struct BoolEncoder {
    output: Vec<u8>,
    range: u32,
    bottom: u32,
    /// Number of shifts left before the next byte is written.
    bit_count: i32,
}

impl Default for BoolEncoder {
    fn default() -> Self {
        Self {
            output: Vec::new(),
            range: 255,
            bottom: 0,
            bit_count: 24,
        }
    }
}

impl BoolEncoder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Propagates a carry into the bytes already written.
    fn add_one_to_output(&mut self) {
        for byte in self.output.iter_mut().rev() {
            if *byte == 0xff {
                *byte = 0;
            } else {
                *byte += 1;
                return;
            }
        }
    }

    /// Writes `bit`, whose probability of being `false` is `prob / 256`.
    pub fn write_bool_with_prob(&mut self, bit: bool, prob: u8) {
        let split = 1 + (((self.range - 1) * u32::from(prob)) >> 8);

        if bit {
            self.bottom = self.bottom.wrapping_add(split);
            self.range -= split;
        } else {
            self.range = split;
        }

        while self.range < 128 {
            self.range <<= 1;

            if self.bottom & (1 << 31) != 0 {
                self.add_one_to_output();
            }

            self.bottom <<= 1;
            self.bit_count -= 1;

            if self.bit_count == 0 {
                self.output.push((self.bottom >> 24) as u8);
                self.bottom &= (1 << 24) - 1;
                self.bit_count = 8;
            }
        }
    }

    pub fn write_bool(&mut self, bit: bool) {
        self.write_bool_with_prob(bit, 128)
    }

    /// Writes the `bits` least significant bits of `value`, most significant bit first.
    pub fn write_uint<T: Into<u32>>(&mut self, value: T, bits: usize) {
        let value = value.into();

        for i in (0..bits).rev() {
            self.write_bool((value >> i) & 1 != 0);
        }
    }

    /// Writes the magnitude of `value` on `bits` bits, followed by its sign.
    pub fn write_sint<T: Into<i32>>(&mut self, value: T, bits: usize) {
        let value = value.into();

        self.write_uint(value.unsigned_abs(), bits);
        self.write_bool(value < 0);
    }

    /// Pads the pending state and returns the coded bytes.
    pub fn flush(mut self) -> Vec<u8> {
        let mut count = self.bit_count;
        let mut value = self.bottom;

        if value & (1 << (32 - count)) != 0 {
            self.add_one_to_output();
        }

        value <<= count & 7;
        count >>= 3;
        for _ in 0..count {
            value <<= 8;
        }

        for _ in 0..4 {
            self.output.push((value >> 24) as u8);
            value <<= 8;
        }

        self.output
    }
}

#[cfg(test)]
mod tests {
    use super::BoolEncoder;
    use crate::codec::vp8::bool_decoder::BoolDecoder;

    #[test]
    fn decoder_reads_back_header_like_fields() {
        let mut enc = BoolEncoder::new();
        enc.write_bool(true);
        enc.write_uint(63u8, 6);
        enc.write_sint(-5i8, 4);
        enc.write_bool_with_prob(false, 250);
        enc.write_bool_with_prob(true, 3);
        enc.write_uint(0x1234u16, 16);
        let data = enc.flush();

        let mut bd = BoolDecoder::new(&data);
        assert!(bd.read_bool().unwrap());
        assert_eq!(bd.read_uint::<u8>(6).unwrap(), 63);
        assert_eq!(bd.read_sint::<i8>(4).unwrap(), -5);
        assert!(!bd.read_bool_with_prob(250).unwrap());
        assert!(bd.read_bool_with_prob(3).unwrap());
        assert_eq!(bd.read_uint::<u16>(16).unwrap(), 0x1234);
    }

    #[test]
    fn carry_propagates_through_saturated_bytes() {
        let mut enc = BoolEncoder::new();
        // Improbable `true` values push `bottom` up and force carries.
        let bits = (0..200).map(|i| i % 3 != 0).collect::<Vec<_>>();
        for &bit in &bits {
            enc.write_bool_with_prob(bit, 1);
        }
        let data = enc.flush();

        let mut bd = BoolDecoder::new(&data);
        for (i, &bit) in bits.iter().enumerate() {
            assert_eq!(bd.read_bool_with_prob(1).unwrap(), bit, "at bit {}", i);
        }
    }
}
