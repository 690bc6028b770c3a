// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Boolean encoder from section 7.3 of RFC 6386, used to synthesize
//! bitstreams for the parser tests.

pub(crate) struct BoolEncoder {
    output: Vec<u8>,
    range: u32,
    bottom: u32,
    /// Number of shifts left before the top byte of `bottom` is written out.
    bit_count: u32,
}

impl BoolEncoder {
    pub fn new() -> Self {
        Self { output: Vec::new(), range: 255, bottom: 0, bit_count: 24 }
    }

    /// Propagates a carry into the bytes already written.
    fn add_one_to_output(&mut self) {
        for byte in self.output.iter_mut().rev() {
            if *byte == 255 {
                *byte = 0;
            } else {
                *byte += 1;
                return;
            }
        }
    }

    pub fn write_bool(&mut self, bit: bool, prob: u8) {
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

    pub fn write_flag(&mut self, bit: bool) {
        self.write_bool(bit, 128);
    }

    pub fn write_literal(&mut self, value: u32, nbits: usize) {
        for i in (0..nbits).rev() {
            self.write_flag((value >> i) & 1 == 1);
        }
    }

    /// Writes a magnitude followed by its sign bit.
    pub fn write_sint(&mut self, value: i32, nbits: usize) {
        self.write_literal(value.unsigned_abs(), nbits);
        self.write_flag(value < 0);
    }

    /// Writes an optional value preceded by its presence flag.
    pub fn write_optional_sint(&mut self, value: Option<i32>, nbits: usize) {
        self.write_flag(value.is_some());
        if let Some(value) = value {
            self.write_sint(value, nbits);
        }
    }

    /// Flushes the pending bits and returns the encoded bytes.
    pub fn finish(mut self) -> Vec<u8> {
        let mut c = self.bit_count;
        let mut v = self.bottom;

        if v & (1 << (32 - c)) != 0 {
            self.add_one_to_output();
        }

        v <<= c & 7;
        c >>= 3;
        for _ in 0..c {
            v <<= 8;
        }

        for _ in 0..4 {
            self.output.push((v >> 24) as u8);
            v <<= 8;
        }

        self.output
    }
}
