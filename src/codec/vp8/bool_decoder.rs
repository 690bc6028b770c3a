// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A VP8 boolean decoder, as described in section 7 of RFC 6386.
//!
//! The decoder keeps a window of up to `usize::BITS` bits of the stream in
//! `value`, the top 8 bits of which are compared against the split computed
//! from the probability. This is equivalent to the 2-byte reference
//! implementation of the RFC but refills the window one batch of bytes at a
//! time instead of one byte per 8 shifts.

use std::convert::TryFrom;
use std::io::Cursor;

use byteorder::ReadBytesExt;
use thiserror::Error;

/// Number of bits held by the decoder window.
const BD_VALUE_SIZE: usize = usize::BITS as usize;

#[derive(Debug, Error)]
pub enum BoolDecoderError {
    #[error("cannot convert a {0}-bit literal into the requested type")]
    CannotConvert(usize),
}

pub type BoolDecoderResult<T> = std::result::Result<T, BoolDecoderError>;

/// Context of the boolean decoder, in the form hardware accelerators expect
/// it in order to resume decoding of the first partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BoolDecoderState {
    /// Current `range`, always in `128..=255` between reads.
    pub range: usize,
    /// Top byte of the decoder window.
    pub value: usize,
    /// Number of bits of the current input byte already shifted into `value`,
    /// modulo 8.
    pub count: isize,
}

/// A boolean (binary arithmetic) decoder.
///
/// Reading past the end of the input never fails: the input behaves as if it
/// were followed by an infinite run of zero bytes. Callers that care can check
/// [`BoolDecoder::is_past_end`] once they are done.
pub struct BoolDecoder<T> {
    data: Cursor<T>,
    /// Number of zero bytes fed into the window after `data` ran out.
    padding: usize,
    range: usize,
    value: usize,
    /// Number of valid bits in `value` below its top byte. Negative when the
    /// top byte itself is incomplete and a refill is needed.
    count: isize,
}

impl<T: AsRef<[u8]>> BoolDecoder<T> {
    /// Creates a new decoder over `data`.
    pub fn new(data: T) -> Self {
        let mut bd = Self { data: Cursor::new(data), padding: 0, range: 255, value: 0, count: -8 };

        bd.fill();
        bd
    }

    /// Shifts as many whole bytes as fit into the window.
    fn fill(&mut self) {
        let mut shift = BD_VALUE_SIZE as isize - 8 - (self.count + 8);

        while shift >= 0 {
            let byte = match self.data.read_u8() {
                Ok(byte) => byte,
                Err(_) => {
                    self.padding += 1;
                    0
                }
            };

            self.count += 8;
            self.value |= usize::from(byte) << shift;
            shift -= 8;
        }
    }

    /// Reads one boolean whose probability of being `false` is `prob / 256`.
    pub fn read_bool_with_prob(&mut self, prob: u8) -> bool {
        let split = 1 + (((self.range - 1) * usize::from(prob)) >> 8);

        if self.count < 0 {
            self.fill();
        }

        let bigsplit = split << (BD_VALUE_SIZE - 8);

        let bit = if self.value >= bigsplit {
            self.range -= split;
            self.value -= bigsplit;
            true
        } else {
            self.range = split;
            false
        };

        // Renormalize so that range is back in 128..=255.
        let shift = self.range.leading_zeros() - (usize::BITS - 8);
        self.range <<= shift;
        self.value <<= shift;
        self.count -= shift as isize;

        bit
    }

    /// Reads one equiprobable boolean.
    pub fn read_bool(&mut self) -> bool {
        self.read_bool_with_prob(128)
    }

    /// Reads a 1-bit literal as a flag.
    pub fn read_flag(&mut self) -> bool {
        self.read_literal(1) == 1
    }

    /// Reads `nbits` equiprobable bits, most significant first.
    pub fn read_literal(&mut self, nbits: usize) -> u32 {
        let mut value = 0u32;

        for _ in 0..nbits {
            value = (value << 1) | u32::from(self.read_bool());
        }

        value
    }

    /// Reads an unsigned `nbits` literal and converts it to `U`.
    pub fn read_uint<U: TryFrom<u32>>(&mut self, nbits: usize) -> BoolDecoderResult<U> {
        let value = self.read_literal(nbits);

        U::try_from(value).map_err(|_| BoolDecoderError::CannotConvert(nbits))
    }

    /// Reads a `nbits` magnitude followed by a sign bit, as used by all the
    /// delta fields of the frame header.
    pub fn read_sint<U: TryFrom<i32>>(&mut self, nbits: usize) -> BoolDecoderResult<U> {
        let magnitude = i32::try_from(self.read_literal(nbits))
            .map_err(|_| BoolDecoderError::CannotConvert(nbits))?;
        let value = if self.read_bool() { -magnitude } else { magnitude };

        U::try_from(value).map_err(|_| BoolDecoderError::CannotConvert(nbits))
    }

    /// Returns the number of bits consumed so far, i.e. the bit offset from the
    /// start of the input at which decoding would resume.
    pub fn pos(&self) -> usize {
        let fed_bytes = self.data.position() as usize + self.padding;

        (fed_bytes * 8).saturating_sub((self.count + 8) as usize)
    }

    /// Whether more bits were consumed than the input actually holds.
    pub fn is_past_end(&self) -> bool {
        self.pos() > self.data.get_ref().as_ref().len() * 8
    }
}

impl<T: AsRef<[u8]>> From<BoolDecoder<T>> for BoolDecoderState {
    fn from(mut bd: BoolDecoder<T>) -> Self {
        if bd.count < 0 {
            bd.fill();
        }

        Self {
            value: bd.value >> (BD_VALUE_SIZE - 8),
            count: (8 + bd.count) % 8,
            range: bd.range,
        }
    }
}
