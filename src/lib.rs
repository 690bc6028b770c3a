// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! VP8 frame header parsing for stateless decoders.
//!
//! [`codec::vp8::parser`] turns one VP8 frame into a fully-typed [`codec::vp8::parser::Header`],
//! carrying the segmentation, loop filter and probability state that persists between frames, so
//! that a macroblock decoder (usually a hardware accelerator) can take over from the first
//! macroblock.

pub mod bitstream_utils;
pub mod codec;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}
