// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub mod bool_decoder;
#[cfg(test)]
mod bool_encoder;
pub mod parser;
pub mod probs;
