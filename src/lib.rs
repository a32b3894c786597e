// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stateless VP8 decoding.
//!
//! This crate holds the control side of a VP8 decoder: it parses frame headers, negotiates the
//! picture size with its client, keeps track of the last, golden and alternate reference
//! pictures, and drives an accelerator that performs the actual reconstruction of the pixels.
//!
//! The [`decoder::stateless::vp8::Vp8Decoder`] struct is the entry point. It is combined with an
//! implementation of [`decoder::stateless::vp8::Vp8Accelerator`], such as the
//! [software backend](backend::software), after which frames can be submitted through
//! [`set_stream`](decoder::stateless::vp8::Vp8Decoder::set_stream) and
//! [`decode`](decoder::stateless::vp8::Vp8Decoder::decode).

pub mod backend;
pub mod codec;
pub mod decoder;
pub mod utils;

/// Width and height of a picture, in pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Whether `self` can contain `other`.
    pub fn can_contain(&self, other: Self) -> bool {
        self.width >= other.width && self.height >= other.height
    }

    /// Whether either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<(u32, u32)> for Resolution {
    fn from(value: (u32, u32)) -> Self {
        Self {
            width: value.0,
            height: value.1,
        }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(value: Resolution) -> Self {
        (value.width, value.height)
    }
}
