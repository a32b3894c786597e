// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Utility functions used by several parts of this crate.
//!
//! This module is for anything that doesn't fit into the other top-level modules. Try not to add
//! new code here unless it really doesn't belong anywhere else.

use std::io::Cursor;

use anyhow::anyhow;
use bytes::Buf;
use bytes::Bytes;

use crate::decoder::stateless::vp8::FrameHeaderParser;
use crate::decoder::stateless::vp8::Vp8Decoder;
use crate::decoder::stateless::DecodeStatus;
use crate::decoder::DecodedHandle;
use crate::Resolution;

/// Size of the IVF file header.
const IVF_FILE_HEADER_LEN: usize = 32;
/// Size of the header preceding each IVF frame: 32-bit frame size then 64-bit timestamp.
const IVF_FRAME_HEADER_LEN: usize = 12;

/// Iterator over IVF packets.
pub struct IvfIterator<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> IvfIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut cursor = Cursor::new(data);

        // Skip the IVF header entirely.
        cursor.set_position(std::cmp::min(IVF_FILE_HEADER_LEN, data.len()) as u64);

        Self { cursor }
    }
}

impl<'a> Iterator for IvfIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        // Make sure we have a header.
        if self.cursor.remaining() < IVF_FRAME_HEADER_LEN {
            return None;
        }

        let len = self.cursor.get_u32_le() as usize;
        // Skip PTS.
        let _ = self.cursor.get_u64_le();

        if self.cursor.remaining() < len {
            return None;
        }

        let start = self.cursor.position() as usize;
        self.cursor.advance(len);

        Some(&self.cursor.get_ref()[start..start + len])
    }
}

/// Simple decoding loop that plays the stream once from start to finish.
///
/// Each item of `stream_iter` is submitted as one input, with its index as timestamp.
///
/// `allocate_new_surfaces` is called with the new picture size and the number of pictures the
/// backend must be able to provide whenever the decoder negotiates a new size.
///
/// `drain_output` is called after each input, when the decoder runs out of surfaces, and at the
/// end of the stream. It must release the output pictures held by the client and return how many
/// were released.
pub fn simple_playback_loop<H, P, I, R>(
    decoder: &mut Vp8Decoder<H, P>,
    stream_iter: I,
    allocate_new_surfaces: &mut dyn FnMut(Resolution, usize) -> anyhow::Result<()>,
    drain_output: &mut dyn FnMut() -> anyhow::Result<usize>,
) -> anyhow::Result<()>
where
    H: DecodedHandle + 'static,
    P: FrameHeaderParser,
    R: Into<Bytes>,
    I: Iterator<Item = R>,
{
    for (frame_num, packet) in stream_iter.enumerate() {
        decoder.set_stream(frame_num as u64, packet.into());

        loop {
            let remaining = decoder.remaining_stream_len();

            match decoder.decode()? {
                DecodeStatus::RanOutOfStreamData => {
                    let new_remaining = decoder.remaining_stream_len();
                    // Keep going if the input holds more than one frame.
                    if new_remaining == 0 || new_remaining == remaining {
                        break;
                    }
                }
                DecodeStatus::AllocateNewSurfaces => {
                    let size = decoder
                        .pic_size()
                        .ok_or_else(|| anyhow!("new surfaces requested without a size"))?;
                    allocate_new_surfaces(size, decoder.required_num_of_pictures())?;
                }
                DecodeStatus::RanOutOfSurfaces => {
                    if drain_output()? == 0 {
                        anyhow::bail!("decoder ran out of surfaces and none could be reclaimed");
                    }
                }
            }
        }

        drain_output()?;
    }

    decoder.flush()?;
    drain_output()?;

    Ok(())
}
