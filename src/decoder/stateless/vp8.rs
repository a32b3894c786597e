// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

#[cfg(test)]
mod dummy;

use bytes::Buf;
use bytes::Bytes;
use log::debug;
use log::trace;
use log::warn;

use crate::codec::vp8::parser::AltRefCopySource;
use crate::codec::vp8::parser::Frame;
use crate::codec::vp8::parser::GoldenCopySource;
use crate::codec::vp8::parser::Header;
use crate::codec::vp8::parser::ParseFrameError;
use crate::codec::vp8::parser::Parser;
use crate::decoder::stateless::DecodeError;
use crate::decoder::stateless::DecodeStatus;
use crate::decoder::stateless::DecodingState;
use crate::decoder::stateless::StatelessBackendResult;
use crate::decoder::DecodedHandle;
use crate::Resolution;

/// Number of reference pictures: last, golden and alternate.
pub const NUM_REF_FRAMES: usize = 3;
/// Pictures the decoder may hold at the same time: the references plus the one being decoded.
const NUM_FRAMES_ACTIVE: usize = NUM_REF_FRAMES + 1;
/// Maximum number of decoded pictures waiting in the client's rendering pipeline.
const MAX_VIDEO_FRAMES: usize = 4;
const PICTURES_IN_PIPELINE: usize = MAX_VIDEO_FRAMES + 2;

/// Source of VP8 frame headers.
pub trait FrameHeaderParser {
    /// Parse exactly one frame from the start of `bitstream`.
    fn parse_frame<'a>(&mut self, bitstream: &'a [u8]) -> Result<Frame<'a>, ParseFrameError>;
}

impl FrameHeaderParser for Parser {
    fn parse_frame<'a>(&mut self, bitstream: &'a [u8]) -> Result<Frame<'a>, ParseFrameError> {
        Parser::parse_frame(self, bitstream)
    }
}

/// Stateless backend methods specific to VP8.
///
/// An accelerator owns the storage of the pictures and does the actual decoding. From the point
/// of view of the decoder all of these calls are synchronous: if the backend works
/// asynchronously, it is responsible for tracking the completion of its own work.
pub trait Vp8Accelerator {
    /// Shared handle to a picture of this accelerator.
    type Handle: DecodedHandle;

    /// Returns a new picture to decode into, or `None` if no storage is available at the moment.
    fn create_picture(&mut self) -> Option<Self::Handle>;

    /// Called when the decoder wants the backend to decode `bitstream` into `picture`.
    ///
    /// `header` is fully populated, including the size of inter frames. The references are the
    /// ones in effect before this frame updates them.
    #[allow(clippy::too_many_arguments)]
    fn submit_decode(
        &mut self,
        picture: &Self::Handle,
        header: &Header,
        last_ref: Option<&Self::Handle>,
        golden_ref: Option<&Self::Handle>,
        alt_ref: Option<&Self::Handle>,
        bitstream: &[u8],
        timestamp: u64,
    ) -> StatelessBackendResult<()>;

    /// Called once `picture` has been decoded and is meant to be displayed.
    fn output_picture(&mut self, picture: &Self::Handle) -> StatelessBackendResult<()>;

    /// Whether the content must be decoded into protected surfaces. Not interpreted by the
    /// decoder.
    fn requires_protected_surfaces(&self) -> bool {
        false
    }
}

/// A parsed frame that has not been fully decoded yet.
struct PendingFrame {
    header: Header,
    /// Number of bytes of the stream covered by the frame.
    frame_len: usize,
}

/// Replace a reference frame with `handle`.
fn replace_reference<T: Clone>(reference: &mut Option<T>, handle: &T) {
    *reference = Some(handle.clone());
}

/// Updates the three reference slots after `decoded_handle` has been decoded from `header`.
///
/// The golden slot is updated first, then the alternate slot, then the last slot. An alternate
/// slot copied from the golden one receives the golden picture in effect *before* this frame.
pub(crate) fn update_references<T: Clone>(
    header: &Header,
    decoded_handle: &T,
    last_picture: &mut Option<T>,
    golden_ref_picture: &mut Option<T>,
    alt_ref_picture: &mut Option<T>,
) {
    if header.key_frame {
        replace_reference(last_picture, decoded_handle);
        replace_reference(golden_ref_picture, decoded_handle);
        replace_reference(alt_ref_picture, decoded_handle);
        return;
    }

    let old_golden = golden_ref_picture.clone();

    if header.refresh_golden_frame {
        replace_reference(golden_ref_picture, decoded_handle);
    } else {
        match header.copy_buffer_to_golden {
            GoldenCopySource::None => (),
            GoldenCopySource::Last => *golden_ref_picture = last_picture.clone(),
            GoldenCopySource::AltRef => *golden_ref_picture = alt_ref_picture.clone(),
        }
    }

    if header.refresh_alternate_frame {
        replace_reference(alt_ref_picture, decoded_handle);
    } else {
        match header.copy_buffer_to_alternate {
            AltRefCopySource::None => (),
            AltRefCopySource::Last => *alt_ref_picture = last_picture.clone(),
            AltRefCopySource::Golden => *alt_ref_picture = old_golden,
        }
    }

    if header.refresh_last {
        replace_reference(last_picture, decoded_handle);
    }

    trace!(
        "References updated: refresh last {}, golden {} ({:?}), alt {} ({:?})",
        header.refresh_last,
        header.refresh_golden_frame,
        header.copy_buffer_to_golden,
        header.refresh_alternate_frame,
        header.copy_buffer_to_alternate
    );
}

/// A stateless VP8 decoder.
///
/// The decoder is driven by its client one call at a time: [`set_stream`] provides the bytes of
/// a frame, and [`decode`] processes them, telling the client what it needs next. Frames that
/// cannot proceed yet (because new surfaces are needed or none is free) stay pending, and the
/// client resumes them by calling [`decode`] again without providing new input.
///
/// [`set_stream`]: Vp8Decoder::set_stream
/// [`decode`]: Vp8Decoder::decode
pub struct Vp8Decoder<H: DecodedHandle + 'static, P: FrameHeaderParser = Parser> {
    /// A parser to extract bitstream data and build frame data in turn
    parser: P,

    /// The backend used for decoding.
    backend: Box<dyn Vp8Accelerator<Handle = H>>,

    decoding_state: DecodingState,

    /// Bytes of the current stream segment that have not been consumed yet.
    stream: Bytes,
    /// Timestamp of the current stream segment.
    timestamp: u64,

    /// The frame being decoded, if it has been parsed already.
    curr_frame: Option<PendingFrame>,

    /// The negotiated picture size.
    pic_size: Option<Resolution>,
    /// Scaling codes of the last key frame, applied to the following inter frames.
    horiz_scale_code: u8,
    vert_scale_code: u8,

    /// The picture used as the last reference picture.
    last_picture: Option<H>,
    /// The picture used as the golden reference picture.
    golden_ref_picture: Option<H>,
    /// The picture used as the alternate reference picture.
    alt_ref_picture: Option<H>,
}

impl<H: DecodedHandle + 'static> Vp8Decoder<H, Parser> {
    /// Create a new decoder using the given `backend`.
    pub fn new(backend: Box<dyn Vp8Accelerator<Handle = H>>) -> Self {
        Self::with_parser(Default::default(), backend)
    }
}

impl<H: DecodedHandle + 'static, P: FrameHeaderParser> Vp8Decoder<H, P> {
    /// Create a new decoder using the given header `parser` and `backend`.
    pub fn with_parser(parser: P, backend: Box<dyn Vp8Accelerator<Handle = H>>) -> Self {
        Self {
            parser,
            backend,
            decoding_state: Default::default(),
            stream: Default::default(),
            timestamp: 0,
            curr_frame: None,
            pic_size: None,
            horiz_scale_code: 0,
            vert_scale_code: 0,
            last_picture: None,
            golden_ref_picture: None,
            alt_ref_picture: None,
        }
    }

    /// Sets the bytes to decode from, replacing any input that has not been consumed yet,
    /// including a frame that was parsed but not decoded. `data` is not copied.
    ///
    /// Empty `data` is accepted and makes the next call to [`Vp8Decoder::decode`] report that
    /// it ran out of stream data.
    pub fn set_stream(&mut self, timestamp: u64, data: Bytes) {
        if self.curr_frame.take().is_some() {
            debug!("Discarding pending frame for new input");
        }

        self.stream = data;
        self.timestamp = timestamp;
    }

    /// Number of bytes of the current input not consumed yet.
    pub fn remaining_stream_len(&self) -> usize {
        self.stream.len()
    }

    /// Records a fatal error and returns it.
    fn fail(&mut self, err: DecodeError) -> DecodeError {
        warn!("Fatal decoding error: {}", err);
        self.decoding_state = DecodingState::Error;
        self.curr_frame = None;
        err
    }

    fn clear_references(&mut self) {
        self.last_picture = None;
        self.golden_ref_picture = None;
        self.alt_ref_picture = None;
    }

    /// Decodes the next frame of the current input.
    ///
    /// On success the frame's bytes are consumed and [`DecodeStatus::RanOutOfStreamData`] is
    /// returned. If the input holds more than one frame, the following one is processed by the
    /// next call.
    pub fn decode(&mut self) -> Result<DecodeStatus, DecodeError> {
        if self.decoding_state == DecodingState::Error {
            return Err(DecodeError::ErrorState);
        }

        let mut frame = match self.curr_frame.take() {
            Some(frame) => frame,
            None => {
                if self.stream.is_empty() {
                    return Ok(DecodeStatus::RanOutOfStreamData);
                }

                let parsed = self.parser.parse_frame(&self.stream).map(|frame| PendingFrame {
                    frame_len: frame.frame_len(),
                    header: frame.header,
                });

                match parsed {
                    Ok(frame) => frame,
                    Err(err) => return Err(self.fail(err.into())),
                }
            }
        };

        if frame.header.key_frame {
            let size = frame.header.resolution();
            if size.is_empty() {
                return Err(self.fail(DecodeError::InvalidFrameSize(size)));
            }

            if self.pic_size != Some(size) {
                debug!("New resolution: {}x{}", size.width, size.height);
                self.pic_size = Some(size);
                // Pictures of the old size cannot be used as references anymore.
                self.clear_references();
                // Inter frames must wait until this key frame has been decoded.
                if self.decoding_state == DecodingState::Decoding {
                    self.decoding_state = DecodingState::AfterReset;
                }
                self.curr_frame = Some(frame);
                return Ok(DecodeStatus::AllocateNewSurfaces);
            }
        } else {
            if self.decoding_state != DecodingState::Decoding {
                warn!("Dropping inter frame, waiting for a key frame");
                self.stream.advance(frame.frame_len);
                return Ok(DecodeStatus::RanOutOfStreamData);
            }

            // Inter frames don't carry these, use the ones of the stream.
            if let Some(size) = self.pic_size {
                // Sizes are only ever negotiated from 14-bit header fields.
                frame.header.width = size.width as u16;
                frame.header.height = size.height as u16;
            }
            frame.header.horiz_scale_code = self.horiz_scale_code;
            frame.header.vert_scale_code = self.vert_scale_code;
        }

        self.decode_and_output_frame(frame)
    }

    fn decode_and_output_frame(
        &mut self,
        frame: PendingFrame,
    ) -> Result<DecodeStatus, DecodeError> {
        let picture = match self.backend.create_picture() {
            Some(picture) => picture,
            None => {
                debug!("No picture available, keeping frame pending");
                self.curr_frame = Some(frame);
                return Ok(DecodeStatus::RanOutOfSurfaces);
            }
        };

        let submitted = self.backend.submit_decode(
            &picture,
            &frame.header,
            self.last_picture.as_ref(),
            self.golden_ref_picture.as_ref(),
            self.alt_ref_picture.as_ref(),
            &self.stream[..frame.frame_len],
            self.timestamp,
        );
        if let Err(err) = submitted {
            return Err(self.fail(DecodeError::SubmitFailed(err)));
        }

        if frame.header.show_frame {
            if let Err(err) = self.backend.output_picture(&picture) {
                return Err(self.fail(DecodeError::OutputFailed(err)));
            }
        }

        // Everything that could fail has succeeded, commit the frame.
        if frame.header.key_frame {
            self.horiz_scale_code = frame.header.horiz_scale_code;
            self.vert_scale_code = frame.header.vert_scale_code;

            if self.decoding_state != DecodingState::Decoding {
                debug!("Key frame decoded, resuming ({:?})", self.decoding_state);
            }
            self.decoding_state = DecodingState::Decoding;
        }

        update_references(
            &frame.header,
            &picture,
            &mut self.last_picture,
            &mut self.golden_ref_picture,
            &mut self.alt_ref_picture,
        );

        self.stream.advance(frame.frame_len);

        Ok(DecodeStatus::RanOutOfStreamData)
    }

    /// Drops the current input, the pending frame and all references. A key frame is needed
    /// before decoding can resume. The negotiated picture size is kept.
    ///
    /// This also brings a decoder out of the error state.
    pub fn reset(&mut self) {
        self.curr_frame = None;
        self.stream = Bytes::new();
        self.clear_references();

        self.decoding_state = match self.decoding_state {
            DecodingState::Decoding => DecodingState::AfterReset,
            DecodingState::Error if self.pic_size.is_some() => DecodingState::AfterReset,
            DecodingState::Error => DecodingState::NeedStreamMetadata,
            state => state,
        };

        debug!("Decoder reset ({:?})", self.decoding_state);
    }

    /// Flush the decoder. Every decoded frame has already been handed to the backend, so this is
    /// equivalent to a reset and cannot fail.
    ///
    /// Note that after flushing, a key frame must be submitted before decoding can resume.
    pub fn flush(&mut self) -> Result<(), DecodeError> {
        self.reset();
        Ok(())
    }

    /// Returns the negotiated picture size, or `None` if no key frame has been seen yet.
    pub fn pic_size(&self) -> Option<Resolution> {
        self.pic_size
    }

    /// Returns the number of pictures the client should provide to the backend for decoding to
    /// proceed smoothly. This does not depend on the stream.
    pub fn required_num_of_pictures(&self) -> usize {
        NUM_FRAMES_ACTIVE + PICTURES_IN_PIPELINE
    }

    pub fn state(&self) -> DecodingState {
        self.decoding_state
    }

    pub fn last_picture(&self) -> Option<&H> {
        self.last_picture.as_ref()
    }

    pub fn golden_picture(&self) -> Option<&H> {
        self.golden_ref_picture.as_ref()
    }

    pub fn alt_picture(&self) -> Option<&H> {
        self.alt_ref_picture.as_ref()
    }

    /// Whether the backend requires protected surfaces for this content.
    pub fn requires_protected_surfaces(&self) -> bool {
        self.backend.requires_protected_surfaces()
    }
}
