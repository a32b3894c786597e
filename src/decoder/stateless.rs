// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Stateless decoders.
//!
//! Stateless here refers to the backend API targeted by these decoders. The decoders themselves do
//! hold the decoding state so the backend doesn't need to.
//!
//! A stateless decoder performs one bounded unit of work per call and reports what it needs from
//! its client through [`DecodeStatus`]. Conditions it cannot recover from are reported as a
//! [`DecodeError`], after which the decoder refuses all input until it is reset.

pub mod vp8;

use thiserror::Error;

use crate::codec::vp8::parser::ParseFrameError;
use crate::Resolution;

/// Error returned by stateless backend methods.
#[derive(Error, Debug)]
pub enum StatelessBackendError {
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type returned by stateless backend methods.
pub type StatelessBackendResult<T> = Result<T, StatelessBackendError>;

/// State of a stateless decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodingState {
    /// No key frame has been seen yet.
    #[default]
    NeedStreamMetadata,
    /// A key frame established the codec state, inter frames can be decoded.
    Decoding,
    /// Decoder has been reset and can resume with the current parameters after seeing a key
    /// frame.
    AfterReset,
    /// A fatal error occurred. Nothing will be decoded until the decoder is reset.
    Error,
}

/// Non-fatal outcome of a [`vp8::Vp8Decoder::decode`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// All the input has been processed, the client should provide the next frame.
    RanOutOfStreamData,
    /// The picture size changed. The client must provide surfaces of the new size, then call
    /// `decode` again without new input.
    AllocateNewSurfaces,
    /// No picture is available to decode into. The client must return a picture to the
    /// accelerator, then call `decode` again without new input.
    RanOutOfSurfaces,
}

/// Fatal error returned by the [`vp8::Vp8Decoder::decode`] method.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to parse frame: {0}")]
    ParseFrame(#[from] ParseFrameError),
    #[error("invalid key frame size {}x{}", .0.width, .0.height)]
    InvalidFrameSize(Resolution),
    #[error("failed to submit frame for decoding: {0}")]
    SubmitFailed(#[source] StatelessBackendError),
    #[error("failed to output decoded picture: {0}")]
    OutputFailed(#[source] StatelessBackendError),
    #[error("decoder is in error state and needs to be reset")]
    ErrorState,
}
