// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

// This file contains a dummy backend and parser whose only purpose is to let the decoder
// run so we can test it in isolation.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::anyhow;

use crate::codec::vp8::parser::Frame;
use crate::codec::vp8::parser::Header;
use crate::codec::vp8::parser::ParseFrameError;
use crate::codec::vp8::parser::ParseUncompressedChunkError;
use crate::decoder::stateless::vp8::FrameHeaderParser;
use crate::decoder::stateless::vp8::Vp8Accelerator;
use crate::decoder::stateless::vp8::Vp8Decoder;
use crate::decoder::stateless::StatelessBackendResult;
use crate::decoder::DecodedHandle;
use crate::Resolution;

#[derive(Default)]
pub struct BackendHandle {
    id: u32,
    timestamp: u64,
    resolution: Resolution,
    decoded: bool,
}

#[derive(Clone)]
pub struct Handle {
    handle: Rc<RefCell<BackendHandle>>,
}

impl Handle {
    pub fn id(&self) -> u32 {
        self.handle.borrow().id
    }

    pub fn is_same(&self, other: &Handle) -> bool {
        Rc::ptr_eq(&self.handle, &other.handle)
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.handle)
    }
}

impl DecodedHandle for Handle {
    fn timestamp(&self) -> u64 {
        self.handle.borrow().timestamp
    }

    fn coded_resolution(&self) -> Resolution {
        self.handle.borrow().resolution
    }

    fn is_ready(&self) -> bool {
        self.handle.borrow().decoded
    }
}

/// What the decoder asked the backend to decode.
#[derive(Clone, Debug)]
pub struct Submission {
    pub resolution: Resolution,
    pub refs: (Option<u32>, Option<u32>, Option<u32>),
    pub timestamp: u64,
}

#[derive(Default)]
pub struct BackendState {
    /// Number of upcoming `create_picture` calls that will find no picture.
    pub unavailable: usize,
    pub fail_submit: bool,
    pub fail_output: bool,
    pub protected: bool,

    pub created: Vec<Handle>,
    pub submitted: Vec<Submission>,
    /// Ids of the output pictures, in order.
    pub output: Vec<u32>,
}

impl BackendState {
    pub fn last_created(&self) -> Option<Handle> {
        self.created.last().cloned()
    }
}

pub struct Backend {
    state: Rc<RefCell<BackendState>>,
}

impl Vp8Accelerator for Backend {
    type Handle = Handle;

    fn create_picture(&mut self) -> Option<Handle> {
        let mut state = self.state.borrow_mut();
        if state.unavailable > 0 {
            state.unavailable -= 1;
            return None;
        }

        let handle = Handle {
            handle: Rc::new(RefCell::new(BackendHandle {
                id: state.created.len() as u32,
                ..Default::default()
            })),
        };
        state.created.push(handle.clone());

        Some(handle)
    }

    fn submit_decode(
        &mut self,
        picture: &Handle,
        header: &Header,
        last_ref: Option<&Handle>,
        golden_ref: Option<&Handle>,
        alt_ref: Option<&Handle>,
        _: &[u8],
        timestamp: u64,
    ) -> StatelessBackendResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_submit {
            return Err(anyhow!("submission failure requested").into());
        }

        {
            let mut backend_handle = picture.handle.borrow_mut();
            backend_handle.timestamp = timestamp;
            backend_handle.resolution = header.resolution();
            backend_handle.decoded = true;
        }

        state.submitted.push(Submission {
            resolution: header.resolution(),
            refs: (
                last_ref.map(Handle::id),
                golden_ref.map(Handle::id),
                alt_ref.map(Handle::id),
            ),
            timestamp,
        });

        Ok(())
    }

    fn output_picture(&mut self, picture: &Handle) -> StatelessBackendResult<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_output {
            return Err(anyhow!("output failure requested").into());
        }

        state.output.push(picture.id());
        Ok(())
    }

    fn requires_protected_surfaces(&self) -> bool {
        self.state.borrow().protected
    }
}

#[derive(Default)]
struct ParserState {
    /// Headers to return with the length of their frame, in order. `None` makes parsing fail.
    headers: VecDeque<Option<(Header, usize)>>,
    parsed: usize,
}

/// Parser returning pre-recorded headers. Unless told otherwise, each frame spans its whole
/// input.
#[derive(Clone, Default)]
pub struct ScriptedParser {
    state: Rc<RefCell<ParserState>>,
}

impl ScriptedParser {
    pub fn push(&self, header: Option<Header>) {
        self.state
            .borrow_mut()
            .headers
            .push_back(header.map(|header| (header, usize::MAX)));
    }

    /// Queues `header` for a frame covering only the first `frame_len` bytes of its input.
    pub fn push_frame(&self, header: Header, frame_len: usize) {
        self.state
            .borrow_mut()
            .headers
            .push_back(Some((header, frame_len)));
    }

    /// Number of times the decoder invoked the parser.
    pub fn num_parsed(&self) -> usize {
        self.state.borrow().parsed
    }
}

impl FrameHeaderParser for ScriptedParser {
    fn parse_frame<'a>(&mut self, bitstream: &'a [u8]) -> Result<Frame<'a>, ParseFrameError> {
        let mut state = self.state.borrow_mut();
        state.parsed += 1;

        match state.headers.pop_front().flatten() {
            Some((header, frame_len)) => Ok(Frame::new(bitstream, frame_len, header)),
            None => Err(ParseUncompressedChunkError::InvalidStartCode(0).into()),
        }
    }
}

impl Vp8Decoder<Handle, ScriptedParser> {
    // Creates a new instance of the decoder using the dummy backend and a scripted parser.
    pub fn new_dummy() -> (Self, Rc<RefCell<BackendState>>, ScriptedParser) {
        let state = Rc::new(RefCell::new(BackendState::default()));
        let parser = ScriptedParser::default();
        let decoder = Self::with_parser(
            parser.clone(),
            Box::new(Backend {
                state: state.clone(),
            }),
        );

        (decoder, state, parser)
    }
}
