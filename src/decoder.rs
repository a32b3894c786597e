// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decoder-side vocabulary shared by the decoders and the backends.

pub mod stateless;

use std::collections::VecDeque;

use crate::Resolution;

/// The handle type used by the stateless decoder backend. The only requirement
/// from implementors is that they give access to the properties of the decoded picture and
/// that they can be (cheaply) cloned.
///
/// Cloning a handle does not copy the picture: all the clones refer to the same storage, which
/// is only released once the last of them is dropped.
pub trait DecodedHandle: Clone {
    /// Returns the timestamp of the picture.
    fn timestamp(&self) -> u64;

    /// Returns the coded resolution of the storage backing this handle.
    fn coded_resolution(&self) -> Resolution;

    /// Returns `true` if this handle has been completely decoded.
    fn is_ready(&self) -> bool;
}

/// A queue where decoded frames wait until they are retrieved by the client.
pub struct ReadyFramesQueue<T: DecodedHandle> {
    /// Queue of all the frames waiting to be sent to the client.
    queue: VecDeque<T>,
}

impl<T: DecodedHandle> Default for ReadyFramesQueue<T> {
    fn default() -> Self {
        Self {
            queue: Default::default(),
        }
    }
}

impl<T: DecodedHandle> ReadyFramesQueue<T> {
    /// Push `handle` to the back of the queue.
    pub fn push(&mut self, handle: T) {
        self.queue.push_back(handle)
    }
}

/// Allows us to manipulate the frames list like an iterator without consuming it.
impl<'a, T: DecodedHandle> Iterator for &'a mut ReadyFramesQueue<T> {
    type Item = T;

    /// Returns the next frame (if any) waiting to be dequeued.
    fn next(&mut self) -> Option<T> {
        self.queue.pop_front()
    }
}
