// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A software accelerator that does not reconstruct pixels.
//!
//! Each decoded picture is stamped with a CRC32 digest of its frame data chained with the digests
//! of the references it can predict from. Two decodes of the same stream thus produce the same
//! digests if and only if the decoder used the same references for each frame, which makes this
//! backend suitable for checking the reference management of the decoder.

pub mod surface_pool;

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::anyhow;
use crc32fast::Hasher;

use crate::codec::vp8::parser::Header;
use crate::decoder::stateless::vp8::Vp8Accelerator;
use crate::decoder::stateless::StatelessBackendResult;
use crate::decoder::DecodedHandle;
use crate::decoder::ReadyFramesQueue;
use crate::Resolution;

use surface_pool::PooledSurface;
use surface_pool::SurfacePool;

#[derive(Default)]
struct PictureState {
    timestamp: u64,
    /// Set once the picture has been decoded.
    digest: Option<u32>,
}

struct Picture {
    surface: PooledSurface,
    state: RefCell<PictureState>,
}

/// Handle to a picture of the [`SoftwareBackend`].
///
/// The underlying surface goes back to its pool once the last clone of the handle is dropped.
#[derive(Clone)]
pub struct SoftwareHandle {
    picture: Rc<Picture>,
}

impl SoftwareHandle {
    /// Digest of the decoded picture, or `None` if it has not been decoded yet.
    pub fn digest(&self) -> Option<u32> {
        self.picture.state.borrow().digest
    }

    pub fn surface_id(&self) -> surface_pool::SurfaceId {
        self.picture.surface.surface().id()
    }

    /// Whether `self` and `other` refer to the same picture.
    pub fn is_same_picture(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.picture, &other.picture)
    }
}

impl DecodedHandle for SoftwareHandle {
    fn timestamp(&self) -> u64 {
        self.picture.state.borrow().timestamp
    }

    fn coded_resolution(&self) -> Resolution {
        self.picture.surface.surface().resolution()
    }

    fn is_ready(&self) -> bool {
        self.digest().is_some()
    }
}

/// Queue the output pictures of a [`SoftwareBackend`] are pushed into.
pub type OutputQueue = Rc<RefCell<ReadyFramesQueue<SoftwareHandle>>>;

pub struct SoftwareBackend {
    pool: Rc<RefCell<SurfacePool>>,
    output_queue: OutputQueue,
    protected: bool,
}

impl SoftwareBackend {
    /// Create a new backend taking its surfaces from `pool`. `protected` is reported by
    /// `requires_protected_surfaces`.
    pub fn new(pool: Rc<RefCell<SurfacePool>>, protected: bool) -> Self {
        Self {
            pool,
            output_queue: Default::default(),
            protected,
        }
    }

    /// Returns the queue output pictures are pushed into.
    pub fn output_queue(&self) -> OutputQueue {
        Rc::clone(&self.output_queue)
    }
}

impl Vp8Accelerator for SoftwareBackend {
    type Handle = SoftwareHandle;

    fn create_picture(&mut self) -> Option<SoftwareHandle> {
        let surface = self.pool.borrow_mut().get_surface(&self.pool)?;

        Some(SoftwareHandle {
            picture: Rc::new(Picture {
                surface,
                state: Default::default(),
            }),
        })
    }

    fn submit_decode(
        &mut self,
        picture: &SoftwareHandle,
        header: &Header,
        last_ref: Option<&SoftwareHandle>,
        golden_ref: Option<&SoftwareHandle>,
        alt_ref: Option<&SoftwareHandle>,
        bitstream: &[u8],
        timestamp: u64,
    ) -> StatelessBackendResult<()> {
        let surface_resolution = picture.coded_resolution();
        if !surface_resolution.can_contain(header.resolution()) {
            return Err(anyhow!(
                "surface of {:?} too small for frame of {:?}",
                surface_resolution,
                header.resolution()
            )
            .into());
        }

        let mut hasher = Hasher::new();
        hasher.update(bitstream);

        if !header.key_frame {
            if last_ref.is_none() {
                return Err(anyhow!("inter frame submitted without a last reference").into());
            }

            for reference in [last_ref, golden_ref, alt_ref] {
                let digest = match reference {
                    Some(reference) => reference
                        .digest()
                        .ok_or_else(|| anyhow!("reference picture has not been decoded"))?,
                    None => 0,
                };
                hasher.update(&digest.to_le_bytes());
            }
        }

        let digest = hasher.finalize();
        log::trace!("Decoded picture {}: {:08x}", picture.surface_id(), digest);

        let mut state = picture.picture.state.borrow_mut();
        state.timestamp = timestamp;
        state.digest = Some(digest);

        Ok(())
    }

    fn output_picture(&mut self, picture: &SoftwareHandle) -> StatelessBackendResult<()> {
        if !picture.is_ready() {
            return Err(anyhow!("cannot output a picture that has not been decoded").into());
        }

        self.output_queue.borrow_mut().push(picture.clone());
        Ok(())
    }

    fn requires_protected_surfaces(&self) -> bool {
        self.protected
    }
}
