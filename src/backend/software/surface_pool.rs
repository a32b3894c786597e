// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::rc::Rc;
use std::rc::Weak;

use crate::Resolution;

/// Identifier of a surface, unique within its pool.
pub type SurfaceId = u32;

/// Storage a picture is decoded into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Surface {
    id: SurfaceId,
    resolution: Resolution,
}

impl Surface {
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }
}

/// A surface obtained from a [`SurfacePool`].
///
/// The surface will automatically be returned to its pool upon dropping, provided the pool still
/// exists and the surface is still compatible with it.
pub struct PooledSurface {
    surface: Surface,
    pool: Weak<RefCell<SurfacePool>>,
}

impl PooledSurface {
    fn new(surface: Surface, pool: &Rc<RefCell<SurfacePool>>) -> Self {
        Self {
            surface,
            pool: Rc::downgrade(pool),
        }
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }
}

impl Drop for PooledSurface {
    fn drop(&mut self) {
        let surface = self.surface;

        // If the pool still exists...
        if let Some(pool) = self.pool.upgrade() {
            let mut pool_borrowed = pool.borrow_mut();
            // ... and is still managing this surface, return it.
            if pool_borrowed.managed_surfaces.contains_key(&surface.id) {
                pool_borrowed.surfaces.push_back(surface);
                return;
            }
        }

        log::debug!(
            "Dropping stale surface: {}, ({:?})",
            surface.id,
            surface.resolution
        )
    }
}

/// A pool of surfaces of (at least) a given coded resolution.
///
/// Stale surfaces are dropped when the pool resolution changes, including those currently in
/// use, which are dropped instead of being returned once released.
pub struct SurfacePool {
    coded_resolution: Resolution,
    surfaces: VecDeque<Surface>,
    /// All the surfaces managed by this pool, free or in use, with their resolution.
    managed_surfaces: BTreeMap<SurfaceId, Resolution>,
    next_id: SurfaceId,
}

impl SurfacePool {
    /// Create a new, empty pool for surfaces of `coded_resolution`.
    pub fn new(coded_resolution: Resolution) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            coded_resolution,
            surfaces: VecDeque::new(),
            managed_surfaces: Default::default(),
            next_id: 0,
        }))
    }

    /// Create `count` new surfaces of the current coded resolution and add them to the pool.
    pub fn add_surfaces(&mut self, count: usize) {
        for _ in 0..count {
            let surface = Surface {
                id: self.next_id,
                resolution: self.coded_resolution,
            };
            self.next_id = self.next_id.wrapping_add(1);

            self.managed_surfaces.insert(surface.id, surface.resolution);
            self.surfaces.push_back(surface);
        }
    }

    /// Sets the coded resolution of the pool. Releases any stale surfaces.
    pub fn set_coded_resolution(&mut self, resolution: Resolution) {
        self.coded_resolution = resolution;
        self.managed_surfaces
            .retain(|_, res| res.can_contain(resolution));
        self.surfaces
            .retain(|s| s.resolution.can_contain(resolution));
    }

    /// Gets a free surface from the pool.
    ///
    /// `return_pool` is a reference to the smart pointer containing the pool. It is a bit
    /// inelegant, but we unfortunately cannot declare `self` to be `&Rc<RefCell<Self>>` so we
    /// have to use this workaround.
    pub fn get_surface(&mut self, return_pool: &Rc<RefCell<Self>>) -> Option<PooledSurface> {
        let surface = self.surfaces.pop_front();

        debug_assert!({
            match surface.as_ref() {
                Some(s) => s.resolution.can_contain(self.coded_resolution),
                None => true,
            }
        });

        surface.map(|s| PooledSurface::new(s, return_pool))
    }

    /// Returns the number of surfaces left.
    pub fn num_free_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    /// Returns the total number of managed surfaces in this pool.
    pub fn num_managed_surfaces(&self) -> usize {
        self.managed_surfaces.len()
    }
}
