// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use vp8_stateless::backend::software::surface_pool::SurfacePool;
use vp8_stateless::backend::software::SoftwareBackend;
use vp8_stateless::decoder::stateless::vp8::Vp8Decoder;
use vp8_stateless::utils::simple_playback_loop;
use vp8_stateless::utils::IvfIterator;

fuzz_target!(|data: &[u8]| {
    let pool = SurfacePool::new(Default::default());
    let backend = SoftwareBackend::new(pool.clone(), false);
    let output = backend.output_queue();
    let mut decoder = Vp8Decoder::new(Box::new(backend));

    let _ = simple_playback_loop(
        &mut decoder,
        IvfIterator::new(data).map(Bytes::copy_from_slice),
        &mut |size, count| {
            let mut pool = pool.borrow_mut();
            pool.set_coded_resolution(size);
            let missing = count.saturating_sub(pool.num_managed_surfaces());
            pool.add_surfaces(missing);
            Ok(())
        },
        &mut || Ok((&mut *output.borrow_mut()).count()),
    );
});
