// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bitstream-level code: parsers and synthesizers for the supported codecs.

pub mod vp8;
