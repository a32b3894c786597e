// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Writes VP8 frame headers back into a bitstream. The output contains the uncompressed data
//! chunk and the first partition fields understood by [`Parser`](crate::codec::vp8::parser::Parser),
//! followed by a caller-provided payload standing for the DCT partitions.

use byteorder::LittleEndian;
use byteorder::WriteBytesExt;
use thiserror::Error;

use crate::codec::vp8::bool_encoder::BoolEncoder;
use crate::codec::vp8::parser::Header;
use crate::codec::vp8::parser::MbLfAdjustments;
use crate::codec::vp8::parser::QuantIndices;
use crate::codec::vp8::parser::Segmentation;
use crate::codec::vp8::parser::START_CODE;

#[derive(Error, Debug)]
pub enum SynthesizerError {
    #[error("tried to synthesize unsupported settings")]
    Unsupported,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type SynthesizerResult<T> = Result<T, SynthesizerError>;

pub struct Synthesizer<'h> {
    header: &'h Header,
    encoder: BoolEncoder,
}

fn check(cond: bool) -> SynthesizerResult<()> {
    if cond {
        Ok(())
    } else {
        Err(SynthesizerError::Unsupported)
    }
}

fn check_signed(value: i8, bits: u32) -> SynthesizerResult<()> {
    check(u32::from(value.unsigned_abs()) < (1 << bits))
}

impl<'h> Synthesizer<'h> {
    /// Synthesizes a frame described by `header`, whose DCT partitions are made of `payload`.
    /// All the partitions but the last one are left empty.
    pub fn synthesize(header: &'h Header, payload: &[u8]) -> SynthesizerResult<Vec<u8>> {
        let mut s = Self {
            header,
            encoder: BoolEncoder::new(),
        };

        s.frame_header()?;
        let first_partition = s.encoder.flush();
        check(first_partition.len() <= 0x7ffff)?;

        let mut out = Vec::new();
        Self::uncompressed_data_chunk(header, first_partition.len() as u32, &mut out)?;
        out.extend_from_slice(&first_partition);
        for _ in 1..header.num_dct_partitions() {
            out.write_u24::<LittleEndian>(0)?;
        }
        out.extend_from_slice(payload);

        Ok(out)
    }

    fn uncompressed_data_chunk(
        header: &Header,
        first_part_size: u32,
        out: &mut Vec<u8>,
    ) -> SynthesizerResult<()> {
        check(header.version <= 7)?;

        let frame_tag = u32::from(!header.key_frame)
            | u32::from(header.version) << 1
            | u32::from(header.show_frame) << 4
            | first_part_size << 5;
        out.write_u24::<LittleEndian>(frame_tag)?;

        if header.key_frame {
            check(header.width <= 0x3fff && header.height <= 0x3fff)?;
            check(header.horiz_scale_code <= 3 && header.vert_scale_code <= 3)?;

            out.write_u24::<LittleEndian>(START_CODE)?;
            out.write_u16::<LittleEndian>(
                header.width | u16::from(header.horiz_scale_code) << 14,
            )?;
            out.write_u16::<LittleEndian>(
                header.height | u16::from(header.vert_scale_code) << 14,
            )?;
        }

        Ok(())
    }

    fn flag(&mut self, value: bool) {
        self.encoder.write_bool(value);
    }

    fn literal<T: Into<u32>>(&mut self, value: T, bits: usize) -> SynthesizerResult<()> {
        let value = value.into();
        check(value < (1 << bits))?;
        self.encoder.write_uint(value, bits);
        Ok(())
    }

    fn signed(&mut self, value: i8, bits: u32) -> SynthesizerResult<()> {
        check_signed(value, bits)?;
        self.encoder.write_sint(value, bits as usize);
        Ok(())
    }

    /// Writes an optional signed value, preceded by its presence flag.
    fn optional_signed(&mut self, value: i8, bits: u32) -> SynthesizerResult<()> {
        self.flag(value != 0);
        if value != 0 {
            self.signed(value, bits)?;
        }
        Ok(())
    }

    fn segmentation(&mut self, seg: &Segmentation) -> SynthesizerResult<()> {
        self.flag(seg.segmentation_enabled);
        if !seg.segmentation_enabled {
            return Ok(());
        }

        self.flag(seg.update_mb_segmentation_map);
        self.flag(seg.update_segment_feature_data);

        if seg.update_segment_feature_data {
            self.flag(seg.segment_feature_mode);

            for &value in &seg.quantizer_update_value {
                self.optional_signed(value, 7)?;
            }

            for &value in &seg.lf_update_value {
                self.optional_signed(value, 6)?;
            }
        }

        if seg.update_mb_segmentation_map {
            for &prob in &seg.segment_prob {
                self.flag(prob != 255);
                if prob != 255 {
                    self.literal(prob, 8)?;
                }
            }
        }

        Ok(())
    }

    fn mb_lf_adjustments(&mut self, adj: &MbLfAdjustments) -> SynthesizerResult<()> {
        self.flag(adj.loop_filter_adj_enable);
        if !adj.loop_filter_adj_enable {
            return Ok(());
        }

        self.flag(adj.mode_ref_lf_delta_update);
        if !adj.mode_ref_lf_delta_update {
            return Ok(());
        }

        // Deltas persist across frames, so always send them to be explicit.
        for &value in adj.ref_frame_delta.iter().chain(adj.mb_mode_delta.iter()) {
            self.flag(true);
            self.signed(value, 6)?;
        }

        Ok(())
    }

    fn quant_indices(&mut self, q: &QuantIndices) -> SynthesizerResult<()> {
        self.literal(q.y_ac_qi, 7)?;

        for delta in [
            q.y_dc_delta,
            q.y2_dc_delta,
            q.y2_ac_delta,
            q.uv_dc_delta,
            q.uv_ac_delta,
        ] {
            self.optional_signed(delta, 4)?;
        }

        Ok(())
    }

    fn frame_header(&mut self) -> SynthesizerResult<()> {
        let hdr = self.header;

        if hdr.key_frame {
            self.flag(hdr.color_space);
            self.flag(hdr.clamping_type);
        }

        self.segmentation(&hdr.segmentation)?;

        self.flag(hdr.filter_type);
        self.literal(hdr.loop_filter_level, 6)?;
        self.literal(hdr.sharpness_level, 3)?;

        self.mb_lf_adjustments(&hdr.mb_lf_adjust)?;

        self.literal(hdr.log2_nbr_of_dct_partitions, 2)?;

        self.quant_indices(&hdr.quant_indices)?;

        if hdr.key_frame {
            self.flag(hdr.refresh_entropy_probs);
        } else {
            self.flag(hdr.refresh_golden_frame);
            self.flag(hdr.refresh_alternate_frame);

            if !hdr.refresh_golden_frame {
                self.literal(hdr.copy_buffer_to_golden as u8, 2)?;
            }

            if !hdr.refresh_alternate_frame {
                self.literal(hdr.copy_buffer_to_alternate as u8, 2)?;
            }

            self.flag(hdr.sign_bias_golden);
            self.flag(hdr.sign_bias_alternate);
            self.flag(hdr.refresh_entropy_probs);
            self.flag(hdr.refresh_last);
        }

        Ok(())
    }
}
