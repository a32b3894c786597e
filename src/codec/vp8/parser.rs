// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use std::io::Cursor;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use enumn::N;
use log::debug;
use thiserror::Error;

use crate::codec::vp8::bool_decoder::BoolDecoder;
use crate::codec::vp8::bool_decoder::BoolDecoderError;
use crate::codec::vp8::bool_decoder::BoolDecoderResult;
use crate::Resolution;

/// Start code found after the frame tag of every key frame.
pub const START_CODE: u32 = 0x2a019d;

/// Size of the uncompressed data chunk of a key frame.
pub const KEY_FRAME_CHUNK_SIZE: usize = 10;
/// Size of the uncompressed data chunk of an inter frame.
pub const INTER_FRAME_CHUNK_SIZE: usize = 3;

/// Dequantization indices as parsed from the quant_indices() syntax.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QuantIndices {
    /// The dequantization table index used for the luma AC coefficients (and
    /// other coefficient groups if no delta value is present).
    pub y_ac_qi: u8,
    /// Indicates the delta value that is added to the baseline index to obtain
    /// the luma DC coefficient dequantization index.
    pub y_dc_delta: i8,
    /// Indicates the delta value that is added to the baseline index to obtain
    /// the Y2 block DC coefficient dequantization index.
    pub y2_dc_delta: i8,
    /// Indicates the delta value that is added to the baseline index to obtain
    /// the Y2 block AC coefficient dequantization index.
    pub y2_ac_delta: i8,
    /// Indicates the delta value that is added to the baseline index to obtain
    /// the chroma DC coefficient dequantization index.
    pub uv_dc_delta: i8,
    /// Indicates the delta value that is added to the baseline index to obtain
    /// the chroma AC coefficient dequantization index.
    pub uv_ac_delta: i8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MbLfAdjustments {
    /// Indicates if the MB-level loop filter adjustment (based on the used
    /// reference frame and coding mode) is on for the current frame.
    pub loop_filter_adj_enable: bool,
    /// Indicates if the delta values used in adjustment are updated in the
    /// current frame.
    pub mode_ref_lf_delta_update: bool,

    //if mode_ref_lf_delta_update == 1
    /// Indicates the adjustment delta value corresponding to a certain used
    /// reference frame.
    pub ref_frame_delta: [i8; 4],
    /// Indicates the adjustment delta value corresponding to a certain MB
    /// prediction mode
    pub mb_mode_delta: [i8; 4],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segmentation {
    /// Enables the segmentation feature for the current frame.
    pub segmentation_enabled: bool,
    /// Determines if the MB segmentation map is updated in the current frame.
    pub update_mb_segmentation_map: bool,
    /// indicates if the segment feature data is updated in the current frame.
    pub update_segment_feature_data: bool,

    // If update_segment_feature_data == 1
    /// Indicates the feature data update mode, O for delta and 1 for the
    /// absolute value.
    pub segment_feature_mode: bool,
    /// Indicates if the quantizer value is updated for the izh segment.
    pub quantizer_update_value: [i8; 4],
    /// Indicates the update value for the loop filter level.
    pub lf_update_value: [i8; 4],

    // if update_mb_segmentation_map == 1
    /// The branch probabilities of the segment id decoding tree.
    pub segment_prob: [u8; 3],
}

impl Default for Segmentation {
    fn default() -> Self {
        Self {
            segmentation_enabled: false,
            update_mb_segmentation_map: false,
            update_segment_feature_data: false,
            segment_feature_mode: false,
            quantizer_update_value: [0; 4],
            lf_update_value: [0; 4],
            segment_prob: [255; 3],
        }
    }
}

/// Source of the golden reference when it is not refreshed with the current frame.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum GoldenCopySource {
    #[default]
    None = 0,
    Last = 1,
    AltRef = 2,
}

/// Source of the alternate reference when it is not refreshed with the current frame.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum AltRefCopySource {
    #[default]
    None = 0,
    Last = 1,
    Golden = 2,
}

/// The parts of a VP8 frame header that drive decoding control: frame type, size, and how the
/// decoded frame updates the reference buffers.
///
/// The token and motion vector probability updates that follow `refresh_last` in the first
/// partition are left for the accelerator to read, starting at bit `header_size`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Indicates if the current frame is a key frame or not.
    pub key_frame: bool,
    /// Determines the bitstream version.
    pub version: u8,
    /// Indicates if the current frame is meant to be displayed or not.
    pub show_frame: bool,
    /// The size in bytes of the Uncompressed Data Chunk
    pub data_chunk_size: u8,
    /// Determines the size of the first partition (control partition) excluding
    /// the size of the Uncompressed Data Chunk
    pub first_part_size: u32,

    /// The frame's width, in pixels. Only present in the bitstream for key frames.
    pub width: u16,
    /// The frame's height, in pixels. Only present in the bitstream for key frames.
    pub height: u16,
    /// Horizontal scale code value.
    pub horiz_scale_code: u8,
    /// Vertical scale code value.
    pub vert_scale_code: u8,
    /// Defines the YUV color space of the sequence.
    pub color_space: bool,
    /// Specifies if the decoder is required to clamp the reconstructed pixel
    /// values.
    pub clamping_type: bool,
    /// Determines whether the normal or the simple loop filter is used.
    pub filter_type: bool,
    /// Controls the deblocking filter.
    pub loop_filter_level: u8,
    /// Controls the deblocking filter.
    pub sharpness_level: u8,
    /// Determines the number of separate partitions containing the DCT
    /// coefficients of the macroblocks.
    pub log2_nbr_of_dct_partitions: u8,

    pub partition_size: [u32; 8],

    /// Dequantizer indices.
    pub quant_indices: QuantIndices,
    /// Segmentation state in effect for this frame.
    pub segmentation: Segmentation,
    /// Loop filter adjustments in effect for this frame.
    pub mb_lf_adjust: MbLfAdjustments,

    /// Determines whether updated token probabilities are used only for this
    /// frame or until further update
    pub refresh_entropy_probs: bool,
    /// Determines if the current decoded frame refreshes the last frame
    /// reference buffer
    pub refresh_last: bool,

    /// Determines if the current decoded frame refreshes the golden frame.
    pub refresh_golden_frame: bool,
    /// Determines if the current decoded frame refreshes the alternate
    /// reference frame.
    pub refresh_alternate_frame: bool,
    /// Determines if the golden reference is replaced by another reference.
    pub copy_buffer_to_golden: GoldenCopySource,
    /// Determines if the alternate reference is replaced by another reference.
    pub copy_buffer_to_alternate: AltRefCopySource,
    /// Controls the sign of motion vectors when the golden frame is referenced.
    pub sign_bias_golden: bool,
    /// Controls the sign of motion vectors when the alternate frame is
    /// referenced.
    pub sign_bias_alternate: bool,

    /// Number of bits of the first partition consumed by the parser.
    pub header_size: u32,
}

#[derive(Debug, Error)]
pub enum ParseUncompressedChunkError {
    #[error("invalid start code {0:#x}")]
    InvalidStartCode(u32),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ComputePartitionSizesError {
    #[error("unexpected end of header")]
    EndOfHeader,
    #[error("partition size not fitting in a u32")]
    PartitionTooLarge,
}

impl Header {
    /// Returns the number of separate partitions containing the DCT coefficients of the
    /// macroblocks.
    pub fn num_dct_partitions(&self) -> usize {
        1 << self.log2_nbr_of_dct_partitions
    }

    /// Returns the size carried by this header. Only meaningful for key frames, or inter frames
    /// whose size has been filled in by the decoder.
    pub fn resolution(&self) -> Resolution {
        Resolution {
            width: u32::from(self.width),
            height: u32::from(self.height),
        }
    }

    /// Returns the total size of the encoded frame in bytes, as computed from the header.
    pub fn frame_len(&self) -> usize {
        // Uncompressed chunk size.
        std::iter::once(self.data_chunk_size as usize)
            // Size of first partition.
            .chain(std::iter::once(self.first_part_size as usize))
            // Size of the partitions description area.
            .chain(std::iter::once(self.num_dct_partitions().saturating_sub(1) * 3))
            // Size of other DCT partitions.
            .chain(self.partition_size.iter().take(self.num_dct_partitions()).map(|s| *s as usize))
            .sum()
    }

    /// Create a new `Header` by parsing the uncompressed data chunk of a frame.
    fn parse_uncompressed_data_chunk(
        bitstream: &[u8],
    ) -> Result<Self, ParseUncompressedChunkError> {
        debug!("Parsing VP8 uncompressed data chunk.");

        let mut reader = Cursor::new(bitstream);

        let frame_tag = reader.read_u24::<LittleEndian>()?;

        let mut header = Header {
            key_frame: (frame_tag & 0x1) == 0,
            version: ((frame_tag >> 1) & 0x07) as u8,
            show_frame: ((frame_tag >> 4) & 0x1) != 0,
            first_part_size: (frame_tag >> 5) & 0x7ffff,
            ..Default::default()
        };

        if header.key_frame {
            let start_code = reader.read_u24::<LittleEndian>()?;

            if start_code != START_CODE {
                return Err(ParseUncompressedChunkError::InvalidStartCode(start_code));
            }

            let size_code = reader.read_u16::<LittleEndian>()?;
            header.horiz_scale_code = (size_code >> 14) as u8;
            header.width = size_code & 0x3fff;

            let size_code = reader.read_u16::<LittleEndian>()?;
            header.vert_scale_code = (size_code >> 14) as u8;
            header.height = size_code & 0x3fff;
        }

        header.data_chunk_size = reader.position() as u8;
        Ok(header)
    }

    fn compute_partition_sizes(&mut self, data: &[u8]) -> Result<(), ComputePartitionSizesError> {
        let num_partitions = self.num_dct_partitions();
        let mut part_size_ofs = self.first_part_size as usize;
        let mut ofs = part_size_ofs + 3 * (num_partitions - 1);

        if ofs > data.len() {
            return Err(ComputePartitionSizesError::EndOfHeader);
        }

        for i in 0..num_partitions - 1 {
            let b0 = u32::from(data[part_size_ofs]);
            let b1 = u32::from(data[part_size_ofs + 1]) << 8;
            let b2 = u32::from(data[part_size_ofs + 2]) << 16;

            let part_size = b0 | b1 | b2;
            part_size_ofs += 3;

            self.partition_size[i] = part_size;
            ofs += part_size as usize;
        }

        if ofs > data.len() {
            return Err(ComputePartitionSizesError::EndOfHeader);
        }

        self.partition_size[num_partitions - 1] = u32::try_from(data.len() - ofs)
            .map_err(|_| ComputePartitionSizesError::PartitionTooLarge)?;
        Ok(())
    }
}

/// A VP8 frame.
pub struct Frame<'a> {
    /// The bitstream data for this frame.
    bitstream: &'a [u8],
    /// The actual length of the frame data within `bitstream`.
    frame_len: usize,
    /// The parsed frame header.
    pub header: Header,
}

impl<'a> Frame<'a> {
    /// Creates a frame covering the first `frame_len` bytes of `bitstream`.
    pub fn new(bitstream: &'a [u8], frame_len: usize, header: Header) -> Self {
        Self {
            bitstream,
            frame_len: std::cmp::min(frame_len, bitstream.len()),
            header,
        }
    }

    /// Number of bytes of the input this frame spans.
    pub fn frame_len(&self) -> usize {
        self.frame_len
    }
}

impl<'a> AsRef<[u8]> for Frame<'a> {
    fn as_ref(&self) -> &[u8] {
        &self.bitstream[..self.frame_len]
    }
}

/// A VP8 frame header parser based on GStreamer's vp8parser and Chromium's VP8 parser.
///
/// Segmentation and loop filter adjustments persist from one frame to the next until a key frame
/// resets them, so the same parser must see every frame of a stream in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parser {
    /// Segmentation data kept live across frames.
    segmentation: Segmentation,
    /// MbLfAdjustments data kept live across frames.
    mb_lf_adjust: MbLfAdjustments,
}

#[derive(Debug, Error)]
pub enum ParseFrameError {
    #[error("error while parsing uncompressed chunk of frame: {0}")]
    ParseUncompressedChunk(#[from] ParseUncompressedChunkError),
    #[error("partition end {0} is bigger than bitstream length {1}")]
    InvalidPartitionSize(usize, usize),
    #[error("error while parsing frame header: {0}")]
    ParseFrameHeader(#[from] BoolDecoderError),
    #[error("invalid reference copy mode {0}")]
    InvalidCopyMode(u8),
    #[error("error while computing frames partitions sizes: {0}")]
    ComputePartitionSizes(#[from] ComputePartitionSizesError),
    #[error("bitstream is shorter ({0} bytes) than computed length of frame {1}")]
    BitstreamTooShort(usize, usize),
}

impl Parser {
    pub fn segmentation(&self) -> &Segmentation {
        &self.segmentation
    }

    pub fn mb_lf_adjust(&self) -> &MbLfAdjustments {
        &self.mb_lf_adjust
    }

    fn update_segmentation(bd: &mut BoolDecoder, seg: &mut Segmentation) -> BoolDecoderResult<()> {
        seg.update_mb_segmentation_map = false;
        seg.update_segment_feature_data = false;

        seg.segmentation_enabled = bd.read_bool()?;
        if !seg.segmentation_enabled {
            return Ok(());
        }

        seg.update_mb_segmentation_map = bd.read_bool()?;
        seg.update_segment_feature_data = bd.read_bool()?;

        if seg.update_segment_feature_data {
            seg.segment_feature_mode = bd.read_bool()?;

            for value in seg.quantizer_update_value.iter_mut() {
                let update = bd.read_bool()?;
                if update {
                    *value = bd.read_sint(7)?;
                } else {
                    // quantizer_update_value defaults to zero if update flag is
                    // zero (Section 9.3, 4.b)
                    *value = 0;
                }
            }

            for value in seg.lf_update_value.iter_mut() {
                let update = bd.read_bool()?;
                if update {
                    *value = bd.read_sint(6)?;
                } else {
                    // lf_update_value defaults to zero if update flag is
                    // zero (Section 9.3, 4.b)
                    *value = 0;
                }
            }
        }

        if seg.update_mb_segmentation_map {
            for value in seg.segment_prob.iter_mut() {
                let update = bd.read_bool()?;
                if update {
                    *value = bd.read_uint(8)?;
                } else {
                    // segment_prob defaults to 255 if update flag is
                    // zero (Section 9.3, 5)
                    *value = 255;
                }
            }
        }

        Ok(())
    }

    fn parse_mb_lf_adjustments(
        bd: &mut BoolDecoder,
        adj: &mut MbLfAdjustments,
    ) -> BoolDecoderResult<()> {
        adj.mode_ref_lf_delta_update = false;

        adj.loop_filter_adj_enable = bd.read_bool()?;
        if !adj.loop_filter_adj_enable {
            return Ok(());
        }

        adj.mode_ref_lf_delta_update = bd.read_bool()?;
        if !adj.mode_ref_lf_delta_update {
            return Ok(());
        }

        for value in adj.ref_frame_delta.iter_mut() {
            let update = bd.read_bool()?;
            if update {
                *value = bd.read_sint(6)?;
            }
        }

        for value in adj.mb_mode_delta.iter_mut() {
            let update = bd.read_bool()?;
            if update {
                *value = bd.read_sint(6)?;
            }
        }

        Ok(())
    }

    fn read_quant_delta(bd: &mut BoolDecoder) -> BoolDecoderResult<i8> {
        if bd.read_bool()? {
            bd.read_sint(4)
        } else {
            Ok(0)
        }
    }

    fn parse_quant_indices(bd: &mut BoolDecoder, q: &mut QuantIndices) -> BoolDecoderResult<()> {
        q.y_ac_qi = bd.read_uint(7)?;
        q.y_dc_delta = Self::read_quant_delta(bd)?;
        q.y2_dc_delta = Self::read_quant_delta(bd)?;
        q.y2_ac_delta = Self::read_quant_delta(bd)?;
        q.uv_dc_delta = Self::read_quant_delta(bd)?;
        q.uv_ac_delta = Self::read_quant_delta(bd)?;

        Ok(())
    }

    fn parse_frame_header(&mut self, data: &[u8], frame: &mut Header) -> Result<(), ParseFrameError> {
        debug!("Parsing VP8 frame header.");
        let mut bd = BoolDecoder::new(data);

        if frame.key_frame {
            frame.color_space = bd.read_bool()?;
            frame.clamping_type = bd.read_bool()?;
        }

        Parser::update_segmentation(&mut bd, &mut self.segmentation)?;

        frame.filter_type = bd.read_bool()?;
        frame.loop_filter_level = bd.read_uint(6)?;
        frame.sharpness_level = bd.read_uint(3)?;

        Parser::parse_mb_lf_adjustments(&mut bd, &mut self.mb_lf_adjust)?;

        frame.log2_nbr_of_dct_partitions = bd.read_uint(2)?;

        Parser::parse_quant_indices(&mut bd, &mut frame.quant_indices)?;

        frame.copy_buffer_to_golden = GoldenCopySource::None;
        frame.copy_buffer_to_alternate = AltRefCopySource::None;

        if frame.key_frame {
            frame.refresh_entropy_probs = bd.read_bool()?;

            frame.refresh_last = true;
            frame.refresh_golden_frame = true;
            frame.refresh_alternate_frame = true;
        } else {
            frame.refresh_golden_frame = bd.read_bool()?;
            frame.refresh_alternate_frame = bd.read_bool()?;

            if !frame.refresh_golden_frame {
                let mode = bd.read_uint(2)?;
                frame.copy_buffer_to_golden =
                    GoldenCopySource::n(mode).ok_or(ParseFrameError::InvalidCopyMode(mode))?;
            }

            if !frame.refresh_alternate_frame {
                let mode = bd.read_uint(2)?;
                frame.copy_buffer_to_alternate =
                    AltRefCopySource::n(mode).ok_or(ParseFrameError::InvalidCopyMode(mode))?;
            }

            frame.sign_bias_golden = bd.read_bool()?;
            frame.sign_bias_alternate = bd.read_bool()?;
            frame.refresh_entropy_probs = bd.read_bool()?;
            frame.refresh_last = bd.read_bool()?;
        }

        frame.segmentation = self.segmentation.clone();
        frame.mb_lf_adjust = self.mb_lf_adjust.clone();
        frame.header_size = bd.pos() as u32;

        Ok(())
    }

    /// Parse a single frame from the chunk in `data`.
    pub fn parse_frame<'a>(&mut self, bitstream: &'a [u8]) -> Result<Frame<'a>, ParseFrameError> {
        let mut header = Header::parse_uncompressed_data_chunk(bitstream)?;
        // Key frames reset the persistent state. It is only replaced once the frame is valid.
        let mut next = if header.key_frame {
            Default::default()
        } else {
            self.clone()
        };

        let data_chunk_size = header.data_chunk_size as usize;
        let first_part_end = data_chunk_size + header.first_part_size as usize;

        if first_part_end > bitstream.len() {
            return Err(ParseFrameError::InvalidPartitionSize(first_part_end, bitstream.len()));
        }

        let compressed_area = &bitstream[data_chunk_size..];

        next.parse_frame_header(&bitstream[data_chunk_size..first_part_end], &mut header)?;
        header.compute_partition_sizes(compressed_area)?;

        let frame_len = header.frame_len();
        if frame_len > bitstream.len() {
            return Err(ParseFrameError::BitstreamTooShort(bitstream.len(), frame_len));
        }

        *self = next;

        debug!(
            "Parsed VP8 {} frame, {} bytes",
            if header.key_frame { "key" } else { "inter" },
            frame_len
        );

        Ok(Frame::new(bitstream, frame_len, header))
    }
}
