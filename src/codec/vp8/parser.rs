// Copyright 2022 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A VP8 frame header parser, following RFC 6386 and based on Chromium's and
//! GStreamer's VP8 parsers.
//!
//! A frame is laid out as a byte-aligned frame tag (3 bytes, plus 7 more for
//! key frames), the boolean-coded first partition holding the frame header and
//! the per-macroblock modes, a byte-aligned table of DCT partition sizes, and
//! the DCT partitions themselves.
//!
//! Segmentation, loop filter adjustments and probabilities persist between
//! frames in a [`PersistentState`], which the caller owns and passes to
//! [`parse_frame`] for every frame of a stream, in decode order.

use std::io::Cursor;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use enumn::N;
use log::debug;
use log::warn;
use thiserror::Error;

use crate::codec::vp8::bool_decoder::BoolDecoder;
use crate::codec::vp8::bool_decoder::BoolDecoderError;
use crate::codec::vp8::bool_decoder::BoolDecoderResult;
use crate::codec::vp8::bool_decoder::BoolDecoderState;
use crate::codec::vp8::probs::COEFF_DEFAULT_PROBS;
use crate::codec::vp8::probs::COEFF_UPDATE_PROBS;
use crate::codec::vp8::probs::KF_UV_MODE_PROBS;
use crate::codec::vp8::probs::KF_Y_MODE_PROBS;
use crate::codec::vp8::probs::MV_DEFAULT_PROBS;
use crate::codec::vp8::probs::MV_UPDATE_PROBS;
use crate::codec::vp8::probs::NK_UV_MODE_PROBS;
use crate::codec::vp8::probs::NK_Y_MODE_PROBS;
use crate::Resolution;

pub const MAX_MB_SEGMENTS: usize = 4;
pub const NUM_MB_FEATURE_TREE_PROBS: usize = 3;
pub const NUM_REF_LF_DELTAS: usize = 4;
pub const NUM_MODE_LF_DELTAS: usize = 4;

pub const NUM_BLOCK_TYPES: usize = 4;
pub const NUM_COEFF_BANDS: usize = 8;
pub const NUM_PREV_COEFF_CONTEXTS: usize = 3;
pub const NUM_ENTROPY_NODES: usize = 11;

pub const NUM_MV_CONTEXTS: usize = 2;
pub const NUM_MV_PROBS: usize = 19;

pub const NUM_Y_MODE_PROBS: usize = 4;
pub const NUM_UV_MODE_PROBS: usize = 3;

pub const MAX_DCT_PARTITIONS: usize = 8;

/// Segment tree probability used when none is coded.
pub const DEFAULT_SEGMENT_PROB: u8 = 255;

/// Start code following the frame tag of key frames, read little-endian.
const START_CODE: u32 = 0x2a019d;

/// Size in bytes of each entry of the DCT partition size table.
const PARTITION_SIZE_BYTES: usize = 3;

pub type CoeffProbs =
    [[[[u8; NUM_ENTROPY_NODES]; NUM_PREV_COEFF_CONTEXTS]; NUM_COEFF_BANDS]; NUM_BLOCK_TYPES];
pub type MvProbs = [[u8; NUM_MV_PROBS]; NUM_MV_CONTEXTS];

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SegmentFeatureMode {
    #[default]
    Delta = 0,
    Absolute = 1,
}

#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoopFilterType {
    #[default]
    Normal = 0,
    Simple = 1,
}

/// Which buffer, if any, replaces the golden reference when it is not
/// refreshed with the current frame.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CopyBufferToGolden {
    #[default]
    NoCopy = 0,
    LastFrame = 1,
    AltRefFrame = 2,
}

/// Which buffer, if any, replaces the alternate reference when it is not
/// refreshed with the current frame.
#[derive(N, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CopyBufferToAlternate {
    #[default]
    NoCopy = 0,
    LastFrame = 1,
    GoldenFrame = 2,
}

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

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Segmentation {
    /// Enables the segmentation feature for the current frame.
    pub segmentation_enabled: bool,
    /// Determines if the MB segmentation map is updated in the current frame.
    pub update_mb_segmentation_map: bool,
    /// indicates if the segment feature data is updated in the current frame.
    pub update_segment_feature_data: bool,

    // If update_segment_feature_data == 1
    /// Indicates the feature data update mode, delta or absolute value.
    pub segment_feature_mode: SegmentFeatureMode,
    /// The quantizer value of each segment.
    pub quantizer_update_value: [i8; MAX_MB_SEGMENTS],
    /// The loop filter level value of each segment.
    pub lf_update_value: [i8; MAX_MB_SEGMENTS],

    // if update_mb_segmentation_map == 1
    /// The branch probabilities of the segment id decoding tree.
    pub segment_prob: [u8; NUM_MB_FEATURE_TREE_PROBS],
}

impl Default for Segmentation {
    fn default() -> Self {
        Self {
            segmentation_enabled: false,
            update_mb_segmentation_map: false,
            update_segment_feature_data: false,
            segment_feature_mode: Default::default(),
            quantizer_update_value: Default::default(),
            lf_update_value: Default::default(),
            segment_prob: [DEFAULT_SEGMENT_PROB; NUM_MB_FEATURE_TREE_PROBS],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopFilter {
    /// Determines whether the normal or the simple loop filter is used.
    pub filter_type: LoopFilterType,
    /// Controls the deblocking filter.
    pub level: u8,
    /// Controls the deblocking filter.
    pub sharpness_level: u8,
    /// Indicates if the MB-level loop filter adjustment (based on the used
    /// reference frame and coding mode) is on for the current frame.
    pub loop_filter_adj_enable: bool,
    /// Indicates if the delta values used in adjustment are updated in the
    /// current frame.
    pub mode_ref_lf_delta_update: bool,

    //if mode_ref_lf_delta_update == 1
    /// Indicates the adjustment delta value corresponding to a certain used
    /// reference frame.
    pub ref_frame_delta: [i8; NUM_REF_LF_DELTAS],
    /// Indicates the adjustment delta value corresponding to a certain MB
    /// prediction mode
    pub mb_mode_delta: [i8; NUM_MODE_LF_DELTAS],
}

/// Probability tables driving the boolean decoding of coefficients, modes
/// and motion vectors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntropyProbs {
    /// Branch probabilities of the DCT/WHT token tree.
    pub coeff_probs: CoeffProbs,
    /// Branch probabilities of the luma intra prediction mode tree.
    pub y_mode_probs: [u8; NUM_Y_MODE_PROBS],
    /// Branch probabilities of the chroma intra prediction mode tree.
    pub uv_mode_probs: [u8; NUM_UV_MODE_PROBS],
    /// Motion vector decoding probabilities.
    pub mv_probs: MvProbs,
}

impl Default for EntropyProbs {
    fn default() -> Self {
        Self {
            coeff_probs: COEFF_DEFAULT_PROBS,
            y_mode_probs: NK_Y_MODE_PROBS,
            uv_mode_probs: NK_UV_MODE_PROBS,
            mv_probs: MV_DEFAULT_PROBS,
        }
    }
}

/// State kept live across frames of a stream.
///
/// Reset to its defaults by every key frame, and otherwise only changed
/// field by field as instructed by the frame headers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersistentState {
    pub segmentation: Segmentation,
    pub loop_filter: LoopFilter,
    pub entropy: EntropyProbs,
}

impl PersistentState {
    pub fn reset_to_defaults(&mut self) {
        *self = Default::default();
    }
}

/// Position and size of a DCT partition, relative to the start of the DCT
/// partitions area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DctPartition {
    pub offset: usize,
    pub size: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartitionLayout {
    /// Offset in bytes of the first DCT partition from the start of the frame.
    pub data_offset: usize,
    pub partitions: Vec<DctPartition>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    /// Indicates if the current frame is a key frame or not.
    pub key_frame: bool,
    /// Determines the bitstream version.
    pub version: u8,
    /// Set for versions above 3, which are not defined by RFC 6386.
    pub is_experimental: bool,
    /// Indicates if the current frame is meant to be displayed or not.
    pub show_frame: bool,
    /// Determines the size of the first partition (control partition) excluding
    /// the size of the Uncompressed Data Chunk
    pub first_part_size: u32,

    /// The frame's width, in pixels.
    pub width: u16,
    /// The frame's height, in pixels.
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

    /// Segmentation parameters in effect for this frame.
    pub segmentation: Segmentation,
    /// Loop filter parameters in effect for this frame.
    pub loop_filter: LoopFilter,
    /// Dequantizer indices.
    pub quant_indices: QuantIndices,

    /// Determines the number of separate partitions containing the DCT
    /// coefficients of the macroblocks.
    log2_nbr_of_dct_partitions: u8,

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
    pub copy_buffer_to_golden: CopyBufferToGolden,
    /// Determines if the alternate reference is replaced by another reference.
    pub copy_buffer_to_alternate: CopyBufferToAlternate,
    /// Controls the sign of motion vectors when the golden frame is referenced.
    pub sign_bias_golden: bool,
    /// Controls the sign of motion vectors when the alternate frame is
    /// referenced.
    pub sign_bias_alternate: bool,

    /// Probabilities to use for this frame, including this frame's updates
    /// even if they are not kept for the next frames.
    pub entropy: EntropyProbs,

    /// Enables or disables the skipping of macroblocks containing no non-zero
    /// coefficients.
    pub mb_no_coeff_skip: bool,
    /// The probability that the macroblock is not skipped (flag indicating
    /// skipped macroblock is false).
    pub prob_skip_false: u8,
    /// The probability of an intra macroblock.
    pub prob_intra: u8,
    /// The probability that the last reference frame is used for inter
    /// prediction.
    pub prob_last: u8,
    /// The probability that the golden reference frame is used for inter
    /// prediction.
    pub prob_golden: u8,

    /// Size in bytes of the whole frame.
    pub frame_size: usize,
    /// Offset in bytes of the first partition from the start of the frame,
    /// i.e. the size of the Uncompressed Data Chunk.
    pub first_part_offset: usize,
    /// Offset in bits of the first macroblock header from
    /// `first_part_offset`.
    pub macroblock_bit_offset: usize,
    /// Set if parsing the frame header consumed more bits than the first
    /// partition holds. The missing bits were read as zeros.
    pub first_part_exhausted: bool,

    /// Boolean decoder `range` at the first macroblock.
    pub bd_range: usize,
    /// Boolean decoder `value` at the first macroblock.
    pub bd_value: usize,
    /// Boolean decoder `count` at the first macroblock.
    pub bd_count: isize,

    /// Location of the DCT partitions.
    pub dct_partitions: PartitionLayout,
}

#[derive(Debug, Error)]
pub enum ComputePartitionSizesError {
    #[error("invalid number of DCT partitions {0}")]
    InvalidPartitionCount(usize),
    #[error("unexpected end of header")]
    EndOfHeader,
    #[error("DCT partition {index} is {size} bytes but only {available} are left")]
    PartitionTooLarge { index: usize, size: usize, available: usize },
    #[error("DCT partition {0} is empty")]
    EmptyPartition(usize),
}

/// Outcome of parsing a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseStatus {
    /// The header is populated and the persistent state committed.
    Ok,
    /// The bitstream is self-inconsistent. Skipping to the next key frame
    /// resynchronizes the stream.
    BrokenData,
    /// The caller passed invalid input.
    Error,
}

impl ParseStatus {
    pub fn of<T>(result: &Result<T, ParseFrameError>) -> Self {
        match result {
            Ok(_) => ParseStatus::Ok,
            Err(err) => err.status(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ParseFrameError {
    #[error("empty bitstream")]
    EmptyBitstream,
    #[error("bitstream of {0} bytes is too short for the frame tag")]
    FrameTagTooShort(usize),
    #[error("invalid start code {0:#08x}")]
    InvalidStartCode(u32),
    #[error("invalid key frame dimensions {0}x{1}")]
    InvalidDimensions(u16, u16),
    #[error("first partition is empty")]
    EmptyFirstPartition,
    #[error("partition end {0} is bigger than bitstream length {1}")]
    InvalidPartitionSize(usize, usize),
    #[error("invalid value {1} for {0}")]
    InvalidValue(&'static str, u8),
    #[error("error while parsing frame header: {0}")]
    ParseFrameHeader(#[from] BoolDecoderError),
    #[error("error while computing frames partitions sizes: {0}")]
    ComputePartitionSizes(#[from] ComputePartitionSizesError),
}

impl ParseFrameError {
    pub fn status(&self) -> ParseStatus {
        match self {
            ParseFrameError::EmptyBitstream => ParseStatus::Error,
            _ => ParseStatus::BrokenData,
        }
    }
}

impl Header {
    /// Returns the number of separate partitions containing the DCT coefficients of the
    /// macroblocks.
    pub fn num_dct_partitions(&self) -> usize {
        1 << self.log2_nbr_of_dct_partitions
    }

    /// Returns the frame dimensions. Only meaningful for key frames, inter frames keep the
    /// dimensions of the last key frame.
    pub fn resolution(&self) -> Resolution {
        Resolution { width: u32::from(self.width), height: u32::from(self.height) }
    }

    /// Returns the position of the first macroblock header as a byte offset from the start of
    /// the frame and a bit offset within that byte.
    pub fn macroblock_position(&self) -> (usize, u8) {
        let bits = self.first_part_offset * 8 + self.macroblock_bit_offset;

        (bits / 8, (bits % 8) as u8)
    }

    /// Returns the total size of the encoded frame in bytes, as computed from the header.
    pub fn frame_len(&self) -> usize {
        // Uncompressed chunk size.
        std::iter::once(self.first_part_offset)
            // Size of first partition.
            .chain(std::iter::once(self.first_part_size as usize))
            // Size of the partitions description area.
            .chain(std::iter::once(self.num_dct_partitions().saturating_sub(1) * 3))
            // Size of DCT partitions.
            .chain(self.dct_partitions.partitions.iter().map(|p| p.size))
            .sum()
    }

    /// Create a new `Header` by parsing the uncompressed data chunk of a frame.
    fn parse_uncompressed_data_chunk(bitstream: &[u8]) -> Result<Self, ParseFrameError> {
        debug!("Parsing VP8 uncompressed data chunk.");

        let too_short = |_: std::io::Error| ParseFrameError::FrameTagTooShort(bitstream.len());
        let mut reader = Cursor::new(bitstream);

        let frame_tag = reader.read_u24::<LittleEndian>().map_err(too_short)?;
        let version = ((frame_tag >> 1) & 0x07) as u8;

        let mut header = Header {
            key_frame: (frame_tag & 0x1) == 0,
            version,
            is_experimental: version > 3,
            show_frame: ((frame_tag >> 4) & 0x1) != 0,
            first_part_size: (frame_tag >> 5) & 0x7ffff,
            frame_size: bitstream.len(),
            ..Default::default()
        };

        if header.key_frame {
            let start_code = reader.read_u24::<LittleEndian>().map_err(too_short)?;
            if start_code != START_CODE {
                return Err(ParseFrameError::InvalidStartCode(start_code));
            }

            let size_code = reader.read_u16::<LittleEndian>().map_err(too_short)?;
            header.horiz_scale_code = (size_code >> 14) as u8;
            header.width = size_code & 0x3fff;

            let size_code = reader.read_u16::<LittleEndian>().map_err(too_short)?;
            header.vert_scale_code = (size_code >> 14) as u8;
            header.height = size_code & 0x3fff;

            if header.width == 0 || header.height == 0 {
                return Err(ParseFrameError::InvalidDimensions(header.width, header.height));
            }
        }

        header.first_part_offset = reader.position() as usize;
        Ok(header)
    }

    /// Parses the boolean-coded frame header at the start of the first partition, updating
    /// `state` along the way.
    fn parse_frame_header(
        &mut self,
        first_part: &[u8],
        state: &mut PersistentState,
    ) -> Result<(), ParseFrameError> {
        debug!("Parsing VP8 frame header.");
        let mut bd = BoolDecoder::new(first_part);

        if self.key_frame {
            self.color_space = bd.read_bool();
            self.clamping_type = bd.read_bool();
        }

        parse_segmentation(&mut bd, &mut state.segmentation)?;
        self.segmentation = state.segmentation.clone();

        parse_loop_filter(&mut bd, &mut state.loop_filter)?;
        self.loop_filter = state.loop_filter.clone();

        self.log2_nbr_of_dct_partitions = bd.read_uint(2)?;

        parse_quant_indices(&mut bd, &mut self.quant_indices)?;

        if self.key_frame {
            self.refresh_entropy_probs = bd.read_bool();

            self.refresh_last = true;
            self.refresh_golden_frame = true;
            self.refresh_alternate_frame = true;
        } else {
            self.refresh_golden_frame = bd.read_bool();
            self.refresh_alternate_frame = bd.read_bool();

            if !self.refresh_golden_frame {
                let mode = bd.read_uint::<u8>(2)?;
                self.copy_buffer_to_golden = CopyBufferToGolden::n(mode)
                    .ok_or(ParseFrameError::InvalidValue("copy_buffer_to_golden", mode))?;
            }

            if !self.refresh_alternate_frame {
                let mode = bd.read_uint::<u8>(2)?;
                self.copy_buffer_to_alternate = CopyBufferToAlternate::n(mode)
                    .ok_or(ParseFrameError::InvalidValue("copy_buffer_to_alternate", mode))?;
            }

            self.sign_bias_golden = bd.read_bool();
            self.sign_bias_alternate = bd.read_bool();
            self.refresh_entropy_probs = bd.read_bool();
            self.refresh_last = bd.read_bool();
        }

        // Updates go to a copy, which only replaces the persistent probabilities if
        // refresh_entropy_probs is set.
        let mut entropy = state.entropy.clone();

        parse_token_prob_update(&mut bd, &mut entropy.coeff_probs);

        self.mb_no_coeff_skip = bd.read_bool();
        if self.mb_no_coeff_skip {
            self.prob_skip_false = bd.read_uint(8)?;
        }

        if !self.key_frame {
            self.prob_intra = bd.read_uint(8)?;
            self.prob_last = bd.read_uint(8)?;
            self.prob_golden = bd.read_uint(8)?;

            parse_mode_prob_update(&mut bd, &mut entropy)?;
            parse_mv_prob_update(&mut bd, &mut entropy.mv_probs)?;
        }

        if self.refresh_entropy_probs {
            state.entropy = entropy.clone();
        }

        if self.key_frame {
            // Key frames use fixed intra mode probabilities, which are not kept.
            entropy.y_mode_probs = KF_Y_MODE_PROBS;
            entropy.uv_mode_probs = KF_UV_MODE_PROBS;
        }

        self.entropy = entropy;

        self.macroblock_bit_offset = bd.pos();
        self.first_part_exhausted = bd.is_past_end();
        if self.first_part_exhausted {
            warn!(
                "VP8 frame header needs {} bits but the first partition only has {}",
                self.macroblock_bit_offset,
                first_part.len() * 8
            );
        }

        let bd_state: BoolDecoderState = bd.into();
        self.bd_range = bd_state.range;
        self.bd_value = bd_state.value;
        self.bd_count = bd_state.count;

        Ok(())
    }
}

/// Reads an optional signed value, preceded by its presence flag.
fn read_optional_sint(bd: &mut BoolDecoder<&[u8]>, nbits: usize) -> BoolDecoderResult<Option<i8>> {
    if bd.read_flag() {
        bd.read_sint(nbits).map(Some)
    } else {
        Ok(None)
    }
}

fn parse_segmentation(
    bd: &mut BoolDecoder<&[u8]>,
    seg: &mut Segmentation,
) -> Result<(), ParseFrameError> {
    seg.update_mb_segmentation_map = false;
    seg.update_segment_feature_data = false;

    seg.segmentation_enabled = bd.read_bool();
    if !seg.segmentation_enabled {
        return Ok(());
    }

    seg.update_mb_segmentation_map = bd.read_bool();
    seg.update_segment_feature_data = bd.read_bool();

    if seg.update_segment_feature_data {
        let mode = bd.read_uint::<u8>(1)?;
        seg.segment_feature_mode = SegmentFeatureMode::n(mode)
            .ok_or(ParseFrameError::InvalidValue("segment_feature_mode", mode))?;

        // Values that are not coded default to zero (Section 9.3, 4.b).
        for value in seg.quantizer_update_value.iter_mut() {
            *value = read_optional_sint(bd, 7)?.unwrap_or(0);
        }

        for value in seg.lf_update_value.iter_mut() {
            *value = read_optional_sint(bd, 6)?.unwrap_or(0);
        }
    }

    if seg.update_mb_segmentation_map {
        // Probabilities that are not coded default to 255 (Section 9.3, 5).
        for prob in seg.segment_prob.iter_mut() {
            *prob = if bd.read_flag() { bd.read_uint(8)? } else { DEFAULT_SEGMENT_PROB };
        }
    }

    Ok(())
}

fn parse_loop_filter(
    bd: &mut BoolDecoder<&[u8]>,
    lf: &mut LoopFilter,
) -> Result<(), ParseFrameError> {
    let filter_type = bd.read_uint::<u8>(1)?;
    lf.filter_type = LoopFilterType::n(filter_type)
        .ok_or(ParseFrameError::InvalidValue("filter_type", filter_type))?;
    lf.level = bd.read_uint(6)?;
    lf.sharpness_level = bd.read_uint(3)?;

    lf.mode_ref_lf_delta_update = false;

    lf.loop_filter_adj_enable = bd.read_bool();
    if !lf.loop_filter_adj_enable {
        return Ok(());
    }

    lf.mode_ref_lf_delta_update = bd.read_bool();
    if !lf.mode_ref_lf_delta_update {
        return Ok(());
    }

    for value in lf.ref_frame_delta.iter_mut().chain(lf.mb_mode_delta.iter_mut()) {
        if let Some(delta) = read_optional_sint(bd, 6)? {
            *value = delta;
        }
    }

    Ok(())
}

fn parse_quant_indices(bd: &mut BoolDecoder<&[u8]>, q: &mut QuantIndices) -> BoolDecoderResult<()> {
    q.y_ac_qi = bd.read_uint(7)?;

    q.y_dc_delta = read_optional_sint(bd, 4)?.unwrap_or(0);
    q.y2_dc_delta = read_optional_sint(bd, 4)?.unwrap_or(0);
    q.y2_ac_delta = read_optional_sint(bd, 4)?.unwrap_or(0);
    q.uv_dc_delta = read_optional_sint(bd, 4)?.unwrap_or(0);
    q.uv_ac_delta = read_optional_sint(bd, 4)?.unwrap_or(0);

    Ok(())
}

fn parse_token_prob_update(bd: &mut BoolDecoder<&[u8]>, coeff_probs: &mut CoeffProbs) {
    for (i, vi) in coeff_probs.iter_mut().enumerate() {
        for (j, vj) in vi.iter_mut().enumerate() {
            for (k, vk) in vj.iter_mut().enumerate() {
                for (l, prob) in vk.iter_mut().enumerate() {
                    if bd.read_bool_with_prob(COEFF_UPDATE_PROBS[i][j][k][l]) {
                        *prob = bd.read_literal(8) as u8;
                    }
                }
            }
        }
    }
}

fn parse_mode_prob_update(
    bd: &mut BoolDecoder<&[u8]>,
    entropy: &mut EntropyProbs,
) -> BoolDecoderResult<()> {
    let intra_16x16_prob_update_flag = bd.read_bool();
    if intra_16x16_prob_update_flag {
        for prob in entropy.y_mode_probs.iter_mut() {
            *prob = bd.read_uint(8)?;
        }
    }

    let intra_chroma_prob_update_flag = bd.read_bool();
    if intra_chroma_prob_update_flag {
        for prob in entropy.uv_mode_probs.iter_mut() {
            *prob = bd.read_uint(8)?;
        }
    }

    Ok(())
}

fn parse_mv_prob_update(bd: &mut BoolDecoder<&[u8]>, mv_probs: &mut MvProbs) -> BoolDecoderResult<()> {
    for (i, vi) in mv_probs.iter_mut().enumerate() {
        for (j, prob) in vi.iter_mut().enumerate() {
            if bd.read_bool_with_prob(MV_UPDATE_PROBS[i][j]) {
                let mv_prob_update = bd.read_uint::<u8>(7)?;

                *prob = if mv_prob_update > 0 { mv_prob_update << 1 } else { 1 };
            }
        }
    }

    Ok(())
}

/// Locates the DCT partitions of `bitstream`.
///
/// `first_part_end` is the offset of the byte following the first partition,
/// where the table of the sizes of all DCT partitions but the last starts. The
/// last partition spans the rest of the frame.
pub fn compute_partition_layout(
    bitstream: &[u8],
    first_part_end: usize,
    num_partitions: usize,
) -> Result<PartitionLayout, ComputePartitionSizesError> {
    if num_partitions == 0 || num_partitions > MAX_DCT_PARTITIONS {
        return Err(ComputePartitionSizesError::InvalidPartitionCount(num_partitions));
    }

    let data_offset = first_part_end + PARTITION_SIZE_BYTES * (num_partitions - 1);
    let size_table =
        bitstream.get(first_part_end..data_offset).ok_or(ComputePartitionSizesError::EndOfHeader)?;
    let mut size_table = Cursor::new(size_table);

    let mut bytes_left = bitstream.len() - data_offset;
    let mut offset = 0;
    let mut partitions = Vec::with_capacity(num_partitions);

    for index in 0..num_partitions {
        let size = if index + 1 < num_partitions {
            size_table
                .read_u24::<LittleEndian>()
                .map_err(|_| ComputePartitionSizesError::EndOfHeader)? as usize
        } else {
            bytes_left
        };

        if size == 0 {
            return Err(ComputePartitionSizesError::EmptyPartition(index));
        }

        if size > bytes_left {
            return Err(ComputePartitionSizesError::PartitionTooLarge {
                index,
                size,
                available: bytes_left,
            });
        }

        partitions.push(DctPartition { offset, size });
        offset += size;
        bytes_left -= size;
    }

    Ok(PartitionLayout { data_offset, partitions })
}

/// A VP8 frame.
#[derive(Debug)]
pub struct Frame<'a> {
    /// The bitstream data for this frame.
    pub bitstream: &'a [u8],
    /// The parsed frame header.
    pub header: Header,
}

impl<'a> AsRef<[u8]> for Frame<'a> {
    fn as_ref(&self) -> &[u8] {
        self.bitstream
    }
}

impl<'a> Frame<'a> {
    /// Returns the first partition, holding the frame header and the macroblock modes.
    pub fn first_partition(&self) -> &'a [u8] {
        let start = self.header.first_part_offset;

        self.bitstream.get(start..start + self.header.first_part_size as usize).unwrap_or_default()
    }

    /// Returns the data of DCT partition `index`, if it exists.
    pub fn dct_partition(&self, index: usize) -> Option<&'a [u8]> {
        let layout = &self.header.dct_partitions;
        let partition = layout.partitions.get(index)?;
        let start = layout.data_offset + partition.offset;

        self.bitstream.get(start..start + partition.size)
    }
}

/// Parses a single frame from `bitstream`, which must hold exactly one frame.
///
/// `state` carries the segmentation, loop filter and probability state of the
/// stream from one frame to the next. It is only updated if the whole frame
/// parses successfully.
pub fn parse_frame<'a>(
    state: &mut PersistentState,
    bitstream: &'a [u8],
) -> Result<Frame<'a>, ParseFrameError> {
    if bitstream.is_empty() {
        return Err(ParseFrameError::EmptyBitstream);
    }

    let mut header = Header::parse_uncompressed_data_chunk(bitstream)?;

    let mut next_state = state.clone();
    if header.key_frame {
        next_state.reset_to_defaults();
    }

    if header.first_part_size == 0 {
        return Err(ParseFrameError::EmptyFirstPartition);
    }

    let first_part_end = header.first_part_offset + header.first_part_size as usize;
    if first_part_end > bitstream.len() {
        return Err(ParseFrameError::InvalidPartitionSize(first_part_end, bitstream.len()));
    }

    header.parse_frame_header(&bitstream[header.first_part_offset..first_part_end], &mut next_state)?;

    debug!("Computing VP8 partition layout.");
    header.dct_partitions =
        compute_partition_layout(bitstream, first_part_end, header.num_dct_partitions())?;

    *state = next_state;

    Ok(Frame { bitstream, header })
}

/// A VP8 parser owning the persistent state of a single stream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parser {
    state: PersistentState,
}

impl Parser {
    /// Returns the state that will be used to parse the next frame.
    pub fn state(&self) -> &PersistentState {
        &self.state
    }

    pub fn segmentation(&self) -> &Segmentation {
        &self.state.segmentation
    }

    pub fn loop_filter(&self) -> &LoopFilter {
        &self.state.loop_filter
    }

    /// Parse a single frame from the chunk in `bitstream`.
    pub fn parse_frame<'a>(&mut self, bitstream: &'a [u8]) -> Result<Frame<'a>, ParseFrameError> {
        parse_frame(&mut self.state, bitstream).map_err(|err| {
            warn!("Dropping VP8 frame: {}", err);
            err
        })
    }
}
