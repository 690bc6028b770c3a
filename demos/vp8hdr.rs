// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! vp8hdr, dumps the frame headers of a VP8 IVF file as parsed by cros-vp8-parser.

use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::anyhow;
use anyhow::Context;
use argh::FromArgs;

use cros_vp8_parser::bitstream_utils::IvfFileHeader;
use cros_vp8_parser::bitstream_utils::IvfIterator;
use cros_vp8_parser::codec::vp8::parser::Frame;
use cros_vp8_parser::codec::vp8::parser::ParseStatus;
use cros_vp8_parser::codec::vp8::parser::Parser;

/// Dumps the frame headers of a VP8 stream
#[derive(Debug, FromArgs)]
struct Args {
    /// input IVF file
    #[argh(positional)]
    input: PathBuf,

    /// maximum number of frames to parse
    #[argh(option)]
    frames: Option<usize>,

    /// whether to also dump segmentation, loop filter and partition details
    #[argh(switch, short = 'v')]
    verbose: bool,
}

fn dump_frame(index: usize, frame: &Frame, verbose: bool) {
    let hdr = &frame.header;

    println!(
        "frame {}: {} version={}{} show={} size={} first_part={}@{} qi={} partitions={} mb={:?}",
        index,
        if hdr.key_frame { "key" } else { "inter" },
        hdr.version,
        if hdr.is_experimental { " (experimental)" } else { "" },
        hdr.show_frame,
        hdr.frame_size,
        hdr.first_part_size,
        hdr.first_part_offset,
        hdr.quant_indices.y_ac_qi,
        hdr.num_dct_partitions(),
        hdr.macroblock_position(),
    );

    if hdr.key_frame {
        println!("  resolution: {}x{}", hdr.width, hdr.height);
    }

    if !verbose {
        return;
    }

    println!("  segmentation: {:?}", hdr.segmentation);
    println!("  loop filter: {:?}", hdr.loop_filter);
    println!("  quantizer: {:?}", hdr.quant_indices);
    println!(
        "  refresh: last={} golden={} alt={} entropy={} copy golden={:?} alt={:?}",
        hdr.refresh_last,
        hdr.refresh_golden_frame,
        hdr.refresh_alternate_frame,
        hdr.refresh_entropy_probs,
        hdr.copy_buffer_to_golden,
        hdr.copy_buffer_to_alternate,
    );
    println!(
        "  bool decoder: range={} value={} count={}{}",
        hdr.bd_range,
        hdr.bd_value,
        hdr.bd_count,
        if hdr.first_part_exhausted { " (first partition exhausted)" } else { "" },
    );
    for (i, partition) in hdr.dct_partitions.partitions.iter().enumerate() {
        println!(
            "  partition {}: offset={} size={}",
            i,
            hdr.dct_partitions.data_offset + partition.offset,
            partition.size
        );
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Args = argh::from_env();

    let input = {
        let mut buf = Vec::new();
        File::open(&args.input)
            .and_then(|mut file| file.read_to_end(&mut buf))
            .with_context(|| format!("error reading {}", args.input.display()))?;
        buf
    };

    let ivf_header = IvfFileHeader::read_from(&mut &input[..])
        .context("error reading IVF header")?
        .ok_or_else(|| anyhow!("{} is not an IVF file", args.input.display()))?;
    if ivf_header.codec != IvfFileHeader::CODEC_VP8 {
        return Err(anyhow!(
            "unsupported codec {}",
            String::from_utf8_lossy(&ivf_header.codec)
        ));
    }
    println!(
        "{}x{}, {} frames",
        ivf_header.width, ivf_header.height, ivf_header.frame_count
    );

    let mut parser = Parser::default();
    let mut broken = 0;

    let frames = IvfIterator::new(&input).take(args.frames.unwrap_or(usize::MAX));
    for (index, bitstream) in frames.enumerate() {
        let res = parser.parse_frame(bitstream);

        match (ParseStatus::of(&res), res) {
            (_, Ok(frame)) => dump_frame(index, &frame, args.verbose),
            (status, Err(err)) => {
                println!("frame {}: {:?}: {}", index, status, err);
                broken += 1;
            }
        }
    }

    if broken > 0 {
        return Err(anyhow!("{} frame(s) could not be parsed", broken));
    }

    Ok(())
}
