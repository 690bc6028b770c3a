#![no_main]

use cros_vp8_parser::bitstream_utils::IvfIterator;
use cros_vp8_parser::codec::vp8::parser::Parser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut parser = Parser::default();

    for bitstream in IvfIterator::new(data) {
        let before = parser.state().clone();

        match parser.parse_frame(bitstream) {
            Ok(frame) => {
                let layout = &frame.header.dct_partitions;
                for (i, partition) in layout.partitions.iter().enumerate() {
                    assert!(layout.data_offset + partition.offset + partition.size <= bitstream.len());
                    assert_eq!(frame.dct_partition(i).map(<[u8]>::len), Some(partition.size));
                }
            }
            Err(_) => assert_eq!(parser.state(), &before),
        }
    }
});
