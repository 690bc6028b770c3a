// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! IVF container helpers.
//!
//! Splitting a stream into frames is the job of the caller; these helpers exist so tools, fuzzers
//! and tests can feed the VP8 parser from IVF files.

use std::io::Cursor;
use std::io::Read;
use std::io::Write;

use byteorder::LittleEndian;
use byteorder::ReadBytesExt;
use byteorder::WriteBytesExt;

/// Size of the IVF file header, in bytes.
pub const IVF_FILE_HEADER_SIZE: u64 = 32;

/// Iterator over IVF packets.
pub struct IvfIterator<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> IvfIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        let mut cursor = Cursor::new(data);

        // Skip the IVF header entirely.
        cursor.set_position(IVF_FILE_HEADER_SIZE);

        Self { cursor }
    }
}

impl<'a> Iterator for IvfIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        // Make sure we have a header.
        let len = self.cursor.read_u32::<LittleEndian>().ok()? as usize;
        // Skip PTS.
        let _ = self.cursor.read_u64::<LittleEndian>().ok()?;

        let data = *self.cursor.get_ref();
        let start = self.cursor.position() as usize;
        let end = start.checked_add(len)?;
        let frame = data.get(start..end)?;

        self.cursor.set_position(end as u64);

        Some(frame)
    }
}

/// IVF file header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IvfFileHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub header_size: u16,
    pub codec: [u8; 4],
    pub width: u16,
    pub height: u16,
    pub framerate: u32,
    pub timescale: u32,
    pub frame_count: u32,
    pub unused: u32,
}

impl Default for IvfFileHeader {
    fn default() -> Self {
        Self {
            magic: Self::MAGIC,
            version: 0,
            header_size: IVF_FILE_HEADER_SIZE as u16,
            codec: Self::CODEC_VP8,
            width: 320,
            height: 240,
            framerate: 1,
            timescale: 1000,
            frame_count: 1,
            unused: Default::default(),
        }
    }
}

impl IvfFileHeader {
    pub const MAGIC: [u8; 4] = *b"DKIF";
    pub const CODEC_VP8: [u8; 4] = *b"VP80";

    pub fn new(codec: [u8; 4], width: u16, height: u16, framerate: u32, frame_count: u32) -> Self {
        let default = Self::default();

        Self {
            codec,
            width,
            height,
            framerate: framerate * default.timescale,
            frame_count,
            ..default
        }
    }

    /// Reads a header from `reader`. Returns `None` if `reader` does not start with an IVF header.
    pub fn read_from(reader: &mut impl Read) -> std::io::Result<Option<Self>> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != Self::MAGIC {
            return Ok(None);
        }

        let version = reader.read_u16::<LittleEndian>()?;
        let header_size = reader.read_u16::<LittleEndian>()?;
        let mut codec = [0u8; 4];
        reader.read_exact(&mut codec)?;

        Ok(Some(Self {
            magic,
            version,
            header_size,
            codec,
            width: reader.read_u16::<LittleEndian>()?,
            height: reader.read_u16::<LittleEndian>()?,
            framerate: reader.read_u32::<LittleEndian>()?,
            timescale: reader.read_u32::<LittleEndian>()?,
            frame_count: reader.read_u32::<LittleEndian>()?,
            unused: reader.read_u32::<LittleEndian>()?,
        }))
    }

    /// Writes header into writer
    pub fn write_into(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_all(&self.magic)?;
        writer.write_u16::<LittleEndian>(self.version)?;
        writer.write_u16::<LittleEndian>(self.header_size)?;
        writer.write_all(&self.codec)?;
        writer.write_u16::<LittleEndian>(self.width)?;
        writer.write_u16::<LittleEndian>(self.height)?;
        writer.write_u32::<LittleEndian>(self.framerate)?;
        writer.write_u32::<LittleEndian>(self.timescale)?;
        writer.write_u32::<LittleEndian>(self.frame_count)?;
        writer.write_u32::<LittleEndian>(self.unused)?;

        Ok(())
    }
}

/// IVF frame header
pub struct IvfFrameHeader {
    pub frame_size: u32,
    pub timestamp: u64,
}

impl IvfFrameHeader {
    /// Writes header into writer
    pub fn write_into(&self, writer: &mut impl Write) -> std::io::Result<()> {
        writer.write_u32::<LittleEndian>(self.frame_size)?;
        writer.write_u64::<LittleEndian>(self.timestamp)?;
        Ok(())
    }
}
