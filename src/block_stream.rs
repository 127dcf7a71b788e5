// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! An in-memory random-access stream built from lazily allocated fixed-size blocks.

use crate::DataStream;
use std::{
    fmt::{self, Debug, Formatter},
    io::{self, Read, Seek, SeekFrom, Write},
};

/// Default size of a single block, defined as 64kB.
pub const BLOCK_SIZE: usize = 65_536;

/// Seekable, readable and writable byte stream backed by a list of fixed-size blocks.
///
/// Unlike a `Vec<u8>` the stream never needs one contiguous allocation sized to its final
/// length, so growing it to several gigabytes costs one block allocation per `block_size`
/// bytes and no copying of what was already written.
///
/// Blocks are allocated on the first write that touches them and are only released when the
/// whole stream is dropped. Ranges below the logical length that no write ever touched read
/// back as zeros.
pub struct BlockStream {
    blocks: Vec<Option<Box<[u8]>>>,
    block_size: usize,
    len: u64,
    position: u64,
    /// Blocks that may still be allocated before allocation fails.
    #[cfg(test)]
    block_budget: Option<usize>,
}

impl BlockStream {
    /// Creates an empty stream using [`BLOCK_SIZE`] blocks.
    pub fn new() -> Self {
        Self::with_block_size(BLOCK_SIZE)
    }

    /// Creates an empty stream using blocks of `block_size` bytes (at least one byte).
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            blocks: Vec::new(),
            block_size: block_size.max(1),
            len: 0,
            position: 0,
            #[cfg(test)]
            block_budget: None,
        }
    }

    /// Creates an empty stream with the blocks covering `capacity` bytes already allocated.
    ///
    /// The logical length stays zero; this only avoids allocating while writing a payload
    /// whose approximate size is known up front.
    pub fn with_capacity(capacity: u64) -> io::Result<Self> {
        let mut stream = Self::new();
        if capacity > 0 {
            let last = stream.block_index(capacity - 1)?;
            for index in 0..=last {
                let _ = stream.block_mut(index)?;
            }
        }
        Ok(stream)
    }

    /// Creates a stream holding a copy of `bytes`, positioned at the start.
    pub fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        let mut stream = Self::new();
        stream.write_all(bytes)?;
        stream.position = 0;
        Ok(stream)
    }

    /// Logical length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the logical length is zero.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current cursor position. May be past the logical length after a seek.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Size of every block in bytes.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of blocks that have been materialised so far.
    pub fn allocated_blocks(&self) -> usize {
        self.blocks.iter().filter(|block| block.is_some()).count()
    }

    /// Sets the logical length without allocating or releasing any block.
    pub fn set_len(&mut self, len: u64) {
        self.len = len;
    }

    /// Reads the byte under the cursor, or `None` at the end of the stream.
    pub fn read_byte(&mut self) -> Option<u8> {
        if self.position >= self.len {
            return None;
        }
        let index = usize::try_from(self.position / self.block_size as u64).ok()?;
        let offset = self.block_offset();
        let byte = match self.blocks.get(index) {
            Some(Some(block)) => block[offset],
            _ => 0,
        };
        self.position += 1;
        Some(byte)
    }

    /// Writes one byte at the cursor, extending the length if needed.
    pub fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let index = self.block_index(self.position)?;
        let offset = self.block_offset();
        self.block_mut(index)?[offset] = byte;
        self.position += 1;
        self.extend_len(self.position);
        Ok(())
    }

    fn block_index(&self, position: u64) -> io::Result<usize> {
        usize::try_from(position / self.block_size as u64).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "position is beyond the addressable range",
            )
        })
    }

    fn block_offset(&self) -> usize {
        (self.position % self.block_size as u64) as usize
    }

    fn extend_len(&mut self, end: u64) {
        if end > self.len {
            self.len = end;
        }
    }

    /// Returns the block at `index`, allocating it (and growing the block table) if needed.
    fn block_mut(&mut self, index: usize) -> io::Result<&mut [u8]> {
        if self.blocks.len() <= index {
            let missing = index + 1 - self.blocks.len();
            self.blocks
                .try_reserve(missing)
                .map_err(|_| out_of_memory(missing))?;
            self.blocks.resize_with(index + 1, || None);
        }
        let block_size = self.block_size;
        if self.blocks[index].is_none() {
            self.charge_block()?;
            let mut block = Vec::new();
            block
                .try_reserve_exact(block_size)
                .map_err(|_| out_of_memory(block_size))?;
            block.resize(block_size, 0);
            self.blocks[index] = Some(block.into_boxed_slice());
        }
        match &mut self.blocks[index] {
            Some(block) => Ok(&mut block[..]),
            None => Err(out_of_memory(block_size)),
        }
    }

    #[cfg(test)]
    fn charge_block(&mut self) -> io::Result<()> {
        match self.block_budget {
            Some(0) => Err(out_of_memory(self.block_size)),
            Some(ref mut left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    #[cfg(not(test))]
    fn charge_block(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn write_blocks(&mut self, mut buf: &[u8]) -> io::Result<usize> {
        let written = buf.len();
        while !buf.is_empty() {
            let index = self.block_index(self.position)?;
            let offset = self.block_offset();
            let copy_size = buf.len().min(self.block_size - offset);
            let block = self.block_mut(index)?;
            block[offset..offset + copy_size].copy_from_slice(&buf[..copy_size]);
            buf = &buf[copy_size..];
            self.position += copy_size as u64;
            self.extend_len(self.position);
        }
        Ok(written)
    }
}

fn out_of_memory(bytes: usize) -> io::Error {
    io::Error::new(
        io::ErrorKind::OutOfMemory,
        format!("failed to allocate {bytes} bytes"),
    )
}

impl Default for BlockStream {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for BlockStream {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter
            .debug_struct("BlockStream")
            .field("block_size", &self.block_size)
            .field("allocated_blocks", &self.allocated_blocks())
            .field("len", &self.len)
            .field("position", &self.position)
            .finish()
    }
}

impl Read for BlockStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.len {
            return Ok(0);
        }
        let remaining = self.len - self.position;
        let count = usize::try_from(remaining).map_or(buf.len(), |r| r.min(buf.len()));

        let mut read = 0;
        while read < count {
            let index = self.block_index(self.position)?;
            let offset = self.block_offset();
            let copy_size = (count - read).min(self.block_size - offset);
            let target = &mut buf[read..read + copy_size];
            match self.blocks.get(index) {
                Some(Some(block)) => target.copy_from_slice(&block[offset..offset + copy_size]),
                _ => target.fill(0),
            }
            read += copy_size;
            self.position += copy_size as u64;
        }
        Ok(read)
    }
}

impl Write for BlockStream {
    /// Copies `buf` into the blocks under the cursor.
    ///
    /// If a block cannot be allocated the cursor is restored to where it was before the call.
    /// Bytes already copied into earlier blocks, and the length they extended, are kept.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let initial_position = self.position;
        self.write_blocks(buf).map_err(|error| {
            self.position = initial_position;
            error
        })
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for BlockStream {
    fn seek(&mut self, style: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match style {
            SeekFrom::Start(n) => {
                self.position = n;
                return Ok(n);
            }
            SeekFrom::End(n) => (self.len, n),
            SeekFrom::Current(n) => (self.position, n),
        };
        match base.checked_add_signed(offset) {
            Some(n) => {
                self.position = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )),
        }
    }

    fn stream_position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

impl DataStream for BlockStream {
    fn len(&self) -> io::Result<u64> {
        Ok(self.len)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        BlockStream::set_len(self, len);
        Ok(())
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.position)
    }
}

impl TryFrom<&[u8]> for BlockStream {
    type Error = io::Error;

    fn try_from(bytes: &[u8]) -> io::Result<Self> {
        Self::from_bytes(bytes)
    }
}
