// Copyright 2019 Zhizhesihai (Beijing) Technology Limited.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;

use byteorder::{BigEndian, ByteOrder};
use memmap::Mmap;

use crate::core::store::io::{DataInput, IndexInput, RandomAccessInput};
use crate::error::ErrorKind::{IllegalArgument, UnexpectedEOF};
use crate::error::Result;

/// Maps the whole file read-only, `None` for an empty file (which cannot be mapped).
pub fn map_file(path: &Path) -> Result<Option<Arc<Mmap>>> {
    let file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    let mmap = unsafe { Mmap::map(&file)? };
    Ok(Some(Arc::new(mmap)))
}

/// A window `[offset, offset + len)` of a shared map.
#[derive(Clone)]
struct MappedBytes {
    map: Option<Arc<Mmap>>,
    offset: usize,
    len: usize,
}

impl MappedBytes {
    fn whole(map: Option<Arc<Mmap>>) -> MappedBytes {
        let len = map.as_ref().map_or(0, |m| m.len());
        MappedBytes {
            map,
            offset: 0,
            len,
        }
    }

    fn as_slice(&self) -> &[u8] {
        match self.map {
            Some(ref map) => &map[self.offset..self.offset + self.len],
            None => &[],
        }
    }

    /// `len` bytes at `pos`, relative to this window.
    fn window(&self, pos: usize, len: usize) -> Option<&[u8]> {
        if pos.checked_add(len).map_or(true, |end| end > self.len) {
            None
        } else {
            Some(&self.as_slice()[pos..pos + len])
        }
    }

    fn sub(&self, offset: usize, len: usize) -> Option<MappedBytes> {
        if offset.checked_add(len).map_or(true, |end| end > self.len) {
            return None;
        }
        Some(MappedBytes {
            map: self.map.clone(),
            offset: self.offset + offset,
            len,
        })
    }
}

/// `IndexInput` over a memory mapped file. Clones and slices share the map,
/// so one consolidated star-tree file serves every forward index of a tree.
#[derive(Clone)]
pub struct MmapIndexInput {
    bytes: MappedBytes,
    position: usize,
    name: String,
}

impl MmapIndexInput {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<MmapIndexInput> {
        let path = path.as_ref();
        Ok(MmapIndexInput {
            bytes: MappedBytes::whole(map_file(path)?),
            position: 0,
            name: path.display().to_string(),
        })
    }

    /// Input over a map shared with other inputs, `None` reads as an empty file.
    pub fn from_map(name: &str, map: Option<Arc<Mmap>>) -> MmapIndexInput {
        MmapIndexInput {
            bytes: MappedBytes::whole(map),
            position: 0,
            name: name.to_string(),
        }
    }

    fn sub_input(&self, name: &str, offset: i64, length: i64) -> Result<MmapIndexInput> {
        let bytes = if offset < 0 || length < 0 {
            None
        } else {
            self.bytes.sub(offset as usize, length as usize)
        };
        match bytes {
            Some(bytes) => Ok(MmapIndexInput {
                bytes,
                position: 0,
                name: name.to_string(),
            }),
            None => bail!(IllegalArgument(format!(
                "slice [{}, {}) out of {} with {} bytes",
                offset,
                offset + length,
                self.name,
                self.bytes.len
            ))),
        }
    }

    fn at(&self, pos: u64, len: usize) -> Result<&[u8]> {
        match self.bytes.window(pos as usize, len) {
            Some(bytes) => Ok(bytes),
            None => bail!(UnexpectedEOF(format!(
                "{} bytes at {} past the end of {} ({} bytes)",
                len, pos, self.name, self.bytes.len
            ))),
        }
    }
}

impl IndexInput for MmapIndexInput {
    fn clone(&self) -> Result<Box<dyn IndexInput>> {
        Ok(Box::new(Clone::clone(self)))
    }

    fn file_pointer(&self) -> i64 {
        self.position as i64
    }

    fn seek(&mut self, pos: i64) -> Result<()> {
        if pos < 0 || pos as usize > self.bytes.len {
            bail!(IllegalArgument(format!(
                "seek to {} outside of {}",
                pos, self.name
            )));
        }
        self.position = pos as usize;
        Ok(())
    }

    fn len(&self) -> u64 {
        self.bytes.len as u64
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn random_access_slice(&self, offset: i64, length: i64) -> Result<Box<dyn RandomAccessInput>> {
        let name = format!("{}[{}..]", self.name, offset);
        Ok(Box::new(self.sub_input(&name, offset, length)?))
    }

    fn slice(&self, description: &str, offset: i64, length: i64) -> Result<Box<dyn IndexInput>> {
        Ok(Box::new(self.sub_input(description, offset, length)?))
    }
}

impl DataInput for MmapIndexInput {
    fn read_byte(&mut self) -> Result<u8> {
        let b = self.at(self.position as u64, 1)?[0];
        self.position += 1;
        Ok(b)
    }

    fn skip_bytes(&mut self, count: usize) -> Result<()> {
        self.at(self.position as u64, count)?;
        self.position += count;
        Ok(())
    }
}

impl Read for MmapIndexInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = &self.bytes.as_slice()[self.position..];
        let count = buf.len().min(remaining.len());
        buf[..count].copy_from_slice(&remaining[..count]);
        self.position += count;
        Ok(count)
    }
}

impl RandomAccessInput for MmapIndexInput {
    fn len(&self) -> u64 {
        self.bytes.len as u64
    }

    fn read_byte(&self, pos: u64) -> Result<u8> {
        Ok(self.at(pos, 1)?[0])
    }

    fn read_short(&self, pos: u64) -> Result<i16> {
        Ok(BigEndian::read_i16(self.at(pos, 2)?))
    }

    fn read_int(&self, pos: u64) -> Result<i32> {
        Ok(BigEndian::read_i32(self.at(pos, 4)?))
    }

    fn read_long(&self, pos: u64) -> Result<i64> {
        Ok(BigEndian::read_i64(self.at(pos, 8)?))
    }

    fn read_bytes(&self, pos: u64, buf: &mut [u8]) -> Result<()> {
        buf.copy_from_slice(self.at(pos, buf.len())?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate tempfile;

    use super::*;
    use crate::core::store::io::{DataOutput, FSIndexOutput};
    use std::io::Write;
    use std::path::PathBuf;

    // 19 bytes of mixed-width values
    fn write_sample(path: &PathBuf) {
        let mut out = FSIndexOutput::new("sample".to_string(), path).unwrap();
        out.write_long(0x0BAD_DA55).unwrap();
        out.write_int(3).unwrap();
        out.write_all(&(-2i16).to_be_bytes()).unwrap();
        out.write_byte(7).unwrap();
        out.write_int(1_234_567).unwrap();
        out.flush().unwrap();
    }

    #[test]
    fn test_slices_are_bounded() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("sample");
        write_sample(&path);

        let input = MmapIndexInput::open(&path).unwrap();
        assert_eq!(IndexInput::len(&input), 19);
        let mut tail = input.slice("tail", 12, 7).unwrap();
        assert_eq!(tail.name(), "tail");
        let mut short = [0u8; 2];
        tail.read_bytes(&mut short, 0, 2).unwrap();
        assert_eq!(BigEndian::read_i16(&short), -2);
        assert_eq!(tail.read_byte().unwrap(), 7);
        assert_eq!(tail.read_int().unwrap(), 1_234_567);
        assert!(tail.read_byte().is_err());

        // a nested slice cannot reach past its parent
        assert!(tail.slice("beyond", 4, 4).is_err());
        assert!(input.slice("negative", -1, 2).is_err());
        assert!(input.slice("whole", 0, 19).is_ok());
    }

    #[test]
    fn test_random_access() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("sample");
        write_sample(&path);

        let input = MmapIndexInput::open(&path).unwrap();
        let random = input.random_access_slice(8, 11).unwrap();
        assert_eq!(random.read_int(0).unwrap(), 3);
        assert_eq!(random.read_short(4).unwrap(), -2);
        assert_eq!(random.read_byte(6).unwrap(), 7);
        let mut buf = [0u8; 4];
        random.read_bytes(7, &mut buf).unwrap();
        assert_eq!(BigEndian::read_i32(&buf), 1_234_567);
        assert!(random.read_int(8).is_err());
        assert!(random.read_long(::std::u64::MAX - 2).is_err());
    }

    #[test]
    fn test_empty_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("empty");
        File::create(&path).unwrap();

        let mut input = MmapIndexInput::open(&path).unwrap();
        assert!(IndexInput::is_empty(&input));
        assert!(DataInput::read_byte(&mut input).is_err());
        let mut text = String::new();
        input.read_to_string(&mut text).unwrap();
        assert!(text.is_empty());
    }
}
