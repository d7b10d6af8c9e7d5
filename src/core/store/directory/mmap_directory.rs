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

use std::collections::hash_map::Entry as HashMapEntry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};

use memmap::Mmap;

use crate::core::store::directory::{Directory, FSDirectory};
use crate::core::store::io::{map_file, FSIndexOutput, IndexInput, MmapIndexInput};
use crate::core::store::{IOContext, Lock};
use crate::error::Result;

#[derive(Default, Clone, Debug)]
struct CacheStat {
    // Number of time the cache prevents to call `mmap`
    hit: usize,
    // Number of time call `mmap` as no entry was in the cache.
    miss_empty: usize,
    // Number of time calling `mmap` when the entry in the cache was evicted or stale.
    miss_weak: usize,
}

struct MmapCache {
    stat: CacheStat,
    cache: HashMap<PathBuf, Weak<Mmap>>,
    purge_weak_limit: usize,
}

impl Default for MmapCache {
    fn default() -> MmapCache {
        const STARTING_PURGE_WEAK_LIMIT: usize = 1_000;
        MmapCache {
            stat: CacheStat::default(),
            cache: HashMap::new(),
            purge_weak_limit: STARTING_PURGE_WEAK_LIMIT,
        }
    }
}

impl MmapCache {
    fn cleanup(&mut self) {
        let previous_cache_size = self.cache.len();
        self.cache.retain(|_, weak_ref| weak_ref.upgrade().is_some());
        if self.cache.len() == previous_cache_size {
            self.purge_weak_limit *= 2;
        }
    }

    fn remove(&mut self, full_path: &Path) {
        self.cache.remove(full_path);
    }

    fn get_mmap(&mut self, full_path: &Path) -> Result<Option<Arc<Mmap>>> {
        // if we exceed this limit, then we go through the weak
        // and remove those that are obsolete.
        if self.cache.len() > self.purge_weak_limit {
            self.cleanup();
        }

        let file_len = fs::metadata(full_path)?.len() as usize;
        match self.cache.entry(full_path.to_path_buf()) {
            HashMapEntry::Occupied(mut occupied) => {
                match occupied.get().upgrade() {
                    // appended files must be mapped again
                    Some(ref mmap) if mmap.len() == file_len => {
                        self.stat.hit += 1;
                        Ok(Some(Arc::clone(mmap)))
                    }
                    _ => {
                        self.stat.miss_weak += 1;
                        if let Some(mmap) = map_file(full_path)? {
                            occupied.insert(Arc::downgrade(&mmap));
                            Ok(Some(mmap))
                        } else {
                            occupied.remove();
                            Ok(None)
                        }
                    }
                }
            }

            HashMapEntry::Vacant(vacant) => {
                self.stat.miss_empty += 1;
                if let Some(mmap) = map_file(full_path)? {
                    vacant.insert(Arc::downgrade(&mmap));
                    Ok(Some(mmap))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

/// File-based `Directory` implementation that uses mmap for reading,
/// and `FSIndexOutput` for writing.
///
/// Maps are shared between every input opened on the same file, so a
/// loaded star-tree keeps its consolidated file mapped exactly once.
pub struct MmapDirectory {
    directory: FSDirectory,
    mmap_cache: Arc<Mutex<MmapCache>>,
}

impl MmapDirectory {
    pub fn new<T: AsRef<Path> + ?Sized>(directory: &T) -> Result<MmapDirectory> {
        let directory = FSDirectory::new(directory)?;
        Ok(MmapDirectory {
            directory,
            mmap_cache: Arc::new(Mutex::new(MmapCache::default())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.directory.directory
    }
}

impl Directory for MmapDirectory {
    type IndexOutput = FSIndexOutput;

    fn list_all(&self) -> Result<Vec<String>> {
        self.directory.list_all()
    }

    fn file_length(&self, name: &str) -> Result<i64> {
        self.directory.file_length(name)
    }

    fn create_output(&self, name: &str, ctx: &IOContext) -> Result<Self::IndexOutput> {
        self.directory.create_output(name, ctx)
    }

    fn append_output(&self, name: &str, ctx: &IOContext) -> Result<Self::IndexOutput> {
        self.directory.append_output(name, ctx)
    }

    fn open_input(&self, name: &str, _ctx: &IOContext) -> Result<Box<dyn IndexInput>> {
        let full_path = self.resolve(name);
        let mut mmap_cache = self.mmap_cache.lock()?;
        let mmap = mmap_cache.get_mmap(&full_path)?;
        Ok(Box::new(MmapIndexInput::from_map(name, mmap)))
    }

    fn obtain_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        self.directory.obtain_lock(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.mmap_cache.lock()?.remove(&self.resolve(name));
        self.directory.delete_file(name)
    }

    fn sync(&self, names: &HashSet<String>) -> Result<()> {
        self.directory.sync(names)
    }

    fn sync_meta_data(&self) -> Result<()> {
        self.directory.sync_meta_data()
    }

    fn rename(&self, source: &str, dest: &str) -> Result<()> {
        {
            let mut cache = self.mmap_cache.lock()?;
            cache.remove(&self.resolve(source));
            cache.remove(&self.resolve(dest));
        }
        self.directory.rename(source, dest)
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.directory.resolve(name)
    }
}

impl fmt::Display for MmapDirectory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "MmapDirectory({})", self.directory)
    }
}

#[cfg(test)]
mod tests {
    extern crate tempfile;

    use super::*;
    use crate::core::store::io::{DataInput, DataOutput};
    use crate::core::store::IO_CONTEXT_DEFAULT;

    #[test]
    fn test_open_input_sees_appended_bytes() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = MmapDirectory::new(temp_dir.path()).unwrap();
        {
            let mut out = dir.create_output("data", &IO_CONTEXT_DEFAULT).unwrap();
            out.write_int(11).unwrap();
        }
        let first = dir.open_input("data", &IO_CONTEXT_DEFAULT).unwrap();
        assert_eq!(first.len(), 4);

        {
            let mut out = dir.append_output("data", &IO_CONTEXT_DEFAULT).unwrap();
            out.write_int(22).unwrap();
        }
        let mut second = dir.open_input("data", &IO_CONTEXT_DEFAULT).unwrap();
        assert_eq!(second.len(), 8);
        second.seek(4).unwrap();
        assert_eq!(second.read_int().unwrap(), 22);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn test_open_empty_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = MmapDirectory::new(temp_dir.path()).unwrap();
        dir.create_output("empty", &IO_CONTEXT_DEFAULT).unwrap();

        let mut input = dir.open_input("empty", &IO_CONTEXT_DEFAULT).unwrap();
        assert_eq!(input.len(), 0);
        assert_eq!(input.name(), "empty");
        assert!(input.read_byte().is_err());
    }
}
