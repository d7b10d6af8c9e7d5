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

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::store::directory::Directory;
use crate::core::store::io::{FSIndexOutput, IndexInput, MmapIndexInput};
use crate::core::store::{IOContext, Lock, LockFactory, NativeFSLockFactory};
use crate::error::ErrorKind::IllegalState;
use crate::error::Result;

/// a straightforward `Directory` implementations use std::fs::File.
pub struct FSDirectory {
    pub directory: PathBuf,
    lock_factory: NativeFSLockFactory,
}

impl FSDirectory {
    pub fn new<T: AsRef<Path> + ?Sized>(directory: &T) -> Result<FSDirectory> {
        let directory = directory.as_ref();
        if !Path::exists(directory) {
            fs::create_dir_all(directory)?;
        } else if !Path::is_dir(directory) {
            bail!(IllegalState(format!(
                "Path {:?} exists but is not directory",
                directory
            )))
        }

        Ok(FSDirectory {
            directory: From::from(directory),
            lock_factory: NativeFSLockFactory::default(),
        })
    }

    fn fsync(&self, path: &Path, is_dir: bool) -> Result<()> {
        // If the file is a directory we have to open read-only, for regular files we must
        // open r/w for the fsync to have an effect.
        let file = if is_dir {
            fs::File::open(path)?
        } else {
            fs::OpenOptions::new().append(true).open(path)?
        };
        file.sync_all()?;
        Ok(())
    }
}

fn list_all<T: AsRef<Path>>(path: &T) -> Result<Vec<String>> {
    let mut result = Vec::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        if let Ok(filename) = entry.file_name().into_string() {
            result.push(filename);
        }
    }
    result.sort();
    Ok(result)
}

impl Directory for FSDirectory {
    type IndexOutput = FSIndexOutput;

    fn list_all(&self) -> Result<Vec<String>> {
        list_all(&self.directory)
    }

    fn file_length(&self, name: &str) -> Result<i64> {
        let path = self.resolve(name);
        let meta = fs::metadata(&path)?;
        if meta.is_dir() {
            bail!(IllegalState(format!(
                "file_length should not be called for directory: {}",
                path.display()
            )))
        } else {
            Ok(meta.len() as i64)
        }
    }

    fn create_output(&self, name: &str, _context: &IOContext) -> Result<Self::IndexOutput> {
        let path = self.resolve(name);
        FSIndexOutput::new(name.to_string(), &path)
    }

    fn append_output(&self, name: &str, _context: &IOContext) -> Result<Self::IndexOutput> {
        let path = self.resolve(name);
        FSIndexOutput::append(name.to_string(), &path)
    }

    fn open_input(&self, name: &str, _ctx: &IOContext) -> Result<Box<dyn IndexInput>> {
        let path = self.resolve(name);
        // there is no buffered file input, reads always go through a fresh map
        Ok(Box::new(MmapIndexInput::open(path)?))
    }

    fn obtain_lock(&self, name: &str) -> Result<Box<dyn Lock>> {
        Ok(Box::new(self.lock_factory.obtain_lock(self, name)?))
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        let path = self.resolve(name);
        fs::remove_file(&path)?;
        Ok(())
    }

    fn sync(&self, names: &HashSet<String>) -> Result<()> {
        for name in names {
            let path = self.resolve(name);
            self.fsync(&path, false)?;
        }
        Ok(())
    }

    fn sync_meta_data(&self) -> Result<()> {
        self.fsync(&self.directory, true)
    }

    fn rename(&self, source: &str, dest: &str) -> Result<()> {
        let source_path = self.resolve(source);
        let dest_path = self.resolve(dest);
        fs::rename(&source_path, &dest_path)?;
        Ok(())
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.directory.join(name)
    }
}

impl fmt::Display for FSDirectory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FSDirectory({})", self.directory.display())
    }
}
