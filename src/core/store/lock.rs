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

use crate::core::store::directory::Directory;

use crate::error::ErrorKind::{AlreadyClosed, LockObtainFailed};
use crate::error::Result;

use fs2::FileExt;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// An inter process mutex lock, released by `close` or on drop.
pub trait Lock: Sync + Send {
    /// Releases exclusive access.
    fn close(&self) -> Result<()>;

    /// Best effort check that this lock is still valid. Locks
    /// could become invalidated externally, for example if a user
    /// deletes the lock file manually.
    fn ensure_valid(&self) -> Result<()>;
}

/// Produces `Lock`s for files of a `Directory`.
pub trait LockFactory: Send + Sync {
    type LK: Lock;

    /// Blocks until the lock identified by `lock_name` is held by the caller.
    fn obtain_lock<D: Directory + ?Sized>(&self, dir: &D, lock_name: &str) -> Result<Self::LK>;

    /// Fails with `LockObtainFailed` instead of waiting when the lock is held elsewhere.
    fn try_obtain_lock<D: Directory + ?Sized>(&self, dir: &D, lock_name: &str)
        -> Result<Self::LK>;
}

/// A lock backed by an OS advisory lock (`flock`/`LockFileEx`) on the lock file.
///
/// Advisory locks conflict between open file handles, so the lock serializes
/// threads of one process as well as separate processes.
pub struct NativeFSLock {
    channel: fs::File,
    real_path: PathBuf,
    lock_held: Arc<Mutex<HashSet<PathBuf>>>,
    closed: AtomicBool,
}

impl NativeFSLock {
    fn new(
        channel: fs::File,
        real_path: PathBuf,
        lock_held: Arc<Mutex<HashSet<PathBuf>>>,
    ) -> NativeFSLock {
        NativeFSLock {
            channel,
            real_path,
            lock_held,
            closed: AtomicBool::new(false),
        }
    }
}

impl Lock for NativeFSLock {
    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // first forget the lock, then release the channel
        let remove = self.lock_held.lock()?.remove(&self.real_path);
        self.channel.unlock()?;
        if !remove {
            bail!(AlreadyClosed(format!(
                "Lock path was cleared but never marked as held: {:?}",
                self.real_path
            )));
        }
        Ok(())
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            bail!(AlreadyClosed(format!(
                "Lock instance already released: {:?}",
                self.real_path
            )));
        }
        if !self.lock_held.lock()?.contains(&self.real_path) {
            bail!(AlreadyClosed(
                "Lock path unexpectedly cleared from map".into()
            ));
        }
        if !self.real_path.exists() {
            bail!(AlreadyClosed(format!(
                "Lock file was removed: {:?}",
                self.real_path
            )));
        }
        Ok(())
    }
}

impl Drop for NativeFSLock {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("failed to release lock {:?}: {}", self.real_path, e);
        }
    }
}

pub struct NativeFSLockFactory {
    pub lock_held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl Default for NativeFSLockFactory {
    fn default() -> NativeFSLockFactory {
        NativeFSLockFactory {
            lock_held: Arc::new(Mutex::new(HashSet::new())),
        }
    }
}

impl NativeFSLockFactory {
    fn open_channel<D: Directory + ?Sized>(
        dir: &D,
        lock_name: &str,
    ) -> Result<(fs::File, PathBuf)> {
        let real_path = dir.resolve(lock_name);
        if let Some(parent) = real_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let channel = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&real_path)?;
        Ok((channel, real_path))
    }

    fn mark_held(&self, channel: fs::File, real_path: PathBuf) -> Result<NativeFSLock> {
        if !self.lock_held.lock()?.insert(real_path.clone()) {
            channel.unlock()?;
            bail!(LockObtainFailed(format!(
                "Lock held by this virtual machine: {:?}",
                real_path
            )));
        }
        Ok(NativeFSLock::new(
            channel,
            real_path,
            Arc::clone(&self.lock_held),
        ))
    }
}

impl LockFactory for NativeFSLockFactory {
    type LK = NativeFSLock;

    fn obtain_lock<D: Directory + ?Sized>(&self, dir: &D, lock_name: &str) -> Result<Self::LK> {
        let (channel, real_path) = Self::open_channel(dir, lock_name)?;
        channel.lock_exclusive()?;
        self.mark_held(channel, real_path)
    }

    fn try_obtain_lock<D: Directory + ?Sized>(
        &self,
        dir: &D,
        lock_name: &str,
    ) -> Result<Self::LK> {
        let (channel, real_path) = Self::open_channel(dir, lock_name)?;
        if let Err(e) = channel.try_lock_exclusive() {
            bail!(LockObtainFailed(format!(
                "Lock held by another program: {:?}: {}",
                real_path, e
            )));
        }
        self.mark_held(channel, real_path)
    }
}
