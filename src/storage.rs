//! Local key-value storage with change notifications.
//!
//! Values are JSON documents addressed by a string key. Every successful
//! `set` publishes a [`StorageChange`] to subscribers, the way a browser's
//! `storage.onChanged` would.

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use tokio::sync::broadcast;
use tracing::debug;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Notification that the value under `key` was rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageChange {
  pub key: String,
}

pub trait Storage: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<Value>>;
  fn set(&self, key: &str, value: Value) -> Result<()>;
  fn subscribe(&self) -> broadcast::Receiver<StorageChange>;
}

/// All keys in one JSON object file. Each call reads or rewrites the whole file.
///
/// `io` serializes file access within the process; each write goes through its
/// own temp file so a concurrent reader sees either the old or the new file.
pub struct FileStorage {
  path: PathBuf,
  changes: broadcast::Sender<StorageChange>,
  io: Mutex<()>,
}

impl FileStorage {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
    Self { path: path.into(), changes, io: Mutex::new(()) }
  }

  /// Storage file `storage.json` inside `dir`.
  pub fn in_dir(dir: &Path) -> Self {
    Self::new(dir.join("storage.json"))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn lock(&self) -> Result<MutexGuard<'_, ()>> {
    self.io.lock().map_err(|_| anyhow::anyhow!("storage file lock poisoned"))
  }

  fn read_all(&self) -> Result<Map<String, Value>> {
    let content = match std::fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
      Err(e) => return Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
    };
    if content.trim().is_empty() {
      return Ok(Map::new());
    }
    serde_json::from_str(&content).with_context(|| format!("Storage file {} is not a JSON object", self.path.display()))
  }

  fn write_all(&self, map: &Map<String, Value>) -> Result<()> {
    let parent = match self.path.parent() {
      Some(parent) if !parent.as_os_str().is_empty() => parent,
      _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    let content = serde_json::to_string(map).context("Failed to serialize storage")?;
    let mut tmp = NamedTempFile::new_in(parent).with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
    tmp.write_all(content.as_bytes()).context("Failed to write storage temp file")?;
    tmp.persist(&self.path).with_context(|| format!("Failed to replace {}", self.path.display()))?;
    Ok(())
  }
}

impl Storage for FileStorage {
  fn get(&self, key: &str) -> Result<Option<Value>> {
    let _io = self.lock()?;
    Ok(self.read_all()?.remove(key))
  }

  fn set(&self, key: &str, value: Value) -> Result<()> {
    {
      let _io = self.lock()?;
      let mut map = self.read_all()?;
      map.insert(key.to_string(), value);
      self.write_all(&map)?;
    }
    debug!(key, path = %self.path.display(), "storage: key written");
    // No receivers is fine: nobody is watching.
    let _ = self.changes.send(StorageChange { key: key.to_string() });
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
    self.changes.subscribe()
  }
}

/// In-process storage for tests. `fail_writes` simulates a full or read-only disk.
#[cfg(test)]
pub struct MemoryStorage {
  values: Mutex<std::collections::HashMap<String, Value>>,
  changes: broadcast::Sender<StorageChange>,
  fail_writes: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl MemoryStorage {
  pub fn new() -> Self {
    let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
    Self { values: Mutex::new(Default::default()), changes, fail_writes: Default::default() }
  }

  pub fn failing() -> Self {
    let storage = Self::new();
    storage.set_failing(true);
    storage
  }

  /// Make every later `set` fail (or succeed again).
  pub fn set_failing(&self, failing: bool) {
    self.fail_writes.store(failing, std::sync::atomic::Ordering::SeqCst);
  }
}

#[cfg(test)]
impl Default for MemoryStorage {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
impl Storage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<Value>> {
    let values = self.values.lock().map_err(|_| anyhow::anyhow!("storage mutex poisoned"))?;
    Ok(values.get(key).cloned())
  }

  fn set(&self, key: &str, value: Value) -> Result<()> {
    if self.fail_writes.load(std::sync::atomic::Ordering::SeqCst) {
      anyhow::bail!("storage is read-only");
    }
    {
      let mut values = self.values.lock().map_err(|_| anyhow::anyhow!("storage mutex poisoned"))?;
      values.insert(key.to_string(), value);
    }
    let _ = self.changes.send(StorageChange { key: key.to_string() });
    Ok(())
  }

  fn subscribe(&self) -> broadcast::Receiver<StorageChange> {
    self.changes.subscribe()
  }
}
