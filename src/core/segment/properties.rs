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

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::segment::MetadataStore;
use crate::error::ErrorKind::CorruptIndex;
use crate::error::Result;

/// Name of the segment metadata file inside a segment directory.
pub const METADATA_FILE_NAME: &str = "metadata.properties";

/// A segment metadata store kept as `key = value` lines.
///
/// Lines starting with `#` are comments. Backslash, newline and `=` inside
/// keys or values are escaped with a backslash.
pub struct PropertiesMetadataStore {
    path: PathBuf,
    properties: BTreeMap<String, String>,
}

impl PropertiesMetadataStore {
    /// Loads `path` if it exists, an absent file is an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<PropertiesMetadataStore> {
        let path = path.as_ref().to_path_buf();
        let mut properties = BTreeMap::new();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            for (line_no, line) in content.lines().enumerate() {
                let line = line.trim_start();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                let split = find_separator(line).ok_or_else(|| {
                    CorruptIndex(format!(
                        "{}:{}: missing '=' in property line",
                        path.display(),
                        line_no + 1
                    ))
                })?;
                let key = unescape(line[..split].trim_end());
                let value = unescape(line[split + 1..].trim_start());
                properties.insert(key, value);
            }
        }
        Ok(PropertiesMetadataStore { path, properties })
    }

    /// Opens `metadata.properties` inside the segment directory.
    pub fn open_in_dir<P: AsRef<Path>>(segment_dir: P) -> Result<PropertiesMetadataStore> {
        Self::open(segment_dir.as_ref().join(METADATA_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

fn find_separator(line: &str) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            '=' if !escaped => return Some(i),
            _ => escaped = false,
        }
    }
    None
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '=' => out.push_str("\\="),
            c => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl MetadataStore for PropertiesMetadataStore {
    fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|v| v.as_str())
    }

    fn set(&mut self, key: &str, value: String) {
        self.properties.insert(key.to_string(), value);
    }

    fn save(&mut self) -> Result<()> {
        let tmp_path = self.path.with_extension("properties.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            for (key, value) in &self.properties {
                writeln!(file, "{} = {}", escape(key), escape(value))?;
            }
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        debug!(
            "saved {} properties to {}",
            self.properties.len(),
            self.path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    extern crate tempfile;

    use super::*;

    #[test]
    fn test_save_and_reload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut store = PropertiesMetadataStore::open_in_dir(temp_dir.path()).unwrap();
        assert!(store.is_empty());
        store.set("startreeV2.count", "2".to_string());
        store.set("startree_0_split.order", "Name,Country".to_string());
        store.set("odd=key", "line\nbreak \\ slash".to_string());
        store.save().unwrap();

        let reloaded = PropertiesMetadataStore::open_in_dir(temp_dir.path()).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.get("startreeV2.count"), Some("2"));
        assert_eq!(reloaded.get("startree_0_split.order"), Some("Name,Country"));
        assert_eq!(reloaded.get("odd=key"), Some("line\nbreak \\ slash"));
        assert_eq!(reloaded.get("missing"), None);
    }

    #[test]
    fn test_malformed_line() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join(METADATA_FILE_NAME);
        fs::write(&path, "# comment\nsegment.name = s1\nbroken line\n").unwrap();
        assert!(PropertiesMetadataStore::open(&path).is_err());
    }
}
