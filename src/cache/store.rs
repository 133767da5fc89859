//! On-disk persistence of the incremental cache.
//!
//! ```text
//! .kiln/cache/
//! ├── index.json          # keys and output metadata
//! └── objects/<blake3>    # output bytes, content addressed
//! ```

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use super::{CacheEntry, CacheKey, IncrementalCache};
use crate::freshness::ContentHash;

const INDEX_FILE: &str = "index.json";
const OBJECTS_DIR: &str = "objects";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredIndex {
    version: u32,
    entries: Vec<StoredEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredEntry {
    key: CacheKey,
    output: String,
    url: String,
    digest: ContentHash,
    extension: String,
}

/// Check if file content is the same as new content
fn file_content_matches(path: &Path, content: &str) -> bool {
    path.exists() && fs::read_to_string(path).is_ok_and(|existing| existing == content)
}

impl IncrementalCache {
    /// Write every entry under `dir`. Objects no entry refers to are removed.
    pub fn save(&self, dir: &Path) -> io::Result<()> {
        let objects = dir.join(OBJECTS_DIR);
        fs::create_dir_all(&objects)?;

        let mut entries = Vec::with_capacity(self.entries.len());
        let mut live = FxHashSet::default();
        for item in &self.entries {
            let (key, entry) = item.value();
            let object = objects.join(entry.digest.to_hex());
            if !object.exists() {
                fs::write(&object, &entry.content)?;
            }
            live.insert(entry.digest.to_hex());
            entries.push(StoredEntry {
                key: key.clone(),
                output: entry.output.clone(),
                url: entry.url.clone(),
                digest: entry.digest,
                extension: entry.extension.clone(),
            });
        }
        entries.sort_by(|a, b| a.key.asset.cmp(&b.key.asset));

        for file in fs::read_dir(&objects)? {
            let file = file?;
            if !live.contains(file.file_name().to_string_lossy().as_ref()) {
                fs::remove_file(file.path())?;
            }
        }

        let index = StoredIndex {
            version: FORMAT_VERSION,
            entries,
        };
        let json = serde_json::to_string_pretty(&index)?;
        let path = dir.join(INDEX_FILE);
        if file_content_matches(&path, &json) {
            crate::debug!("cache"; "index unchanged, skipping write");
            return Ok(());
        }
        fs::write(&path, json)?;
        crate::debug!("cache"; "saved {} entries", index.entries.len());
        Ok(())
    }

    /// Restore a cache saved with [`IncrementalCache::save`].
    ///
    /// A missing directory yields an empty cache. Entries whose object is
    /// missing or corrupt are dropped; an index from another format version
    /// is ignored.
    pub fn load(dir: &Path) -> io::Result<Self> {
        let cache = Self::new();
        let path = dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(cache);
        }

        let json = fs::read_to_string(&path)?;
        let index: StoredIndex = serde_json::from_str(&json)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        if index.version != FORMAT_VERSION {
            crate::debug!("cache"; "ignoring cache format v{}", index.version);
            return Ok(cache);
        }

        let objects = dir.join(OBJECTS_DIR);
        for stored in index.entries {
            let Ok(content) = fs::read(objects.join(stored.digest.to_hex())) else {
                continue;
            };
            if ContentHash::of(&content) != stored.digest {
                continue;
            }
            let entry = CacheEntry {
                content: content.into(),
                output: stored.output,
                url: stored.url,
                digest: stored.digest,
                extension: stored.extension,
            };
            cache.put(stored.key, Arc::new(entry));
        }
        crate::debug!("cache"; "restored {} entries", cache.len());
        Ok(cache)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample(cache: &IncrementalCache, path: &str, text: &str) -> CacheKey {
        let key = CacheKey::new(
            PathBuf::from(path),
            ContentHash::of(text.as_bytes()),
            ContentHash::of(b"chain"),
            ContentHash::empty(),
        );
        cache.put(
            key.clone(),
            Arc::new(CacheEntry {
                content: Arc::from(text.as_bytes()),
                output: format!("{}.js", text),
                url: format!("/{}.js", text),
                digest: ContentHash::of(text.as_bytes()),
                extension: "js".into(),
            }),
        );
        key
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = IncrementalCache::new();
        let a = sample(&cache, "/p/a.js", "alpha");
        let b = sample(&cache, "/p/b.js", "beta");
        cache.save(dir.path()).unwrap();

        let restored = IncrementalCache::load(dir.path()).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.get(&a), cache.get(&a));
        assert_eq!(&*restored.get(&b).unwrap().content, b"beta");
    }

    #[test]
    fn test_load_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = IncrementalCache::load(&dir.path().join("nope")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_corrupt_object_dropped() {
        let dir = TempDir::new().unwrap();
        let cache = IncrementalCache::new();
        let a = sample(&cache, "/p/a.js", "alpha");
        cache.save(dir.path()).unwrap();

        let digest = cache.get(&a).unwrap().digest;
        fs::write(dir.path().join(OBJECTS_DIR).join(digest.to_hex()), "tampered").unwrap();
        assert!(IncrementalCache::load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_save_removes_stale_objects() {
        let dir = TempDir::new().unwrap();
        let cache = IncrementalCache::new();
        sample(&cache, "/p/a.js", "alpha");
        cache.save(dir.path()).unwrap();

        cache.clear();
        sample(&cache, "/p/a.js", "gamma");
        cache.save(dir.path()).unwrap();

        let objects: Vec<_> = fs::read_dir(dir.path().join(OBJECTS_DIR)).unwrap().collect();
        assert_eq!(objects.len(), 1);
    }
}
