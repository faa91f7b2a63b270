//! File-based message cache with zstd compression

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tempfile::NamedTempFile;

use super::{CacheKey, CacheNamespace, MessageCache};

/// File-based message cache with zstd compression
///
/// Directory structure:
/// ```text
/// messages/
///   INBOX/
///     cur/
///       12/
///         1234.zst          # settled message with UID 1234
///     new/
///       lo/
///         local-3.zst       # appended while offline
///   Lists%2Frust/
///     cur/...
/// ```
pub struct FileMessageCache {
    root: PathBuf,
    compression_level: i32,
}

impl FileMessageCache {
    /// Create a new message cache rooted at the given path
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).context("Failed to create message cache directory")?;
        Ok(Self {
            root,
            compression_level: 3,
        })
    }

    /// Get the shard directory (first 2 chars of the id)
    fn shard<'a>(&self, id: &'a str) -> &'a str {
        match id.char_indices().nth(2) {
            Some((end, _)) => &id[..end],
            None if id.len() == 2 => id,
            None => "xx",
        }
    }

    fn folder_dir(&self, folder_path: &str) -> PathBuf {
        self.root.join(encode_folder_path(folder_path))
    }

    fn namespace_dir(&self, folder_path: &str, namespace: CacheNamespace) -> PathBuf {
        self.folder_dir(folder_path).join(namespace.dir_name())
    }

    /// Get the file path for a cache key
    fn message_path(&self, key: &CacheKey) -> PathBuf {
        self.namespace_dir(&key.folder_path, key.namespace)
            .join(self.shard(&key.id))
            .join(format!("{}.zst", key.id))
    }
}

/// Encode a folder path into a single directory name
///
/// A leading `.` is escaped so `.` and `..` never name the root or its parent.
fn encode_folder_path(folder_path: &str) -> String {
    let mut encoded = String::with_capacity(folder_path.len());
    for (i, byte) in folder_path.bytes().enumerate() {
        match byte {
            b'.' if i == 0 => encoded.push_str("%2E"),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b' ' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

impl MessageCache for FileMessageCache {
    fn put(&self, key: &CacheKey, data: &[u8]) -> Result<()> {
        let path = self.message_path(key);

        let parent = path
            .parent()
            .context("Message path has no parent directory")?;
        fs::create_dir_all(parent)?;

        let compressed =
            zstd::encode_all(data, self.compression_level).context("Failed to compress message")?;

        // Write atomically; each writer gets its own temp file
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(&compressed)?;
        temp.persist(&path)
            .with_context(|| format!("Failed to store message at {}", path.display()))?;

        Ok(())
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = self.message_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let compressed = fs::read(&path)?;
        let mut decoder = zstd::Decoder::new(compressed.as_slice())?;
        let mut decompressed = Vec::new();
        decoder
            .read_to_end(&mut decompressed)
            .context("Failed to decompress message")?;

        Ok(Some(decompressed))
    }

    fn exists(&self, key: &CacheKey) -> Result<bool> {
        Ok(self.message_path(key).exists())
    }

    fn remove(&self, key: &CacheKey) -> Result<()> {
        let path = self.message_path(key);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    fn list(&self, folder_path: &str, namespace: CacheNamespace) -> Result<Vec<String>> {
        let dir = self.namespace_dir(folder_path, namespace);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for shard in fs::read_dir(&dir)? {
            let shard = shard?;
            if !shard.file_type()?.is_dir() {
                continue;
            }
            for entry in fs::read_dir(shard.path())? {
                let entry = entry?;
                let file_name = entry.file_name();
                if let Some(id) = file_name.to_str().and_then(|n| n.strip_suffix(".zst")) {
                    ids.push(id.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    fn clear(&self, folder_path: &str, namespace: CacheNamespace) -> Result<()> {
        let dir = self.namespace_dir(folder_path, namespace);
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to clear cache at {}", dir.display()))?;
        }
        Ok(())
    }

    fn rename_folder(&self, old_path: &str, new_path: &str) -> Result<()> {
        let old_dir = self.folder_dir(old_path);
        if !old_dir.exists() {
            return Ok(());
        }
        let new_dir = self.folder_dir(new_path);
        if new_dir.exists() {
            fs::remove_dir_all(&new_dir)?;
        }
        fs::rename(&old_dir, &new_dir).with_context(|| {
            format!(
                "Failed to move cache from {} to {}",
                old_dir.display(),
                new_dir.display()
            )
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Uid;
    use tempfile::tempdir;

    #[test]
    fn test_put_get_settled() {
        let dir = tempdir().unwrap();
        let cache = FileMessageCache::new(dir.path().join("messages")).unwrap();

        let key = CacheKey::settled("INBOX", Uid(1234));
        let data = b"Subject: hello\r\n\r\nbody";

        cache.put(&key, data).unwrap();
        let retrieved = cache.get(&key).unwrap().unwrap();

        assert_eq!(retrieved, data);
    }

    #[test]
    fn test_get_nonexistent() {
        let dir = tempdir().unwrap();
        let cache = FileMessageCache::new(dir.path().join("messages")).unwrap();

        let result = cache.get(&CacheKey::settled("INBOX", Uid(9))).unwrap();

        assert!(result.is_none());
    }

    #[test]
    fn test_remove() {
        let dir = tempdir().unwrap();
        let cache = FileMessageCache::new(dir.path().join("messages")).unwrap();

        let key = CacheKey::settled("INBOX", Uid(5));
        cache.put(&key, b"data").unwrap();
        assert!(cache.exists(&key).unwrap());

        cache.remove(&key).unwrap();

        assert!(!cache.exists(&key).unwrap());
    }

    #[test]
    fn test_clear_only_touches_one_namespace() {
        let dir = tempdir().unwrap();
        let cache = FileMessageCache::new(dir.path().join("messages")).unwrap();

        let settled = CacheKey::settled("INBOX", Uid(7));
        let pending = CacheKey::pending("INBOX", "local-1");
        let other_folder = CacheKey::settled("Archive", Uid(7));
        cache.put(&settled, b"a").unwrap();
        cache.put(&pending, b"b").unwrap();
        cache.put(&other_folder, b"c").unwrap();

        cache.clear("INBOX", CacheNamespace::Settled).unwrap();

        assert!(!cache.exists(&settled).unwrap());
        assert!(cache.exists(&pending).unwrap());
        assert!(cache.exists(&other_folder).unwrap());
    }

    #[test]
    fn test_list() {
        let dir = tempdir().unwrap();
        let cache = FileMessageCache::new(dir.path().join("messages")).unwrap();

        cache.put(&CacheKey::settled("INBOX", Uid(3)), b"3").unwrap();
        cache.put(&CacheKey::settled("INBOX", Uid(120)), b"120").unwrap();

        assert_eq!(
            cache.list("INBOX", CacheNamespace::Settled).unwrap(),
            vec!["120".to_string(), "3".to_string()]
        );
        assert!(cache.list("INBOX", CacheNamespace::PendingUpload).unwrap().is_empty());
    }

    #[test]
    fn test_nested_folder_paths_do_not_collide() {
        let dir = tempdir().unwrap();
        let cache = FileMessageCache::new(dir.path().join("messages")).unwrap();

        cache.put(&CacheKey::settled("Lists", Uid(1)), b"parent").unwrap();
        cache.put(&CacheKey::settled("Lists/rust", Uid(1)), b"child").unwrap();
        cache.clear("Lists", CacheNamespace::Settled).unwrap();

        assert_eq!(
            cache.get(&CacheKey::settled("Lists/rust", Uid(1))).unwrap(),
            Some(b"child".to_vec())
        );
    }

    #[test]
    fn test_dot_folder_paths_stay_under_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("messages");
        let cache = FileMessageCache::new(&root).unwrap();

        assert_eq!(encode_folder_path(".."), "%2E.");
        assert_eq!(encode_folder_path("."), "%2E");
        assert_eq!(encode_folder_path("a.b"), "a.b");

        cache.put(&CacheKey::settled("..", Uid(1)), b"up").unwrap();
        cache.put(&CacheKey::settled(".", Uid(1)), b"here").unwrap();

        assert!(
            cache
                .message_path(&CacheKey::settled("..", Uid(1)))
                .starts_with(root.join("%2E."))
        );
        assert!(!dir.path().join("cur").exists());
        assert_eq!(
            cache.get(&CacheKey::settled("..", Uid(1))).unwrap(),
            Some(b"up".to_vec())
        );
        assert_eq!(
            cache.get(&CacheKey::settled(".", Uid(1))).unwrap(),
            Some(b"here".to_vec())
        );
    }

    #[test]
    fn test_concurrent_puts_of_one_key() {
        let dir = tempdir().unwrap();
        let cache =
            std::sync::Arc::new(FileMessageCache::new(dir.path().join("messages")).unwrap());
        let key = CacheKey::settled("INBOX", Uid(42));

        for _ in 0..20 {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let cache = std::sync::Arc::clone(&cache);
                    let key = key.clone();
                    std::thread::spawn(move || cache.put(&key, format!("copy {}", i).as_bytes()))
                })
                .collect();
            for handle in handles {
                handle.join().unwrap().unwrap();
            }
        }

        let stored = cache.get(&key).unwrap().unwrap();
        assert!(stored.starts_with(b"copy "));
        assert_eq!(
            cache.list("INBOX", CacheNamespace::Settled).unwrap(),
            vec!["42".to_string()]
        );
    }

    #[test]
    fn test_rename_folder() {
        let dir = tempdir().unwrap();
        let cache = FileMessageCache::new(dir.path().join("messages")).unwrap();

        cache.put(&CacheKey::settled("Drafts", Uid(2)), b"draft").unwrap();
        cache.rename_folder("Drafts", "Old Drafts").unwrap();

        assert!(!cache.exists(&CacheKey::settled("Drafts", Uid(2))).unwrap());
        assert_eq!(
            cache.get(&CacheKey::settled("Old Drafts", Uid(2))).unwrap(),
            Some(b"draft".to_vec())
        );
    }

    #[test]
    fn test_compression() {
        let dir = tempdir().unwrap();
        let cache = FileMessageCache::new(dir.path().join("messages")).unwrap();

        let key = CacheKey::settled("INBOX", Uid(77));
        let data = "Hello, world! ".repeat(1000);

        cache.put(&key, data.as_bytes()).unwrap();

        let compressed_size = fs::metadata(cache.message_path(&key)).unwrap().len();
        assert!(
            compressed_size < data.len() as u64,
            "Compressed size {} should be less than original {}",
            compressed_size,
            data.len()
        );
    }
}
