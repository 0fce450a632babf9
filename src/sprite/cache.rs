//! Process-wide sprite sheet cache.
//!
//! Keyed by a fingerprint of everything that affects the packed output.
//! Each key packs at most once, even when several compilations ask for it
//! at the same time; a failed pack leaves the key empty so the next request
//! retries.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::SpriteError;

use super::{PackedSheet, SpriteSource};

type Slot = Arc<Mutex<Option<Arc<PackedSheet>>>>;

#[derive(Debug, Default)]
pub struct SpriteCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl SpriteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the sheet cached under `key`, packing it with `pack` first if
    /// no sheet exists yet.
    pub fn get_or_pack<F>(&self, key: &str, pack: F) -> Result<Arc<PackedSheet>, SpriteError>
    where
        F: FnOnce() -> Result<PackedSheet, SpriteError>,
    {
        let slot = {
            let mut slots = self.slots.lock();
            Arc::clone(slots.entry(key.to_string()).or_default())
        };

        // Holding the slot lock while packing makes concurrent requests for
        // the same key wait for this result.
        let mut entry = slot.lock();
        if let Some(sheet) = entry.as_ref() {
            tracing::trace!(key, "sprite cache hit");
            return Ok(Arc::clone(sheet));
        }

        let sheet = Arc::new(pack()?);
        *entry = Some(Arc::clone(&sheet));
        Ok(sheet)
    }

    /// Number of packed sheets held.
    pub fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.lock().values().cloned().collect();
        slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hex SHA-256 over the glob, the matched files (path, size, mtime), the
/// spacing and the output directory.
pub fn fingerprint(pattern: &str, sources: &[SpriteSource], spacing: u32, out_dir: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pattern.as_bytes());
    hasher.update([0u8]);

    for source in sources {
        hasher.update(source.path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        let (len, mtime) = match fs::metadata(&source.path) {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |d| d.as_nanos());
                (meta.len(), mtime)
            }
            Err(_) => (0, 0),
        };
        hasher.update(len.to_le_bytes());
        hasher.update(mtime.to_le_bytes());
    }

    hasher.update(spacing.to_le_bytes());
    hasher.update(out_dir.to_string_lossy().as_bytes());

    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::tempdir;

    fn sheet(name: &str) -> PackedSheet {
        PackedSheet {
            path: PathBuf::from(format!("{}.png", name)),
            size: (1, 1),
            frames: vec![],
        }
    }

    #[test]
    fn test_packs_once_per_key() {
        let cache = SpriteCache::new();
        let packs = AtomicUsize::new(0);
        let pack = || {
            packs.fetch_add(1, Ordering::SeqCst);
            Ok(sheet("a"))
        };

        let first = cache.get_or_pack("k", pack).unwrap();
        let second = cache.get_or_pack("k", || unreachable!()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(packs.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_concurrent_requests_share_one_pack() {
        let cache = Arc::new(SpriteCache::new());
        let packs = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let packs = Arc::clone(&packs);
                thread::spawn(move || {
                    cache
                        .get_or_pack("shared", || {
                            packs.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(std::time::Duration::from_millis(20));
                            Ok(sheet("shared"))
                        })
                        .unwrap()
                })
            })
            .collect();

        let sheets: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(packs.load(Ordering::SeqCst), 1);
        assert!(sheets.iter().all(|s| Arc::ptr_eq(s, &sheets[0])));
    }

    #[test]
    fn test_failed_pack_is_not_cached() {
        let cache = SpriteCache::new();
        let err = cache
            .get_or_pack("k", || {
                Err(SpriteError::MissingImage {
                    name: "x".to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, SpriteError::MissingImage { .. }));
        assert!(cache.is_empty());

        assert!(cache.get_or_pack("k", || Ok(sheet("k"))).is_ok());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_fingerprint_tracks_inputs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"one").unwrap();
        let sources = vec![SpriteSource {
            name: "a".to_string(),
            path: path.clone(),
        }];

        let base = fingerprint("*.png", &sources, 0, dir.path());
        assert_eq!(base, fingerprint("*.png", &sources, 0, dir.path()));
        assert_eq!(base.len(), 64);
        assert_ne!(base, fingerprint("*.png", &sources, 2, dir.path()));
        assert_ne!(base, fingerprint("*.gif", &sources, 0, dir.path()));

        fs::write(&path, b"longer contents").unwrap();
        assert_ne!(base, fingerprint("*.png", &sources, 0, dir.path()));
    }
}
