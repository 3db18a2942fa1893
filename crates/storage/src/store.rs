// Path: crates/storage/src/store.rs

//! The blob store: ciphertext under `blobs/<cid>.enc`, metadata under
//! `meta/<cid>.json`, scratch files under `tmp/`. All writes go through
//! temp+rename so a crash never leaves a partial blob or sidecar in place.

use crate::metrics::metrics;
use bytecave_crypto::verify_cid;
use bytecave_types::blob::{BlobMetadata, StoreStats};
use bytecave_types::error::StorageError;
use bytecave_types::{now_millis, Cid};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use fs2::available_space;
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

const BLOB_EXT: &str = "enc";
const META_EXT: &str = "json";

/// Construction options for a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub root: PathBuf,
    /// Total capacity in bytes; writes that would exceed it are rejected.
    pub capacity: u64,
    /// Per-blob ceiling in bytes.
    pub max_blob_size: u64,
    /// Gzip blobs at rest.
    pub compression_enabled: bool,
}

/// Optional attributes recorded at ingest.
#[derive(Debug, Clone, Default)]
pub struct PutExtras {
    pub content_type: Option<String>,
    pub guild_id: Option<String>,
    pub from_peer: Option<String>,
    pub integrity_hash: Option<String>,
}

/// The result of a `put`.
#[derive(Debug, Clone, Copy)]
pub struct PutOutcome {
    /// The CID was already present; nothing was written.
    pub already_stored: bool,
}

/// Orphans and mismatches found by a full scan.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    /// Blob files with no metadata sidecar.
    pub orphan_blobs: Vec<String>,
    /// Metadata sidecars with no blob file.
    pub orphan_metadata: Vec<String>,
    /// Blobs whose file length disagrees with their metadata.
    pub size_mismatches: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphan_blobs.is_empty()
            && self.orphan_metadata.is_empty()
            && self.size_mismatches.is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Totals {
    blob_count: u64,
    total_size: u64,
    pinned_count: u64,
    pinned_size: u64,
}

/// The on-disk ciphertext store. One instance owns its directory; all
/// mutations are serialized through an internal lock so metadata
/// read-modify-write cycles never interleave.
pub struct BlobStore {
    root: PathBuf,
    blobs_dir: PathBuf,
    meta_dir: PathBuf,
    tmp_dir: PathBuf,
    capacity: u64,
    max_blob_size: u64,
    compression_enabled: bool,
    totals: Mutex<Totals>,
    write_lock: Mutex<()>,
}

impl BlobStore {
    /// Opens (or initializes) a store at `options.root`, clearing crash
    /// residue from `tmp/` and rebuilding the size totals from disk.
    pub fn open(options: StoreOptions) -> Result<Self, StorageError> {
        let blobs_dir = options.root.join("blobs");
        let meta_dir = options.root.join("meta");
        let tmp_dir = options.root.join("tmp");
        std::fs::create_dir_all(&blobs_dir)?;
        std::fs::create_dir_all(&meta_dir)?;
        std::fs::create_dir_all(&tmp_dir)?;

        // Scratch files from an interrupted write are garbage by definition.
        for entry in std::fs::read_dir(&tmp_dir)? {
            let entry = entry?;
            let _ = std::fs::remove_file(entry.path());
        }

        let store = BlobStore {
            root: options.root,
            blobs_dir,
            meta_dir,
            tmp_dir,
            capacity: options.capacity,
            max_blob_size: options.max_blob_size,
            compression_enabled: options.compression_enabled,
            totals: Mutex::new(Totals::default()),
            write_lock: Mutex::new(()),
        };

        let mut totals = Totals::default();
        for md in store.list()? {
            totals.blob_count += 1;
            totals.total_size += md.size;
            if md.pinned {
                totals.pinned_count += 1;
                totals.pinned_size += md.size;
            }
        }
        *store.totals.lock() = totals;
        metrics().set_store_size_bytes(totals.total_size);
        metrics().set_pinned_size_bytes(totals.pinned_size);
        tracing::info!(
            target: "storage",
            event = "store_opened",
            root = %store.root.display(),
            blobs = totals.blob_count,
            bytes = totals.total_size,
        );
        Ok(store)
    }

    fn blob_path(&self, cid: &Cid) -> PathBuf {
        self.blobs_dir.join(format!("{cid}.{BLOB_EXT}"))
    }

    fn meta_path(&self, cid: &Cid) -> PathBuf {
        self.meta_dir.join(format!("{cid}.{META_EXT}"))
    }

    fn write_atomic(&self, tmp_name: &str, dest: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let tmp = self.tmp_dir.join(tmp_name);
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, dest)?;
        Ok(())
    }

    fn write_metadata(&self, md: &BlobMetadata) -> Result<(), StorageError> {
        let bytes = serde_json::to_vec_pretty(md)?;
        self.write_atomic(&format!("{}.json.tmp", md.cid), &self.meta_path(&md.cid), &bytes)
    }

    /// Stores a blob. Idempotent: a CID that is already present is a no-op
    /// reported through `already_stored`.
    pub fn put(
        &self,
        cid: &Cid,
        bytes: &[u8],
        mime_type: &str,
        extras: PutExtras,
    ) -> Result<PutOutcome, StorageError> {
        let size = bytes.len() as u64;
        if size > self.max_blob_size {
            return Err(StorageError::PayloadTooLarge {
                size,
                max: self.max_blob_size,
            });
        }

        let _guard = self.write_lock.lock();
        if self.meta_path(cid).exists() {
            return Ok(PutOutcome {
                already_stored: true,
            });
        }

        let used = self.totals.lock().total_size;
        if used + size > self.capacity {
            return Err(StorageError::StorageFull {
                needed: size,
                available: self.capacity.saturating_sub(used),
            });
        }

        let (file_bytes, compressed) = if self.compression_enabled {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes)?;
            (encoder.finish()?, true)
        } else {
            (bytes.to_vec(), false)
        };

        // Blob first, sidecar second: a crash between the two leaves an
        // orphan blob, which the integrity scan reports and `put` overwrites
        // on retry. The reverse order would advertise a blob that is absent.
        self.write_atomic(&format!("{cid}.enc.tmp"), &self.blob_path(cid), &file_bytes)?;

        let mut md = BlobMetadata::new(*cid, size, mime_type, now_millis());
        md.compressed = compressed;
        md.content_type = extras.content_type;
        md.guild_id = extras.guild_id;
        md.integrity_hash = extras.integrity_hash;
        if let Some(from_peer) = extras.from_peer {
            md.replication.from_peer = Some(from_peer);
            md.replication.replicated_at = Some(md.created_at);
        }
        self.write_metadata(&md)?;

        let mut totals = self.totals.lock();
        totals.blob_count += 1;
        totals.total_size += size;
        metrics().inc_blobs_stored();
        metrics().inc_bytes_written(size);
        metrics().set_store_size_bytes(totals.total_size);
        drop(totals);

        tracing::debug!(target: "storage", event = "blob_stored", cid = %cid, size);
        Ok(PutOutcome {
            already_stored: false,
        })
    }

    /// Reads a blob and its metadata, updating the access metrics.
    /// Corruption (bytes no longer hashing to the CID) is surfaced so the
    /// caller can fall back to a consensus fetch.
    pub fn get(&self, cid: &Cid) -> Result<(Vec<u8>, BlobMetadata), StorageError> {
        let started = Instant::now();
        let mut md = self.read_metadata(cid)?;

        let file_bytes = std::fs::read(self.blob_path(cid)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::BlobNotFound(cid.to_hex())
            } else {
                StorageError::Io(e)
            }
        })?;
        let bytes = if md.compressed {
            let mut decoder = GzDecoder::new(file_bytes.as_slice());
            let mut out = Vec::with_capacity(md.size as usize);
            decoder.read_to_end(&mut out)?;
            out
        } else {
            file_bytes
        };

        if !verify_cid(cid, &bytes) {
            tracing::warn!(target: "storage", event = "blob_corrupt", cid = %cid);
            return Err(StorageError::Corrupt(cid.to_hex()));
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        {
            let _guard = self.write_lock.lock();
            md.metrics.retrieval_count += 1;
            md.metrics.last_accessed = now_millis();
            let n = md.metrics.retrieval_count as f64;
            md.metrics.avg_latency_ms = md.metrics.avg_latency_ms + (elapsed_ms - md.metrics.avg_latency_ms) / n;
            if let Err(e) = self.write_metadata(&md) {
                // Losing one metrics update is harmless.
                tracing::warn!(target: "storage", event = "metrics_update_failed", cid = %cid, error = %e);
            }
        }
        Ok((bytes, md))
    }

    /// Reads a blob without touching its access metrics. For internal
    /// callers (replication backfill) that must not skew client statistics.
    pub fn peek(&self, cid: &Cid) -> Result<(Vec<u8>, BlobMetadata), StorageError> {
        let md = self.read_metadata(cid)?;
        let file_bytes = std::fs::read(self.blob_path(cid)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::BlobNotFound(cid.to_hex())
            } else {
                StorageError::Io(e)
            }
        })?;
        let bytes = if md.compressed {
            let mut decoder = GzDecoder::new(file_bytes.as_slice());
            let mut out = Vec::with_capacity(md.size as usize);
            decoder.read_to_end(&mut out)?;
            out
        } else {
            file_bytes
        };
        if !verify_cid(cid, &bytes) {
            return Err(StorageError::Corrupt(cid.to_hex()));
        }
        Ok((bytes, md))
    }

    pub fn has_blob(&self, cid: &Cid) -> bool {
        self.meta_path(cid).exists() && self.blob_path(cid).exists()
    }

    fn read_metadata(&self, cid: &Cid) -> Result<BlobMetadata, StorageError> {
        let raw = std::fs::read(self.meta_path(cid)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::BlobNotFound(cid.to_hex())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn get_metadata(&self, cid: &Cid) -> Result<BlobMetadata, StorageError> {
        self.read_metadata(cid)
    }

    /// Applies a closure to the metadata record and persists the result.
    pub fn update_metadata<F>(&self, cid: &Cid, patch: F) -> Result<BlobMetadata, StorageError>
    where
        F: FnOnce(&mut BlobMetadata),
    {
        let _guard = self.write_lock.lock();
        let mut md = self.read_metadata(cid)?;
        let was_pinned = md.pinned;
        patch(&mut md);
        self.write_metadata(&md)?;
        if was_pinned != md.pinned {
            let mut totals = self.totals.lock();
            if md.pinned {
                totals.pinned_count += 1;
                totals.pinned_size += md.size;
            } else {
                totals.pinned_count = totals.pinned_count.saturating_sub(1);
                totals.pinned_size = totals.pinned_size.saturating_sub(md.size);
            }
            metrics().set_pinned_size_bytes(totals.pinned_size);
        }
        Ok(md)
    }

    /// Removes the blob and its sidecar atomically enough for GC: the
    /// sidecar goes first so a crash leaves an orphan blob, never a
    /// metadata record pointing at nothing.
    pub fn delete(&self, cid: &Cid) -> Result<u64, StorageError> {
        let _guard = self.write_lock.lock();
        let md = self.read_metadata(cid)?;
        std::fs::remove_file(self.meta_path(cid))?;
        if let Err(e) = std::fs::remove_file(self.blob_path(cid)) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(StorageError::Io(e));
            }
        }

        let mut totals = self.totals.lock();
        totals.blob_count = totals.blob_count.saturating_sub(1);
        totals.total_size = totals.total_size.saturating_sub(md.size);
        if md.pinned {
            totals.pinned_count = totals.pinned_count.saturating_sub(1);
            totals.pinned_size = totals.pinned_size.saturating_sub(md.size);
        }
        metrics().inc_blobs_deleted();
        metrics().set_store_size_bytes(totals.total_size);
        metrics().set_pinned_size_bytes(totals.pinned_size);
        drop(totals);

        tracing::debug!(target: "storage", event = "blob_deleted", cid = %cid, size = md.size);
        Ok(md.size)
    }

    /// Every metadata record in the store. Unparseable sidecars are skipped
    /// with a warning rather than failing the listing.
    pub fn list(&self) -> Result<Vec<BlobMetadata>, StorageError> {
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&self.meta_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(META_EXT) {
                continue;
            }
            let raw = std::fs::read(&path)?;
            match serde_json::from_slice::<BlobMetadata>(&raw) {
                Ok(md) => out.push(md),
                Err(e) => {
                    tracing::warn!(target: "storage", event = "metadata_unreadable", path = %path.display(), error = %e);
                }
            }
        }
        Ok(out)
    }

    pub fn stats(&self) -> StoreStats {
        let totals = self.totals.lock();
        StoreStats {
            blob_count: totals.blob_count,
            total_size: totals.total_size,
            pinned_count: totals.pinned_count,
            pinned_size: totals.pinned_size,
        }
    }

    /// Free bytes on the filesystem backing the store.
    pub fn free_disk(&self) -> Result<u64, StorageError> {
        Ok(available_space(&self.root)?)
    }

    pub fn pin(&self, cid: &Cid) -> Result<(), StorageError> {
        self.update_metadata(cid, |md| md.pinned = true)?;
        tracing::info!(target: "storage", event = "blob_pinned", cid = %cid);
        Ok(())
    }

    pub fn unpin(&self, cid: &Cid) -> Result<(), StorageError> {
        self.update_metadata(cid, |md| md.pinned = false)?;
        tracing::info!(target: "storage", event = "blob_unpinned", cid = %cid);
        Ok(())
    }

    pub fn list_pinned(&self) -> Result<Vec<BlobMetadata>, StorageError> {
        Ok(self.list()?.into_iter().filter(|md| md.pinned).collect())
    }

    /// Cross-checks blob files against metadata sidecars.
    pub fn integrity_scan(&self) -> Result<IntegrityReport, StorageError> {
        let mut report = IntegrityReport::default();
        for md in self.list()? {
            let path = self.blob_path(&md.cid);
            match std::fs::metadata(&path) {
                Ok(stat) => {
                    // Compressed blobs legitimately differ in on-disk length.
                    if !md.compressed && stat.len() != md.size {
                        report.size_mismatches.push(md.cid.to_hex());
                    }
                }
                Err(_) => report.orphan_metadata.push(md.cid.to_hex()),
            }
        }
        for entry in std::fs::read_dir(&self.blobs_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BLOB_EXT) {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if let Ok(cid) = stem.parse::<Cid>() {
                if !self.meta_path(&cid).exists() {
                    report.orphan_blobs.push(cid.to_hex());
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecave_crypto::cid_of;
    use tempfile::tempdir;

    fn open_store(dir: &Path, capacity: u64) -> BlobStore {
        BlobStore::open(StoreOptions {
            root: dir.to_path_buf(),
            capacity,
            max_blob_size: 1024 * 1024,
            compression_enabled: false,
        })
        .unwrap()
    }

    #[test]
    fn put_get_round_trip() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 1 << 20);
        let bytes = b"hello".to_vec();
        let cid = cid_of(&bytes);

        let out = store.put(&cid, &bytes, "text/plain", PutExtras::default()).unwrap();
        assert!(!out.already_stored);
        assert!(store.has_blob(&cid));

        let (read, md) = store.get(&cid).unwrap();
        assert_eq!(read, bytes);
        assert_eq!(md.size, 5);
        assert_eq!(md.metrics.retrieval_count, 1);
        assert!(md.metrics.last_accessed > 0);

        // Second read bumps the counter again.
        let (_, md) = store.get(&cid).unwrap();
        assert_eq!(md.metrics.retrieval_count, 2);
    }

    #[test]
    fn put_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 1 << 20);
        let bytes = b"dup".to_vec();
        let cid = cid_of(&bytes);
        assert!(!store.put(&cid, &bytes, "x", PutExtras::default()).unwrap().already_stored);
        assert!(store.put(&cid, &bytes, "x", PutExtras::default()).unwrap().already_stored);
        assert_eq!(store.stats().blob_count, 1);
    }

    #[test]
    fn rejects_when_capacity_exceeded() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 8);
        let a = b"aaaaa".to_vec();
        let b = b"bbbbb".to_vec();
        store.put(&cid_of(&a), &a, "x", PutExtras::default()).unwrap();
        let err = store.put(&cid_of(&b), &b, "x", PutExtras::default()).unwrap_err();
        assert!(matches!(err, StorageError::StorageFull { .. }));
    }

    #[test]
    fn accepts_write_reaching_exact_capacity_then_rejects_next() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 10);
        let a = b"aaaaa".to_vec();
        let b = b"bbbbb".to_vec();
        let c = b"c".to_vec();
        store.put(&cid_of(&a), &a, "x", PutExtras::default()).unwrap();
        // 5 + 5 == capacity: accepted.
        store.put(&cid_of(&b), &b, "x", PutExtras::default()).unwrap();
        // Any further non-empty write is rejected.
        assert!(matches!(
            store.put(&cid_of(&c), &c, "x", PutExtras::default()),
            Err(StorageError::StorageFull { .. })
        ));
    }

    #[test]
    fn rejects_oversized_blob() {
        let dir = tempdir().unwrap();
        let store = BlobStore::open(StoreOptions {
            root: dir.path().to_path_buf(),
            capacity: 1 << 20,
            max_blob_size: 4,
            compression_enabled: false,
        })
        .unwrap();
        let bytes = b"too big".to_vec();
        assert!(matches!(
            store.put(&cid_of(&bytes), &bytes, "x", PutExtras::default()),
            Err(StorageError::PayloadTooLarge { size: 7, max: 4 })
        ));
    }

    #[test]
    fn delete_removes_both_files_and_updates_totals() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 1 << 20);
        let bytes = b"gone".to_vec();
        let cid = cid_of(&bytes);
        store.put(&cid, &bytes, "x", PutExtras::default()).unwrap();
        let freed = store.delete(&cid).unwrap();
        assert_eq!(freed, 4);
        assert!(!store.has_blob(&cid));
        assert_eq!(store.stats().blob_count, 0);
        assert_eq!(store.stats().total_size, 0);
        assert!(matches!(
            store.get(&cid),
            Err(StorageError::BlobNotFound(_))
        ));
    }

    #[test]
    fn pin_unpin_tracks_reserved_bytes() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 1 << 20);
        let bytes = b"keep me".to_vec();
        let cid = cid_of(&bytes);
        store.put(&cid, &bytes, "x", PutExtras::default()).unwrap();

        store.pin(&cid).unwrap();
        assert_eq!(store.stats().pinned_count, 1);
        assert_eq!(store.stats().pinned_size, 7);
        assert_eq!(store.list_pinned().unwrap().len(), 1);

        // Pinning twice must not double-count.
        store.pin(&cid).unwrap();
        assert_eq!(store.stats().pinned_count, 1);

        store.unpin(&cid).unwrap();
        assert_eq!(store.stats().pinned_count, 0);
        assert_eq!(store.stats().pinned_size, 0);
    }

    #[test]
    fn compressed_round_trip() {
        let dir = tempdir().unwrap();
        let store = BlobStore::open(StoreOptions {
            root: dir.path().to_path_buf(),
            capacity: 1 << 20,
            max_blob_size: 1 << 20,
            compression_enabled: true,
        })
        .unwrap();
        let bytes = vec![42u8; 4096];
        let cid = cid_of(&bytes);
        store.put(&cid, &bytes, "x", PutExtras::default()).unwrap();
        let (read, md) = store.get(&cid).unwrap();
        assert_eq!(read, bytes);
        assert!(md.compressed);
        assert_eq!(md.size, 4096);
    }

    #[test]
    fn corrupt_blob_is_reported() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 1 << 20);
        let bytes = b"pristine".to_vec();
        let cid = cid_of(&bytes);
        store.put(&cid, &bytes, "x", PutExtras::default()).unwrap();
        std::fs::write(dir.path().join("blobs").join(format!("{cid}.enc")), b"tampered").unwrap();
        assert!(matches!(store.get(&cid), Err(StorageError::Corrupt(_))));
    }

    #[test]
    fn totals_rebuilt_on_reopen() {
        let dir = tempdir().unwrap();
        let bytes = b"persist".to_vec();
        let cid = cid_of(&bytes);
        {
            let store = open_store(dir.path(), 1 << 20);
            store.put(&cid, &bytes, "x", PutExtras::default()).unwrap();
            store.pin(&cid).unwrap();
        }
        let store = open_store(dir.path(), 1 << 20);
        let stats = store.stats();
        assert_eq!(stats.blob_count, 1);
        assert_eq!(stats.total_size, 7);
        assert_eq!(stats.pinned_count, 1);
    }

    #[test]
    fn integrity_scan_reports_orphans() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 1 << 20);
        let bytes = b"paired".to_vec();
        let cid = cid_of(&bytes);
        store.put(&cid, &bytes, "x", PutExtras::default()).unwrap();
        assert!(store.integrity_scan().unwrap().is_clean());

        // Drop the sidecar: the blob becomes an orphan.
        std::fs::remove_file(dir.path().join("meta").join(format!("{cid}.json"))).unwrap();
        let report = store.integrity_scan().unwrap();
        assert_eq!(report.orphan_blobs, vec![cid.to_hex()]);
    }
}
