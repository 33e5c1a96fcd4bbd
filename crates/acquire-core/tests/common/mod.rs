#![allow(dead_code)]

pub mod memory_source;
pub mod range_server;

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;

use acquire_core::config::{AcquireConfig, RetryConfig};
use acquire_core::fetcher::RangeSource;
use acquire_core::store::JobStore;
use acquire_core::Engine;
use sha2::{Digest, Sha256};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Deterministic, incompressible-looking bytes.
pub fn noise(len: usize, seed: u32) -> Vec<u8> {
    let mut x = seed.wrapping_mul(2_654_435_761).max(1);
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            x as u8
        })
        .collect()
}

/// Entries of the test archive: (name, contents).
pub fn bundle_entries() -> Vec<(String, Vec<u8>)> {
    vec![
        ("readme.txt".to_string(), b"asset bundle for tests\n".to_vec()),
        ("data/level1.bin".to_string(), noise(9 * 1024, 1)),
        ("data/level2.bin".to_string(), noise(7 * 1024 + 13, 2)),
        ("data/textures/atlas.bin".to_string(), noise(4 * 1024, 3)),
    ]
}

/// A stored (uncompressed) zip holding `bundle_entries`.
pub fn bundle_zip() -> Vec<u8> {
    let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
    let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    zw.add_directory("data/", opts).unwrap();
    for (name, data) in bundle_entries() {
        zw.start_file(name, opts).unwrap();
        zw.write_all(&data).unwrap();
    }
    zw.finish().unwrap().into_inner()
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Small ranges and no retry delays so a ~20 KiB archive spans many chunks.
pub fn test_config() -> AcquireConfig {
    AcquireConfig {
        chunk_size_bytes: 1024,
        workers: 3,
        progress_tick_ms: 10,
        retry: Some(RetryConfig {
            max_attempts: 2,
            base_delay_secs: 0.0,
            max_delay_secs: 0,
            jitter: false,
        }),
        ..AcquireConfig::default()
    }
}

pub async fn open_store(dir: &Path) -> JobStore {
    JobStore::open_at(dir.join("jobs.db")).await.unwrap()
}

pub async fn open_engine(store: JobStore, source: Arc<dyn RangeSource>) -> Engine {
    Engine::open(store, source, test_config()).await.unwrap()
}

/// Assert every bundle entry was extracted intact under `staging`.
pub fn assert_staged(staging: &Path) {
    for (name, data) in bundle_entries() {
        let got = std::fs::read(staging.join(&name))
            .unwrap_or_else(|e| panic!("{name} not staged: {e}"));
        assert_eq!(got, data, "{name} content");
    }
}
