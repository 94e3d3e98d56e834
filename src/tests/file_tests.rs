// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use crate::config::DeviceConfig;
use crate::device::Device;
use crate::error::NorsimError;
use crate::store::FileStore;
use tempfile::tempdir;

#[test]
fn test_file_backed_device_persists_bytes_only() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nor.img");
    FileStore::create(&path, 64 * 1024).unwrap();

    let cfg = DeviceConfig {
        cache_file: Some(path.clone()),
        weak_pages: Some("eio 3,5;".to_string()),
        seed: Some(1),
        ..DeviceConfig::default()
    };

    {
        let dev = Device::open(&cfg).unwrap();
        dev.write_page(0, 0, b"persist").unwrap();
        dev.unlock(768, 256).unwrap();
        dev.erase(768, 256).unwrap();
        assert_eq!(dev.page(3).unwrap().erases(), 1);
    }

    // Counters are re-derived from the spec on every run.
    let dev = Device::open(&cfg).unwrap();
    assert_eq!(dev.read_page(0, 0, 7).unwrap(), b"persist");
    assert_eq!(dev.page(3).unwrap().erases(), 0);
}

#[test]
fn test_file_size_mismatch_is_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nor.img");
    FileStore::create(&path, 4096).unwrap();

    let cfg = DeviceConfig {
        cache_file: Some(path),
        ..DeviceConfig::default()
    };
    match Device::open(&cfg) {
        Err(NorsimError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::InvalidInput),
        other => panic!("expected size mismatch, got {:?}", other.map(|_| ())),
    }
}
