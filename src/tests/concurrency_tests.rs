// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;
use std::thread;

use crate::config::DeviceConfig;
use crate::device::Device;

#[test]
fn test_concurrent_reads_respect_limit() {
    let cfg = DeviceConfig {
        grave_pages: Some("eio 5,100;".to_string()),
        seed: Some(5),
        ..DeviceConfig::default()
    };
    let dev = Arc::new(Device::open(&cfg).unwrap());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let dev = Arc::clone(&dev);
            thread::spawn(move || (0..50).filter(|_| dev.read_page(5, 0, 4).is_ok()).count())
        })
        .collect();
    let ok: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(ok, 100);
    assert_eq!(dev.page(5).unwrap().reads(), 400);
}
