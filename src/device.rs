// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! The simulated NOR device: page table, fault policy and backing store
//! behind one lock.
//!
//! Every operation holds the lock for its whole duration, including the
//! backing-store I/O, so the fault decision is atomic with the counter
//! update it depends on.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use rand_core::SeedableRng;
use rand_pcg::Pcg32;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::{NorsimError, Result};
use crate::mtd::{MtdInfo, MtdRequest};
use crate::page::{LockState, Page, PageCategory, PageTable};
use crate::parser::FaultSpec;
use crate::policy::{corrupt_one_byte, Access, FaultPolicy, Verdict};
use crate::report::{Report, ReportKind, ReportTrigger};
use crate::store::{BackingStore, FileStore, MemStore, ERASED_BYTE};

struct DeviceState {
    table: PageTable,
    policy: FaultPolicy,
    store: Box<dyn BackingStore>,
    rng: Pcg32,
    bit_flips: bool,
}

pub struct Device {
    state: Mutex<DeviceState>,
    info: MtdInfo,
    erase_size: u64,
    page_count: usize,
    trigger: ReportTrigger,
}

impl Device {
    /// Opens the device described by `cfg`.
    ///
    /// File-backed when `cfg.cache_file` is set, in memory otherwise.
    pub fn open(cfg: &DeviceConfig) -> Result<Self> {
        let store: Box<dyn BackingStore> = match &cfg.cache_file {
            Some(path) => {
                info!("Set cache file: {}", path.display());
                Box::new(FileStore::open(path, cfg.size)?)
            }
            None => {
                let size = usize::try_from(cfg.size).map_err(|_| NorsimError::InvalidGeometry {
                    size: cfg.size,
                    erase_size: cfg.erase_size,
                })?;
                Box::new(MemStore::new(size))
            }
        };
        Self::with_store(cfg, store)
    }

    /// Builds a device over an existing store.
    ///
    /// Any configuration error aborts construction; a device never runs
    /// partially configured.
    pub fn with_store(cfg: &DeviceConfig, store: Box<dyn BackingStore>) -> Result<Self> {
        let invalid = NorsimError::InvalidGeometry {
            size: cfg.size,
            erase_size: cfg.erase_size,
        };
        if cfg.erase_size == 0
            || cfg.size < cfg.erase_size
            || cfg.size % cfg.erase_size != 0
            || cfg.size > u64::from(u32::MAX)
            || store.len() != cfg.size
        {
            return Err(invalid);
        }
        info!("Set size: 0x{:X} ({}kB)", cfg.size, cfg.size / 1024);
        info!("Set erase_size: 0x{:X} ({}kB)", cfg.erase_size, cfg.erase_size / 1024);

        let page_count = usize::try_from(cfg.page_count()).map_err(|_| NorsimError::AllocationFailure {
            pages: usize::MAX,
        })?;
        info!("Set page count: {}", page_count);
        let mut table = PageTable::new(page_count)?;
        let mut policy = FaultPolicy::default();

        let seed = cfg.seed.unwrap_or_else(clock_seed);
        debug!("Random seed: {}", seed);
        let mut rng = Pcg32::seed_from_u64(seed);

        for (spec, category) in [
            (&cfg.weak_pages, PageCategory::Weak),
            (&cfg.grave_pages, PageCategory::Grave),
        ] {
            match spec {
                Some(spec) => {
                    FaultSpec::parse(spec).apply(category, cfg.erase_size, &mut table, &mut policy, &mut rng)?;
                }
                None => info!("No {:?} pages given, assuming none", category),
            }
        }
        if cfg.weak_pages.is_none() && cfg.grave_pages.is_none() {
            warn!("No failures defined, faults won't be forwarded to user program");
        }

        let device = Self {
            state: Mutex::new(DeviceState {
                table,
                policy,
                store,
                rng,
                bit_flips: cfg.bit_flips,
            }),
            info: MtdInfo::nor_flash(cfg.size as u32, cfg.erase_size as u32),
            erase_size: cfg.erase_size,
            page_count,
            trigger: ReportTrigger::new(),
        };
        info!("SUMMARY:");
        log_report(&device.report(ReportKind::Short));
        Ok(device)
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn erase_size(&self) -> u64 {
        self.erase_size
    }

    /// Handle for requesting a report from outside the operation path.
    pub fn report_trigger(&self) -> ReportTrigger {
        self.trigger.clone()
    }

    /// Copy of the descriptor.
    pub fn get_info(&self) -> MtdInfo {
        let _state = self.enter("get_info");
        self.info
    }

    /// Reads `length` bytes at `offset` within page `index`.
    pub fn read_page(&self, index: usize, offset: usize, length: usize) -> Result<Vec<u8>> {
        let mut guard = self.enter("read");
        self.check_access(index, offset, length)?;
        let addr = self.page_addr(index) + offset as u64;
        let DeviceState {
            table,
            policy,
            store,
            rng,
            bit_flips,
        } = &mut *guard;

        let page = table.get_mut(index);
        page.reads += 1;
        let verdict = policy.decide(page, Access::Read);
        if verdict == Verdict::Fail {
            info!("EIO error at page: {}", index);
            return Err(NorsimError::Fault {
                page: index,
                category: page.category(),
            });
        }

        let mut buf = vec![0u8; length];
        store.read_at(addr, &mut buf)?;
        if *bit_flips && page.category() != PageCategory::Normal {
            page.apply_dead_bits(offset, &mut buf);
        }
        if verdict == Verdict::Corrupt {
            if let Some(c) = corrupt_one_byte(rng, &mut buf) {
                info!(
                    "RND error at page: {}[{}], expected: 0x{:02X}, is 0x{:02X}",
                    index,
                    offset + c.offset,
                    c.expected,
                    c.actual
                );
            }
        }
        Ok(buf)
    }

    /// Writes `data` at `offset` within page `index`.
    ///
    /// On a corrupting page the stored bytes differ from `data` in one place.
    /// Unlike a raw `write(2)` on the simulated device, which corrupts the
    /// caller's buffer in place, `data` is borrowed immutably and a corrupted
    /// copy is written instead.
    pub fn write_page(&self, index: usize, offset: usize, data: &[u8]) -> Result<()> {
        let mut guard = self.enter("write");
        self.check_access(index, offset, data.len())?;
        let addr = self.page_addr(index) + offset as u64;
        let DeviceState {
            table,
            policy,
            store,
            rng,
            ..
        } = &mut *guard;

        let page = table.get_mut(index);
        page.writes += 1;
        match policy.decide(page, Access::Write) {
            Verdict::PassThrough => store.write_at(addr, data)?,
            Verdict::Fail => {
                info!("EIO error at page: {}", index);
                return Err(NorsimError::Fault {
                    page: index,
                    category: page.category(),
                });
            }
            Verdict::Corrupt => {
                let mut buf = data.to_vec();
                if let Some(c) = corrupt_one_byte(rng, &mut buf) {
                    info!(
                        "RND error at page: {}[{}], expected: 0x{:02X}, is 0x{:02X}",
                        index,
                        offset + c.offset,
                        c.expected,
                        c.actual
                    );
                }
                store.write_at(addr, &buf)?;
            }
        }
        Ok(())
    }

    /// Positioned read at a device byte offset.
    pub fn read_at(&self, offset: u64, length: usize) -> Result<Vec<u8>> {
        let (index, in_page) = self.split_offset(offset, length as u64)?;
        self.read_page(index, in_page, length)
    }

    /// Positioned write at a device byte offset.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<()> {
        let (index, in_page) = self.split_offset(offset, data.len() as u64)?;
        self.write_page(index, in_page, data)
    }

    /// Unlocks every erase block in `[start, start + length)`.
    pub fn unlock(&self, start: u64, length: u64) -> Result<()> {
        let mut guard = self.enter("unlock");
        let pages = self.erase_region(start, length)?;
        debug!("Got MEMUNLOCK request at pages: {:?}", pages);
        for index in pages {
            guard.table.get_mut(index).lock = LockState::Unlocked;
        }
        Ok(())
    }

    /// Erases every erase block in `[start, start + length)`.
    ///
    /// All covered blocks must be unlocked. Each processed block is relocked
    /// whatever the outcome; the first failure is returned.
    pub fn erase(&self, start: u64, length: u64) -> Result<()> {
        let mut guard = self.enter("erase");
        let pages = self.erase_region(start, length)?;
        debug!("Got MEMERASE request at pages: {:?}", pages);
        let DeviceState {
            table,
            policy,
            store,
            rng,
            ..
        } = &mut *guard;

        if let Some(index) = pages.clone().find(|&i| !table.get(i).is_unlocked()) {
            warn!("Page {} locked, rejecting erase request", index);
            return Err(NorsimError::LockedPage { page: index });
        }

        let mut result = Ok(());
        for index in pages {
            let addr = self.page_addr(index);
            let page = table.get_mut(index);
            page.erases += 1;
            let outcome = match policy.decide(page, Access::Erase) {
                Verdict::PassThrough => {
                    let block = vec![ERASED_BYTE; self.erase_size as usize];
                    store.write_at(addr, &block).map_err(NorsimError::from)
                }
                Verdict::Fail => {
                    info!("EIO error at page: {}", index);
                    Err(NorsimError::Fault {
                        page: index,
                        category: page.category(),
                    })
                }
                Verdict::Corrupt => {
                    let mut block = vec![ERASED_BYTE; self.erase_size as usize];
                    if let Some(c) = corrupt_one_byte(rng, &mut block) {
                        info!("RND error at page: {}[{}] = 0x{:02X}", index, c.offset, c.actual);
                    }
                    store.write_at(addr, &block).map_err(NorsimError::from)
                }
            };
            page.lock = LockState::Locked;
            if result.is_ok() {
                result = outcome;
            }
        }
        result
    }

    /// Executes a raw MTD ioctl against its argument buffer.
    pub fn ioctl(&self, code: u64, arg: &mut [u8]) -> Result<()> {
        match MtdRequest::decode(code, arg)? {
            MtdRequest::GetInfo => {
                if arg.len() < MtdInfo::SIZE {
                    return Err(NorsimError::InvalidRange {
                        offset: 0,
                        length: arg.len() as u64,
                    });
                }
                debug!("Got MEMGETINFO request");
                arg[..MtdInfo::SIZE].copy_from_slice(&self.get_info().to_bytes());
                Ok(())
            }
            MtdRequest::Unlock(ei) => self.unlock(u64::from(ei.start), u64::from(ei.length)),
            MtdRequest::Erase(ei) => self.erase(u64::from(ei.start), u64::from(ei.length)),
        }
    }

    /// Snapshot of page `index`, if it exists.
    pub fn page(&self, index: usize) -> Option<Page> {
        let state = self.lock();
        if index < state.table.len() {
            Some(state.table.get(index).clone())
        } else {
            None
        }
    }

    pub fn policy(&self) -> FaultPolicy {
        self.lock().policy
    }

    pub fn report(&self, kind: ReportKind) -> Report {
        let state = self.lock();
        Report::capture(&state.table, &state.policy, kind)
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the lock for one operation, serving a pending report first.
    fn enter(&self, op: &str) -> MutexGuard<'_, DeviceState> {
        let state = self.lock();
        if let Some(kind) = self.trigger.take() {
            log_report(&Report::capture(&state.table, &state.policy, kind));
        }
        debug!("handling {}", op);
        state
    }

    fn page_addr(&self, index: usize) -> u64 {
        index as u64 * self.erase_size
    }

    fn check_access(&self, index: usize, offset: usize, length: usize) -> Result<()> {
        let within = (offset as u64)
            .checked_add(length as u64)
            .map_or(false, |end| end <= self.erase_size);
        if index >= self.page_count || !within {
            warn!("Access exceeds eraseblock boundary: page={}, offset={}, length={}", index, offset, length);
            return Err(NorsimError::InvalidRange {
                offset: (index as u64).saturating_mul(self.erase_size).saturating_add(offset as u64),
                length: length as u64,
            });
        }
        Ok(())
    }

    fn split_offset(&self, offset: u64, length: u64) -> Result<(usize, usize)> {
        let index = offset / self.erase_size;
        if index >= self.page_count as u64 {
            return Err(NorsimError::InvalidRange { offset, length });
        }
        Ok((index as usize, (offset % self.erase_size) as usize))
    }

    /// Pages covered by an aligned, in-bounds, non-empty region.
    fn erase_region(&self, start: u64, length: u64) -> Result<std::ops::Range<usize>> {
        let aligned = start % self.erase_size == 0 && length % self.erase_size == 0 && length > 0;
        let end = start.checked_add(length);
        match end {
            Some(end) if aligned && end <= self.info.size as u64 => {
                Ok((start / self.erase_size) as usize..(end / self.erase_size) as usize)
            }
            _ => {
                warn!("Invalid erase_info_t, start=0x{:04X}, length=0x{:04X}", start, length);
                Err(NorsimError::InvalidRange { offset: start, length })
            }
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        info!("Closing device");
        log_report(&Report::capture(&state.table, &state.policy, ReportKind::Detailed));
    }
}

fn log_report(report: &Report) {
    for line in report.to_string().lines() {
        info!("{}", line);
    }
}

fn clock_seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn device(weak: Option<&str>, grave: Option<&str>) -> Device {
        let cfg = DeviceConfig {
            weak_pages: weak.map(str::to_string),
            grave_pages: grave.map(str::to_string),
            seed: Some(3),
            ..DeviceConfig::default()
        };
        Device::open(&cfg).unwrap()
    }

    #[test]
    fn test_geometry_validation() {
        for (size, erase_size) in [(1024, 0), (1000, 256), (128, 256)] {
            let cfg = DeviceConfig {
                size,
                erase_size,
                ..DeviceConfig::default()
            };
            let res = Device::with_store(&cfg, Box::new(MemStore::new(size as usize)));
            assert!(matches!(res, Err(NorsimError::InvalidGeometry { .. })));
        }

        let cfg = DeviceConfig::default();
        let res = Device::with_store(&cfg, Box::new(MemStore::new(1024)));
        assert!(matches!(res, Err(NorsimError::InvalidGeometry { .. })));
    }

    #[test]
    fn test_out_of_bounds_spec_aborts() {
        let cfg = DeviceConfig {
            grave_pages: Some("1,1;256,1;".to_string()),
            ..DeviceConfig::default()
        };
        assert!(matches!(
            Device::open(&cfg),
            Err(NorsimError::PageIndexOutOfBounds { page: 256, pages: 256 })
        ));
    }

    #[test]
    fn test_unlock_idempotent() {
        let dev = device(None, None);
        dev.unlock(512, 256).unwrap();
        dev.unlock(512, 256).unwrap();
        assert!(dev.page(2).unwrap().is_unlocked());
        assert!(!dev.page(1).unwrap().is_unlocked());
        assert!(!dev.page(3).unwrap().is_unlocked());
    }

    #[test]
    fn test_multi_page_erase() {
        let dev = device(None, None);
        dev.write_page(0, 0, &[0u8; 4]).unwrap();
        dev.write_page(1, 0, &[0u8; 4]).unwrap();

        dev.unlock(0, 256).unwrap();
        assert!(matches!(dev.erase(0, 512), Err(NorsimError::LockedPage { page: 1 })));
        assert_eq!(dev.page(0).unwrap().erases(), 0);
        assert!(dev.page(0).unwrap().is_unlocked());

        dev.unlock(0, 512).unwrap();
        dev.erase(0, 512).unwrap();
        for i in 0..2 {
            let page = dev.page(i).unwrap();
            assert_eq!(page.erases(), 1);
            assert_eq!(page.lock_state(), LockState::Locked);
            assert_eq!(dev.read_page(i, 0, 4).unwrap(), vec![ERASED_BYTE; 4]);
        }
    }

    #[test]
    fn test_erase_region_bounds() {
        let dev = device(None, None);
        assert!(matches!(dev.unlock(0, 0), Err(NorsimError::InvalidRange { .. })));
        assert!(matches!(dev.unlock(65536, 256), Err(NorsimError::InvalidRange { .. })));
        assert!(matches!(dev.erase(65280, 512), Err(NorsimError::InvalidRange { .. })));
        assert!(matches!(dev.unlock(u64::MAX - 255, 256), Err(NorsimError::InvalidRange { .. })));
    }

    #[test]
    fn test_positioned_access() {
        let dev = device(None, None);
        dev.write_at(256 * 5 + 10, b"nor").unwrap();
        assert_eq!(dev.read_page(5, 10, 3).unwrap(), b"nor");
        assert_eq!(dev.read_at(256 * 5 + 10, 3).unwrap(), b"nor");
        assert!(matches!(dev.read_at(256 * 5 + 250, 8), Err(NorsimError::InvalidRange { .. })));
        assert!(matches!(dev.read_at(65536, 1), Err(NorsimError::InvalidRange { .. })));
        assert!(matches!(dev.read_page(256, 0, 1), Err(NorsimError::InvalidRange { .. })));
    }

    #[test]
    fn test_dead_bits_on_reads() {
        let cfg = DeviceConfig {
            grave_pages: Some("4,100;".to_string()),
            bit_flips: true,
            seed: Some(11),
            ..DeviceConfig::default()
        };
        let dev = Device::open(&cfg).unwrap();
        let page = dev.page(4).unwrap();
        assert!(!page.dead_bits().is_empty());

        let data = dev.read_page(4, 0, 256).unwrap();
        for dead in page.dead_bits() {
            assert_eq!(data[dead.byte] & (1 << dead.bit), 0);
        }
        let flipped: u32 = data.iter().map(|b| b.count_zeros()).sum();
        assert!(flipped as usize <= page.dead_bits().len());

        // Normal pages keep clean reads.
        assert_eq!(dev.read_page(5, 0, 256).unwrap(), vec![ERASED_BYTE; 256]);
    }

    #[test]
    fn test_ioctl_raw_buffers() {
        use crate::mtd::{EraseInfo, MEMERASE, MEMGETINFO, MEMUNLOCK};

        let dev = device(None, None);
        let mut info = [0u8; MtdInfo::SIZE];
        dev.ioctl(MEMGETINFO, &mut info).unwrap();
        assert_eq!(MtdInfo::from_bytes(&info).unwrap(), dev.get_info());
        assert!(matches!(dev.ioctl(MEMGETINFO, &mut [0u8; 8]), Err(NorsimError::InvalidRange { .. })));

        let mut ei = EraseInfo { start: 256, length: 256 }.to_bytes();
        assert!(matches!(dev.ioctl(MEMERASE, &mut ei), Err(NorsimError::LockedPage { page: 1 })));
        dev.ioctl(MEMUNLOCK, &mut ei).unwrap();
        dev.ioctl(MEMERASE, &mut ei).unwrap();
        assert_eq!(dev.page(1).unwrap().erases(), 1);

        assert!(matches!(dev.ioctl(0xDEAD, &mut []), Err(NorsimError::UnsupportedOperation(0xDEAD))));
    }

    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl LogCapture {
        /// Runs `f` with log output collected, returning what was logged.
        fn collect(f: impl FnOnce()) -> String {
            let capture = LogCapture::default();
            let writer = capture.clone();
            let subscriber = tracing_subscriber::fmt()
                .with_ansi(false)
                .with_writer(move || writer.clone())
                .finish();
            tracing::subscriber::with_default(subscriber, f);
            let bytes = capture.0.lock().unwrap().clone();
            String::from_utf8(bytes).unwrap()
        }
    }

    #[test]
    fn test_report_trigger_served_on_next_op() {
        let dev = device(Some("1,1;"), None);
        dev.read_page(7, 0, 1).unwrap();
        let trigger = dev.report_trigger();

        let quiet = LogCapture::collect(|| {
            dev.get_info();
        });
        assert!(!quiet.contains("Page report:"));

        trigger.request(ReportKind::Detailed);
        let logged = LogCapture::collect(|| {
            dev.get_info();
        });
        assert!(logged.contains("Page report:"));
        assert!(logged.contains("Page     1: W(limit=1"));
        assert!(logged.contains("Page     7: N(reads=1"));
        assert_eq!(trigger.take(), None);

        // Served once only.
        let again = LogCapture::collect(|| {
            dev.get_info();
        });
        assert!(!again.contains("Page report:"));
    }
}
