// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Read-only snapshots of page state for human consumption.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::page::{LockState, Page, PageCategory, PageTable};
use crate::policy::FaultPolicy;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ReportKind {
    /// Faulty pages only.
    Short,
    /// Faulty pages plus every Normal page that was touched.
    Detailed,
}

const TRIGGER_NONE: u8 = 0;
const TRIGGER_SHORT: u8 = 1;
const TRIGGER_DETAILED: u8 = 2;

/// Pending report request, settable from a signal handler.
///
/// Storing into the flag is a single atomic write, so a handler for
/// `SIGUSR1`/`SIGUSR2` can call [`ReportTrigger::request`] directly. The
/// device consumes the flag at the start of its next operation.
#[derive(Clone, Debug, Default)]
pub struct ReportTrigger {
    flag: Arc<AtomicU8>,
}

impl ReportTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, kind: ReportKind) {
        let value = match kind {
            ReportKind::Short => TRIGGER_SHORT,
            ReportKind::Detailed => TRIGGER_DETAILED,
        };
        self.flag.store(value, Ordering::SeqCst);
    }

    /// Clears and returns the pending request.
    pub fn take(&self) -> Option<ReportKind> {
        match self.flag.swap(TRIGGER_NONE, Ordering::SeqCst) {
            TRIGGER_SHORT => Some(ReportKind::Short),
            TRIGGER_DETAILED => Some(ReportKind::Detailed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub index: usize,
    pub category: PageCategory,
    pub limit: u32,
    pub remaining: u64,
    pub reads: u64,
    pub writes: u64,
    pub erases: u64,
    pub lock: LockState,
}

impl PageSummary {
    fn of(index: usize, page: &Page) -> Self {
        Self {
            index,
            category: page.category(),
            limit: page.limit(),
            remaining: page.remaining(),
            reads: page.reads(),
            writes: page.writes(),
            erases: page.erases(),
            lock: page.lock_state(),
        }
    }
}

impl fmt::Display for PageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.category {
            PageCategory::Normal => write!(
                f,
                "Page {:5}: N(reads={}, writes={}, erases={})",
                self.index, self.reads, self.writes, self.erases
            ),
            category => write!(
                f,
                "Page {:5}: {}(limit={}, remaining={}, reads={}, writes={}, erases={})",
                self.index,
                category.sign(),
                self.limit,
                self.remaining,
                self.reads,
                self.writes,
                self.erases
            ),
        }
    }
}

/// Min/max counters over every page of one category.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CounterStats {
    pub pages: usize,
    pub min_reads: u64,
    pub max_reads: u64,
    pub min_writes: u64,
    pub max_writes: u64,
    pub min_erases: u64,
    pub max_erases: u64,
}

impl CounterStats {
    fn add(&mut self, page: &Page) {
        if self.pages == 0 {
            self.min_reads = page.reads();
            self.min_writes = page.writes();
            self.min_erases = page.erases();
        }
        self.pages += 1;
        self.min_reads = self.min_reads.min(page.reads());
        self.max_reads = self.max_reads.max(page.reads());
        self.min_writes = self.min_writes.min(page.writes());
        self.max_writes = self.max_writes.max(page.writes());
        self.min_erases = self.min_erases.min(page.erases());
        self.max_erases = self.max_erases.max(page.erases());
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub normal: CounterStats,
    pub weak: CounterStats,
    pub grave: CounterStats,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Report {
    pub kind: ReportKind,
    pub policy: FaultPolicy,
    pub pages: Vec<PageSummary>,
    pub stats: Statistics,
}

impl Report {
    pub fn capture(table: &PageTable, policy: &FaultPolicy, kind: ReportKind) -> Self {
        let mut pages = Vec::new();
        let mut stats = Statistics::default();
        for (index, page) in table.iter() {
            let touched = page.reads() > 0 || page.writes() > 0 || page.erases() > 0;
            match page.category() {
                PageCategory::Normal => {
                    stats.normal.add(page);
                    if kind == ReportKind::Detailed && touched {
                        pages.push(PageSummary::of(index, page));
                    }
                }
                PageCategory::Weak => {
                    stats.weak.add(page);
                    pages.push(PageSummary::of(index, page));
                }
                PageCategory::Grave => {
                    stats.grave.add(page);
                    pages.push(PageSummary::of(index, page));
                }
            }
        }
        Self {
            kind,
            policy: *policy,
            pages,
            stats,
        }
    }

    pub fn page(&self, index: usize) -> Option<&PageSummary> {
        self.pages.iter().find(|p| p.index == index)
    }
}

fn write_stats(f: &mut fmt::Formatter<'_>, name: &str, s: &CounterStats) -> fmt::Result {
    writeln!(f, "\t{} pages:", name)?;
    writeln!(f, "\t\tmin reads:  {}", s.min_reads)?;
    writeln!(f, "\t\tmax reads:  {}", s.max_reads)?;
    writeln!(f, "\t\tmin writes: {}", s.min_writes)?;
    writeln!(f, "\t\tmax writes: {}", s.max_writes)?;
    writeln!(f, "\t\tmin erases: {}", s.min_erases)?;
    writeln!(f, "\t\tmax erases: {}", s.max_erases)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Page report:")?;
        for page in &self.pages {
            writeln!(f, "\t{}", page)?;
        }
        writeln!(f, "Statistics:")?;
        write_stats(f, "NORMAL", &self.stats.normal)?;
        write_stats(f, "WEAK", &self.stats.weak)?;
        write_stats(f, "GRAVE", &self.stats.grave)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PageTable {
        let mut table = PageTable::new(4).unwrap();
        table.assign(1, PageCategory::Weak, 3, Vec::new()).unwrap();
        table.assign(3, PageCategory::Grave, 10, Vec::new()).unwrap();
        table
    }

    #[test]
    fn test_page_line_format() {
        let mut t = table();
        t.get_mut(1).erases = 1;
        t.get_mut(1).writes = 4;
        let report = Report::capture(&t, &FaultPolicy::default(), ReportKind::Short);
        assert_eq!(
            report.page(1).unwrap().to_string(),
            "Page     1: W(limit=3, remaining=2, reads=0, writes=4, erases=1)"
        );
        assert_eq!(
            report.page(3).unwrap().to_string(),
            "Page     3: G(limit=10, remaining=10, reads=0, writes=0, erases=0)"
        );
    }

    #[test]
    fn test_detailed_includes_touched_normal_pages() {
        let mut t = table();
        t.get_mut(2).reads = 5;

        let short = Report::capture(&t, &FaultPolicy::default(), ReportKind::Short);
        assert_eq!(short.pages.len(), 2);
        assert!(short.page(2).is_none());

        let detailed = Report::capture(&t, &FaultPolicy::default(), ReportKind::Detailed);
        assert_eq!(detailed.pages.len(), 3);
        assert_eq!(
            detailed.page(2).unwrap().to_string(),
            "Page     2: N(reads=5, writes=0, erases=0)"
        );
        assert!(detailed.page(0).is_none());
    }

    #[test]
    fn test_statistics() {
        let mut t = table();
        t.get_mut(0).reads = 7;
        t.get_mut(2).reads = 2;
        t.get_mut(2).writes = 9;
        let report = Report::capture(&t, &FaultPolicy::default(), ReportKind::Short);
        let normal = report.stats.normal;
        assert_eq!(normal.pages, 2);
        assert_eq!((normal.min_reads, normal.max_reads), (2, 7));
        assert_eq!((normal.min_writes, normal.max_writes), (0, 9));
        assert_eq!(report.stats.weak.pages, 1);

        let text = report.to_string();
        assert!(text.starts_with("Page report:\n"));
        assert!(text.contains("\tGRAVE pages:\n"));
    }

    #[test]
    fn test_trigger_consumed_once() {
        let trigger = ReportTrigger::new();
        assert_eq!(trigger.take(), None);
        let handle = trigger.clone();
        handle.request(ReportKind::Short);
        handle.request(ReportKind::Detailed);
        assert_eq!(trigger.take(), Some(ReportKind::Detailed));
        assert_eq!(trigger.take(), None);
    }
}
