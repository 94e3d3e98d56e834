// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Per-page state and the fixed-size page table.

use serde::Serialize;

use crate::error::{NorsimError, Result};

/// Maximum number of stuck bits seeded into a faulty page.
pub const PAGE_BITFLIP_LIMIT: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum PageCategory {
    Normal,
    /// Starts failing writes and erases once erase cycles exceed the limit.
    Weak,
    /// Starts failing reads once reads exceed the limit.
    Grave,
}

impl PageCategory {
    /// Single-letter tag used in reports.
    pub fn sign(self) -> char {
        match self {
            PageCategory::Normal => 'N',
            PageCategory::Weak => 'W',
            PageCategory::Grave => 'G',
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum LockState {
    #[default]
    Locked,
    Unlocked,
}

/// A bit stuck at zero: `(byte offset within the page, bit index)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct DeadBit {
    pub byte: usize,
    pub bit: u8,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page {
    category: PageCategory,
    limit: u32,
    pub(crate) reads: u64,
    pub(crate) writes: u64,
    pub(crate) erases: u64,
    pub(crate) lock: LockState,
    dead_bits: Vec<DeadBit>,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            category: PageCategory::Normal,
            limit: 0,
            reads: 0,
            writes: 0,
            erases: 0,
            lock: LockState::Locked,
            dead_bits: Vec::new(),
        }
    }
}

impl Page {
    pub fn category(&self) -> PageCategory {
        self.category
    }

    /// Endurance limit; meaningless for Normal pages.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    pub fn erases(&self) -> u64 {
        self.erases
    }

    pub fn lock_state(&self) -> LockState {
        self.lock
    }

    pub fn is_unlocked(&self) -> bool {
        self.lock == LockState::Unlocked
    }

    pub fn dead_bits(&self) -> &[DeadBit] {
        &self.dead_bits
    }

    /// The counter this page wears out on.
    pub fn wear(&self) -> u64 {
        match self.category {
            PageCategory::Normal => 0,
            PageCategory::Weak => self.erases,
            PageCategory::Grave => self.reads,
        }
    }

    /// Cycles left before the page starts misbehaving.
    pub fn remaining(&self) -> u64 {
        u64::from(self.limit).saturating_sub(self.wear())
    }

    /// Whether the wear counter has gone past the endurance limit.
    pub fn is_exhausted(&self) -> bool {
        self.category != PageCategory::Normal && self.wear() > u64::from(self.limit)
    }

    /// Forces every dead bit inside `buf` to zero.
    ///
    /// `buf` holds the page bytes starting at `offset`.
    pub fn apply_dead_bits(&self, offset: usize, buf: &mut [u8]) {
        let end = offset + buf.len();
        for dead in &self.dead_bits {
            if dead.byte >= offset && dead.byte < end {
                buf[dead.byte - offset] &= !(1u8 << dead.bit);
            }
        }
    }
}

/// Owns one [`Page`] per erase block. Never resized.
pub struct PageTable {
    pages: Vec<Page>,
    assigned: Vec<bool>,
}

impl PageTable {
    pub fn new(page_count: usize) -> Result<Self> {
        let mut pages = Vec::new();
        let mut assigned = Vec::new();
        if pages.try_reserve_exact(page_count).is_err()
            || assigned.try_reserve_exact(page_count).is_err()
        {
            return Err(NorsimError::AllocationFailure { pages: page_count });
        }
        pages.resize_with(page_count, Page::default);
        assigned.resize(page_count, false);
        Ok(Self { pages, assigned })
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range; callers validate first.
    pub fn get(&self, index: usize) -> &Page {
        &self.pages[index]
    }

    /// # Panics
    ///
    /// Panics if `index` is out of range; callers validate first.
    pub fn get_mut(&mut self, index: usize) -> &mut Page {
        &mut self.pages[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Page)> {
        self.pages.iter().enumerate()
    }

    /// Assigns category, limit and dead bits to a page.
    ///
    /// Only the first assignment of a page takes effect; later ones are
    /// ignored and reported as `false`.
    pub(crate) fn assign(
        &mut self,
        index: usize,
        category: PageCategory,
        limit: u32,
        dead_bits: Vec<DeadBit>,
    ) -> Result<bool> {
        if index >= self.pages.len() {
            return Err(NorsimError::PageIndexOutOfBounds {
                page: index as u64,
                pages: self.pages.len(),
            });
        }
        if self.assigned[index] {
            return Ok(false);
        }
        self.assigned[index] = true;
        let page = &mut self.pages[index];
        page.category = category;
        page.limit = limit;
        page.dead_bits = dead_bits;
        Ok(true)
    }
}
