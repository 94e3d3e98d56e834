// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Fault specification grammar.
//!
//! ```text
//! spec   := [("eio " | "rnd ")] entry (";" entry)* ";"?
//! entry  := page "," limit
//! ```
//!
//! Example: `"eio 1,3;1024,10;"` marks pages 1 and 1024 as faulty with
//! limits 3 and 10, failing with EIO once exhausted.

use std::collections::BTreeSet;

use rand_core::RngCore;
use tracing::{debug, info, warn};

use crate::error::{NorsimError, Result};
use crate::page::{DeadBit, PageCategory, PageTable, PAGE_BITFLIP_LIMIT};
use crate::policy::{Behavior, FaultPolicy};

const PREFIX_EIO: &str = "eio ";
const PREFIX_RND: &str = "rnd ";
const NODE_DELIM: char = ';';
const PROP_DELIM: char = ',';

/// A parsed but not yet applied fault specification.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct FaultSpec {
    /// Behavior given by the prefix, if any.
    pub behavior: Option<Behavior>,
    pub entries: Vec<FaultEntry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultEntry {
    pub page: u64,
    pub limit: u32,
}

impl FaultSpec {
    /// Parses `input`, stopping silently at the first malformed entry.
    pub fn parse(input: &str) -> Self {
        let (behavior, body) = if let Some(rest) = input.strip_prefix(PREFIX_EIO) {
            (Some(Behavior::ReturnError), rest)
        } else if let Some(rest) = input.strip_prefix(PREFIX_RND) {
            (Some(Behavior::CorruptData), rest)
        } else {
            (None, input)
        };

        let mut entries = Vec::new();
        let mut rest = body;
        while !rest.is_empty() {
            let (node, tail) = match rest.split_once(NODE_DELIM) {
                Some((node, tail)) => (node, tail),
                None => (rest, ""),
            };
            match parse_entry(node) {
                Some(entry) => entries.push(entry),
                None => {
                    debug!("Stopped parsing at malformed entry: {:?}", node);
                    break;
                }
            }
            rest = tail;
        }

        Self { behavior, entries }
    }

    /// Writes the spec into the page table and policy.
    ///
    /// Fails on the first entry naming a page past the end of the table.
    /// Returns the number of pages that took the category.
    pub fn apply<R: RngCore>(
        &self,
        category: PageCategory,
        erase_size: u64,
        table: &mut PageTable,
        policy: &mut FaultPolicy,
        rng: &mut R,
    ) -> Result<usize> {
        let behavior = self.behavior.unwrap_or_default();
        match self.behavior {
            Some(b) => info!("Set \"{:?} pages\" behavior: {}", category, b.as_str()),
            None => info!("No \"{:?} pages\" behavior defined, assuming \"eio\"", category),
        }
        policy.set(category, behavior);

        let mut applied = 0;
        for entry in &self.entries {
            debug!("\t({})\tpage={}\tlimit={}", category.sign(), entry.page, entry.limit);
            if entry.page >= table.len() as u64 {
                return Err(NorsimError::PageIndexOutOfBounds {
                    page: entry.page,
                    pages: table.len(),
                });
            }
            let index = entry.page as usize;
            let dead_bits = seed_dead_bits(rng, erase_size);
            for dead in &dead_bits {
                debug!("\t\tbyte={}, bit={}", dead.byte, dead.bit);
            }
            if table.assign(index, category, entry.limit, dead_bits)? {
                applied += 1;
            } else {
                warn!(
                    "Page {} already configured as {:?}, ignoring {:?}",
                    index,
                    table.get(index).category(),
                    category
                );
            }
        }
        info!("Set \"{:?} pages\": {}", category, applied);
        Ok(applied)
    }
}

/// Parses and applies one spec string in a single step.
pub fn parse_fault_spec<R: RngCore>(
    input: &str,
    category: PageCategory,
    erase_size: u64,
    table: &mut PageTable,
    policy: &mut FaultPolicy,
    rng: &mut R,
) -> Result<usize> {
    FaultSpec::parse(input).apply(category, erase_size, table, policy, rng)
}

fn parse_entry(node: &str) -> Option<FaultEntry> {
    let (page, limit) = node.split_once(PROP_DELIM)?;
    if !is_number(page) || !is_number(limit) {
        return None;
    }
    let limit = limit.parse::<u32>().ok()?;
    // An index too large for u64 is still an index past the table.
    let page = page.parse::<u64>().unwrap_or(u64::MAX);
    Some(FaultEntry { page, limit })
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn seed_dead_bits<R: RngCore>(rng: &mut R, erase_size: u64) -> Vec<DeadBit> {
    if erase_size == 0 {
        return Vec::new();
    }
    let mut bits = BTreeSet::new();
    for _ in 0..PAGE_BITFLIP_LIMIT {
        let byte = (rng.next_u64() % erase_size) as usize;
        let bit = (rng.next_u32() % 8) as u8;
        bits.insert(DeadBit { byte, bit });
    }
    bits.into_iter().collect()
}
