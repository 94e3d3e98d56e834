// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Fault policy: what a worn-out page does and how data gets corrupted.

use rand_core::RngCore;
use serde::Serialize;

use crate::page::{Page, PageCategory};

/// How an exhausted page misbehaves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub enum Behavior {
    /// `eio`: the operation fails.
    #[default]
    ReturnError,
    /// `rnd`: the operation succeeds with one byte corrupted.
    CorruptData,
}

impl Behavior {
    pub fn as_str(self) -> &'static str {
        match self {
            Behavior::ReturnError => "eio",
            Behavior::CorruptData => "rnd",
        }
    }
}

/// One behavior per faulty category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
pub struct FaultPolicy {
    pub weak: Behavior,
    pub grave: Behavior,
}

impl FaultPolicy {
    pub fn behavior(&self, category: PageCategory) -> Option<Behavior> {
        match category {
            PageCategory::Normal => None,
            PageCategory::Weak => Some(self.weak),
            PageCategory::Grave => Some(self.grave),
        }
    }

    pub(crate) fn set(&mut self, category: PageCategory, behavior: Behavior) {
        match category {
            PageCategory::Normal => {}
            PageCategory::Weak => self.weak = behavior,
            PageCategory::Grave => self.grave = behavior,
        }
    }
}

/// Outcome of consulting the policy for one page access.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    PassThrough,
    Fail,
    Corrupt,
}

/// Which operation is being decided; each category only wears on one path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    Erase,
}

impl FaultPolicy {
    /// Decides the fate of an access whose counter was already incremented.
    ///
    /// Grave pages misbehave on reads, Weak pages on writes and erases, both
    /// only once their wear counter is past the limit.
    pub fn decide(&self, page: &Page, access: Access) -> Verdict {
        let affected = matches!(
            (page.category(), access),
            (PageCategory::Grave, Access::Read)
                | (PageCategory::Weak, Access::Write)
                | (PageCategory::Weak, Access::Erase)
        );
        if !affected || !page.is_exhausted() {
            return Verdict::PassThrough;
        }
        match self.behavior(page.category()) {
            Some(Behavior::ReturnError) => Verdict::Fail,
            Some(Behavior::CorruptData) => Verdict::Corrupt,
            None => Verdict::PassThrough,
        }
    }
}

/// A single-byte corruption applied to a buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Corruption {
    pub offset: usize,
    pub expected: u8,
    pub actual: u8,
}

/// XOR mask for the byte at `offset`: the low byte of the offset itself,
/// or 0xFF where that would be zero so the byte always changes.
pub fn corruption_mask(offset: usize) -> u8 {
    match (offset & 0xFF) as u8 {
        0 => 0xFF,
        mask => mask,
    }
}

/// Flips exactly one pseudo-randomly chosen byte of `buf`.
///
/// Returns `None` for an empty buffer.
pub fn corrupt_one_byte<R: RngCore>(rng: &mut R, buf: &mut [u8]) -> Option<Corruption> {
    if buf.is_empty() {
        return None;
    }
    let offset = (rng.next_u64() % buf.len() as u64) as usize;
    let expected = buf[offset];
    let actual = expected ^ corruption_mask(offset);
    buf[offset] = actual;
    Some(Corruption {
        offset,
        expected,
        actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageTable;
    use rand_core::SeedableRng;
    use rand_pcg::Pcg32;

    #[test]
    fn test_mask_never_zero() {
        for offset in 0..1024 {
            assert_ne!(corruption_mask(offset), 0);
        }
        assert_eq!(corruption_mask(3), 3);
        assert_eq!(corruption_mask(256), 0xFF);
    }

    #[test]
    fn test_corrupt_changes_exactly_one_byte() {
        let mut rng = Pcg32::seed_from_u64(7);
        for len in 1..64 {
            let original = vec![0x5Au8; len];
            let mut buf = original.clone();
            let c = corrupt_one_byte(&mut rng, &mut buf).unwrap();
            let diffs = original.iter().zip(&buf).filter(|(a, b)| a != b).count();
            assert_eq!(diffs, 1);
            assert_eq!(buf[c.offset], c.actual);
            assert_eq!(original[c.offset], c.expected);
        }
        assert!(corrupt_one_byte(&mut rng, &mut []).is_none());
    }

    #[test]
    fn test_decide_by_category_and_access() {
        let mut table = PageTable::new(3).unwrap();
        table.assign(1, PageCategory::Weak, 1, Vec::new()).unwrap();
        table.assign(2, PageCategory::Grave, 1, Vec::new()).unwrap();
        let policy = FaultPolicy {
            weak: Behavior::ReturnError,
            grave: Behavior::CorruptData,
        };

        table.get_mut(0).reads = 100;
        table.get_mut(0).erases = 100;
        for access in [Access::Read, Access::Write, Access::Erase] {
            assert_eq!(policy.decide(table.get(0), access), Verdict::PassThrough);
        }

        table.get_mut(1).erases = 2;
        assert_eq!(policy.decide(table.get(1), Access::Read), Verdict::PassThrough);
        assert_eq!(policy.decide(table.get(1), Access::Write), Verdict::Fail);
        assert_eq!(policy.decide(table.get(1), Access::Erase), Verdict::Fail);

        table.get_mut(2).reads = 1;
        assert_eq!(policy.decide(table.get(2), Access::Read), Verdict::PassThrough);
        table.get_mut(2).reads = 2;
        assert_eq!(policy.decide(table.get(2), Access::Read), Verdict::Corrupt);
        assert_eq!(policy.decide(table.get(2), Access::Write), Verdict::PassThrough);
    }
}
