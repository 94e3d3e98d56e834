// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Error types.

use std::io;
use thiserror::Error;

use crate::page::PageCategory;

pub const EIO: i32 = 5;
pub const EACCES: i32 = 13;
pub const EINVAL: i32 = 22;
pub const ENOTTY: i32 = 25;
pub const ENOMEM: i32 = 12;

#[derive(Error, Debug)]
pub enum NorsimError {
    /// The page table could not be allocated.
    #[error("Couldn't allocate memory for {pages} pages")]
    AllocationFailure { pages: usize },

    /// A fault spec names a page the device doesn't have.
    #[error("Trying to set non existing page (page={page} >= pages={pages})")]
    PageIndexOutOfBounds { page: u64, pages: usize },

    #[error("Invalid geometry: size={size}, erase_size={erase_size}")]
    InvalidGeometry { size: u64, erase_size: u64 },

    /// Unaligned request, or one that crosses an erase block.
    #[error("Invalid range: offset=0x{offset:X}, length=0x{length:X}")]
    InvalidRange { offset: u64, length: u64 },

    #[error("Page {page} locked, rejecting erase request")]
    LockedPage { page: usize },

    /// Simulated EIO on a worn-out page.
    #[error("EIO error at {category:?} page {page}")]
    Fault { page: usize, category: PageCategory },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Unsupported request: 0x{0:X}")]
    UnsupportedOperation(u64),
}

impl NorsimError {
    /// Whether this is an I/O failure, simulated or real.
    pub fn is_io_failure(&self) -> bool {
        matches!(self, NorsimError::Fault { .. } | NorsimError::Io(_))
    }

    /// The errno a syscall dispatcher should report for this error.
    pub fn errno(&self) -> i32 {
        match self {
            NorsimError::AllocationFailure { .. } => ENOMEM,
            NorsimError::PageIndexOutOfBounds { .. }
            | NorsimError::InvalidGeometry { .. }
            | NorsimError::InvalidRange { .. } => EINVAL,
            NorsimError::LockedPage { .. } => EACCES,
            NorsimError::Fault { .. } => EIO,
            NorsimError::Io(e) => e.raw_os_error().unwrap_or(EIO),
            NorsimError::UnsupportedOperation(_) => ENOTTY,
        }
    }
}

pub type Result<T> = std::result::Result<T, NorsimError>;
