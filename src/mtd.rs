// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! MTD device descriptor and the ioctl requests the simulator answers.
//!
//! Raw argument buffers follow the kernel's `mtd-user.h` layouts in native
//! byte order:
//! - `mtd_info_user`: `[TYPE(1)][PAD(3)][FLAGS(4)][SIZE(4)][ERASESIZE(4)][WRITESIZE(4)][OOBSIZE(4)][PADDING(8)]`
//! - `erase_info_user`: `[START(4)][LENGTH(4)]`

use byteorder::{ByteOrder, NativeEndian};
use serde::Serialize;

use crate::error::{NorsimError, Result};

pub const MTD_NORFLASH: u8 = 3;
pub const MTD_WRITEABLE: u32 = 0x400;
pub const MTD_BIT_WRITEABLE: u32 = 0x800;
pub const MTD_CAP_NORFLASH: u32 = MTD_WRITEABLE | MTD_BIT_WRITEABLE;

pub const MEMGETINFO: u64 = 0x8020_4D01;
pub const MEMERASE: u64 = 0x4008_4D02;
pub const MEMUNLOCK: u64 = 0x4008_4D06;

/// Read-only description of the simulated device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MtdInfo {
    pub kind: u8,
    pub flags: u32,
    pub size: u32,
    pub erase_size: u32,
    pub write_size: u32,
    pub oob_size: u32,
}

impl MtdInfo {
    pub const SIZE: usize = 32;

    pub fn nor_flash(size: u32, erase_size: u32) -> Self {
        Self {
            kind: MTD_NORFLASH,
            flags: MTD_CAP_NORFLASH,
            size,
            erase_size,
            write_size: 1,
            oob_size: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0] = self.kind;
        NativeEndian::write_u32(&mut buf[4..8], self.flags);
        NativeEndian::write_u32(&mut buf[8..12], self.size);
        NativeEndian::write_u32(&mut buf[12..16], self.erase_size);
        NativeEndian::write_u32(&mut buf[16..20], self.write_size);
        NativeEndian::write_u32(&mut buf[20..24], self.oob_size);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(NorsimError::InvalidRange {
                offset: 0,
                length: buf.len() as u64,
            });
        }
        Ok(Self {
            kind: buf[0],
            flags: NativeEndian::read_u32(&buf[4..8]),
            size: NativeEndian::read_u32(&buf[8..12]),
            erase_size: NativeEndian::read_u32(&buf[12..16]),
            write_size: NativeEndian::read_u32(&buf[16..20]),
            oob_size: NativeEndian::read_u32(&buf[20..24]),
        })
    }
}

/// An erase-region request: byte offset and byte count.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EraseInfo {
    pub start: u32,
    pub length: u32,
}

impl EraseInfo {
    pub const SIZE: usize = 8;

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        NativeEndian::write_u32(&mut buf[0..4], self.start);
        NativeEndian::write_u32(&mut buf[4..8], self.length);
        buf
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        if buf.len() < Self::SIZE {
            return Err(NorsimError::InvalidRange {
                offset: 0,
                length: buf.len() as u64,
            });
        }
        Ok(Self {
            start: NativeEndian::read_u32(&buf[0..4]),
            length: NativeEndian::read_u32(&buf[4..8]),
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MtdRequest {
    GetInfo,
    Unlock(EraseInfo),
    Erase(EraseInfo),
}

impl MtdRequest {
    /// Decodes a request code and its argument buffer.
    pub fn decode(code: u64, arg: &[u8]) -> Result<Self> {
        match code {
            MEMGETINFO => Ok(MtdRequest::GetInfo),
            MEMUNLOCK => Ok(MtdRequest::Unlock(EraseInfo::from_bytes(arg)?)),
            MEMERASE => Ok(MtdRequest::Erase(EraseInfo::from_bytes(arg)?)),
            other => Err(NorsimError::UnsupportedOperation(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nor_flash_descriptor() {
        let info = MtdInfo::nor_flash(65536, 256);
        assert_eq!(info.kind, MTD_NORFLASH);
        assert_eq!(info.flags, MTD_CAP_NORFLASH);
        assert_eq!(info.erase_size, 256);
        assert_eq!(info.write_size, 1);
        assert_eq!(info.oob_size, 0);

        let bytes = info.to_bytes();
        assert_eq!(bytes[0], MTD_NORFLASH);
        assert_eq!(&bytes[24..32], &[0u8; 8]);
        assert_eq!(MtdInfo::from_bytes(&bytes).unwrap(), info);
    }

    #[test]
    fn test_decode_requests() {
        let ei = EraseInfo { start: 0x100, length: 0x200 };
        assert_eq!(MtdRequest::decode(MEMGETINFO, &[]).unwrap(), MtdRequest::GetInfo);
        assert_eq!(MtdRequest::decode(MEMUNLOCK, &ei.to_bytes()).unwrap(), MtdRequest::Unlock(ei));
        assert_eq!(MtdRequest::decode(MEMERASE, &ei.to_bytes()).unwrap(), MtdRequest::Erase(ei));

        assert!(matches!(
            MtdRequest::decode(0x4D4D, &[]),
            Err(NorsimError::UnsupportedOperation(0x4D4D))
        ));
        assert!(matches!(
            MtdRequest::decode(MEMERASE, &[0u8; 4]),
            Err(NorsimError::InvalidRange { .. })
        ));
    }
}
