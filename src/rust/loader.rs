// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//======================================================================================================================
// Imports
//======================================================================================================================

use crate::{
    runtime::fail::Fail,
    system::SystemState,
};
use ::std::fs;

//======================================================================================================================
// Constants
//======================================================================================================================

/// Raw per-core memory image, loaded at the tile's RAM base.
pub const SECTOR_RAW: u8 = 1;

/// ELF payload; decoding belongs to the external loader.
pub const SECTOR_ELF: u8 = 2;

//======================================================================================================================
// Structures
//======================================================================================================================

/// One sector of an SE container, addressed to a core.
pub struct SeSector {
    pub sector_type: u8,
    pub core: u8,
    pub data: Vec<u8>,
}

/// An SE container: "SIRE" magic, core count, "XMOS" magic, a format
/// version, then per-core sectors.
pub struct SeImage {
    pub num_cores: u32,
    pub version: u16,
    pub sectors: Vec<SeSector>,
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

//======================================================================================================================
// Associated Functions
//======================================================================================================================

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], Fail> {
        if self.remaining() < n {
            return Err(Fail::new(libc::EINVAL, "truncated image"));
        }
        let slice: &'a [u8] = &self.data[self.offset..self.offset + n];
        self.offset += n;
        Ok(slice)
    }

    fn read_u16(&mut self) -> Result<u16, Fail> {
        let bytes: &[u8] = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, Fail> {
        let bytes: &[u8] = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl SeImage {
    pub fn read(filename: &str) -> Result<Self, Fail> {
        let data: Vec<u8> = match fs::read(filename) {
            Ok(data) => data,
            Err(e) => {
                let cause: String = format!("cannot open \"{}\": {}", filename, e);
                return Err(Fail::new(libc::ENOENT, &cause));
            },
        };
        Self::parse(&data)
    }

    pub fn parse(data: &[u8]) -> Result<Self, Fail> {
        let mut r: Reader = Reader::new(data);
        if r.take(4)? != b"SIRE" {
            return Err(Fail::new(libc::EINVAL, "bad SIRE magic"));
        }
        let num_cores: u32 = r.read_u32()?;
        if r.take(4)? != b"XMOS" {
            return Err(Fail::new(libc::EINVAL, "bad XMOS magic"));
        }
        let version: u16 = r.read_u16()?;
        let _padding: &[u8] = r.take(2)?;

        let mut sectors: Vec<SeSector> = Vec::new();
        while r.remaining() > 0 {
            let header: &[u8] = r.take(4)?;
            let sector_type: u8 = header[0];
            let core: u8 = header[1];
            let length: u32 = r.read_u32()?;
            let data: &[u8] = r.take(length as usize)?;
            sectors.push(SeSector {
                sector_type,
                core,
                data: data.to_vec(),
            });
        }
        Ok(Self {
            num_cores,
            version,
            sectors,
        })
    }

    /// Loads raw memory sectors into the tiles of `sys`. ELF sectors are
    /// rejected here; decoding them is the external loader's concern.
    pub fn load_into(&self, sys: &mut SystemState) -> Result<(), Fail> {
        for sector in self.sectors.iter() {
            match sector.sector_type {
                SECTOR_RAW => {
                    let core: usize = sector.core as usize;
                    if core >= sys.num_cores() {
                        return Err(Fail::new(libc::EINVAL, &format!("no core {} in system", core)));
                    }
                    if !sys.core_mut(core).write_memory(0, &sector.data) {
                        return Err(Fail::new(libc::EINVAL, "image does not fit in memory"));
                    }
                    debug!("loaded {} bytes into core {}", sector.data.len(), core);
                },
                SECTOR_ELF => {
                    return Err(Fail::new(libc::ENOTSUP, "ELF sectors require an external loader"));
                },
                other => {
                    warn!("skipping unknown sector type {}", other);
                },
            }
        }
        Ok(())
    }
}

//======================================================================================================================
// Unit Tests
//======================================================================================================================
