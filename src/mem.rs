//! Guest physical memory access.
//!
//! All controller DMA (command/response rings, buffer descriptor lists, audio
//! samples, the DMA position buffer) goes through the [`MemoryBus`] trait, so
//! the embedder decides how guest RAM is represented. [`SharedRam`] is a flat
//! RAM-backed implementation for tests and simple machines.

use std::ops::Range;
use std::sync::{PoisonError, RwLock};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("guest memory access out of bounds: addr={addr:#x} len={len}")]
    OutOfBounds { addr: u64, len: usize },
}

/// Byte-addressed guest physical memory.
///
/// Methods take `&self`: the bus is shared between the MMIO dispatch path and
/// the audio worker threads, so implementations provide their own interior
/// mutability (see [`SharedRam`]).
pub trait MemoryBus: Send + Sync {
    fn read_physical(&self, paddr: u64, buf: &mut [u8]) -> Result<(), MemoryError>;
    fn write_physical(&self, paddr: u64, buf: &[u8]) -> Result<(), MemoryError>;

    fn read_u16(&self, paddr: u64) -> Result<u16, MemoryError> {
        let mut buf = [0u8; 2];
        self.read_physical(paddr, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&self, paddr: u64) -> Result<u32, MemoryError> {
        let mut buf = [0u8; 4];
        self.read_physical(paddr, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_u64(&self, paddr: u64) -> Result<u64, MemoryError> {
        let mut buf = [0u8; 8];
        self.read_physical(paddr, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    fn write_u32(&self, paddr: u64, value: u32) -> Result<(), MemoryError> {
        self.write_physical(paddr, &value.to_le_bytes())
    }

    fn write_u64(&self, paddr: u64, value: u64) -> Result<(), MemoryError> {
        self.write_physical(paddr, &value.to_le_bytes())
    }

    /// Probes that `[paddr, paddr + len)` is accessible without transferring
    /// it. The default reads the first and last byte, which is exact for
    /// contiguous memory; sparse implementations should override it.
    fn check_range(&self, paddr: u64, len: u64) -> Result<(), MemoryError> {
        if len == 0 {
            return Ok(());
        }
        let mut probe = [0u8; 1];
        self.read_physical(paddr, &mut probe)?;
        let last = paddr.checked_add(len - 1).ok_or(MemoryError::OutOfBounds {
            addr: paddr,
            len: len as usize,
        })?;
        self.read_physical(last, &mut probe)
    }
}

/// Flat RAM-backed [`MemoryBus`].
pub struct SharedRam {
    ram: RwLock<Box<[u8]>>,
}

impl SharedRam {
    pub fn new(len: usize) -> Self {
        Self {
            ram: RwLock::new(vec![0u8; len].into_boxed_slice()),
        }
    }

    pub fn len(&self) -> usize {
        self.ram
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn span(paddr: u64, len: usize, ram_len: usize) -> Result<Range<usize>, MemoryError> {
    let oob = MemoryError::OutOfBounds { addr: paddr, len };
    let start = usize::try_from(paddr).map_err(|_| oob.clone())?;
    let end = start.checked_add(len).ok_or(oob.clone())?;
    if end > ram_len {
        return Err(oob);
    }
    Ok(start..end)
}

impl MemoryBus for SharedRam {
    fn read_physical(&self, paddr: u64, buf: &mut [u8]) -> Result<(), MemoryError> {
        let ram = self.ram.read().unwrap_or_else(PoisonError::into_inner);
        let range = span(paddr, buf.len(), ram.len())?;
        buf.copy_from_slice(&ram[range]);
        Ok(())
    }

    fn write_physical(&self, paddr: u64, buf: &[u8]) -> Result<(), MemoryError> {
        let mut ram = self.ram.write().unwrap_or_else(PoisonError::into_inner);
        let range = span(paddr, buf.len(), ram.len())?;
        ram[range].copy_from_slice(buf);
        Ok(())
    }
}
