//! Stream engine: cached buffer-descriptor-list state, the DMA transfer walk
//! and converter-format decoding.
//!
//! A stream's registers (control bits, format word, the LPIB cell) live in
//! the register file; what lives here is the state the controller latches
//! when the guest sets the run bit, and the walk that moves sample bytes
//! between guest memory and a caller buffer.

use thiserror::Error;

use crate::mem::{MemoryBus, MemoryError};

pub const STREAM_COUNT: usize = 8;
/// GCAP advertises four input streams followed by four output streams, so
/// hardware indices 0..4 capture and 4..8 play back.
pub const FIRST_OUTPUT_STREAM: usize = 4;

/// Bytes per buffer-descriptor-list entry in guest memory.
pub const BDL_ENTRY_BYTES: u64 = 16;

/// Bytes moved per DMA step. BDL entry lengths are multiples of this by
/// protocol and are not separately validated.
pub const DMA_STEP: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDir {
    /// Capture: samples flow host backend -> guest memory.
    Input,
    /// Playback: samples flow guest memory -> host backend.
    Output,
}

impl StreamDir {
    /// Fixed direction of a hardware stream index.
    pub fn of_index(idx: usize) -> Self {
        if idx < FIRST_OUTPUT_STREAM {
            Self::Input
        } else {
            Self::Output
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Input => 0,
            Self::Output => 1,
        }
    }
}

/// One cached BDL entry with its guest data range already probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BdlEntry {
    pub addr: u64,
    pub len: u32,
    pub ioc: bool,
}

/// Walk state for one hardware stream.
#[derive(Debug, Default, Clone)]
pub struct StreamState {
    pub running: bool,
    /// Guest-assigned stream tag from SDCTL bits 23:20.
    pub tag: u8,
    pub bdl: Vec<BdlEntry>,
    /// Index of the descriptor currently being walked.
    pub entry: usize,
    /// Byte offset within that descriptor.
    pub entry_off: u32,
    /// Position in buffer as published to the guest.
    pub pib: u32,
}

impl StreamState {
    /// Power-on / stream-reset state. The register half is reset by the
    /// controller.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("no running stream for tag {tag}")]
    UnmappedTag { tag: u8 },
    #[error("stream is not running")]
    NotRunning,
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Reads and caches a stream's buffer descriptor list.
///
/// `lvi` is the last-valid-index register value; the list holds `lvi + 1`
/// entries of 16 bytes each. Every entry's data range is probed so a start
/// with an unreachable buffer fails here rather than mid-stream.
pub fn load_bdl(mem: &dyn MemoryBus, base: u64, lvi: u32) -> Result<Vec<BdlEntry>, MemoryError> {
    let count = (lvi & 0xFF) + 1;
    mem.check_range(base, u64::from(count) * BDL_ENTRY_BYTES)?;
    let mut bdl = Vec::with_capacity(count as usize);
    for i in 0..u64::from(count) {
        let mut raw = [0u8; BDL_ENTRY_BYTES as usize];
        mem.read_physical(base + i * BDL_ENTRY_BYTES, &mut raw)?;
        let lo = u32::from_le_bytes(raw[0..4].try_into().unwrap());
        let hi = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        let len = u32::from_le_bytes(raw[8..12].try_into().unwrap());
        let ioc = u32::from_le_bytes(raw[12..16].try_into().unwrap()) & 1 != 0;
        let addr = u64::from(hi) << 32 | u64::from(lo);
        mem.check_range(addr, u64::from(len))?;
        bdl.push(BdlEntry { addr, len, ioc });
    }
    Ok(bdl)
}

/// Walks the cached BDL, copying `buf` to (input) or from (output) guest
/// memory in [`DMA_STEP`] units, and reports whether any descriptor consumed
/// along the way requested an interrupt.
///
/// `buf.len()` must be a multiple of [`DMA_STEP`]. The position counter
/// accumulates across descriptors and wraps to zero with the list.
pub fn run_transfer(
    st: &mut StreamState,
    mem: &dyn MemoryBus,
    dir: StreamDir,
    buf: &mut [u8],
) -> Result<bool, StreamError> {
    if !st.running {
        return Err(StreamError::NotRunning);
    }
    debug_assert_eq!(buf.len() % DMA_STEP, 0);
    let mut irq = false;
    for chunk in buf.chunks_exact_mut(DMA_STEP) {
        let Some(&entry) = st.bdl.get(st.entry) else {
            debug_assert!(false, "running stream walked past its descriptor list");
            return Err(StreamError::NotRunning);
        };
        let addr = entry.addr + u64::from(st.entry_off);
        match dir {
            StreamDir::Output => mem.read_physical(addr, chunk)?,
            StreamDir::Input => mem.write_physical(addr, chunk)?,
        }
        st.entry_off += DMA_STEP as u32;
        st.pib = st.pib.wrapping_add(DMA_STEP as u32);
        if st.entry_off >= entry.len {
            st.entry_off = 0;
            irq |= entry.ioc;
            st.entry += 1;
            if st.entry == st.bdl.len() {
                st.entry = 0;
                st.pib = 0;
            }
        }
    }
    Ok(irq)
}

/// Audio parameters handed to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub rate_hz: u32,
    pub channels: u8,
    pub bits: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("unsupported bits-per-sample encoding {0:#x}")]
    UnsupportedBits(u16),
}

const FMT_BASE_44K1: u16 = 1 << 14;

/// Decodes a 16-bit converter/SDnFMT format word.
///
/// Reserved multiplier encodings act as x1. An unknown bits-per-sample field
/// is an error: the backend has to know the sample size.
pub fn decode_format(fmt: u16) -> Result<StreamParams, FormatError> {
    let mut rate_hz: u32 = if fmt & FMT_BASE_44K1 != 0 { 44_100 } else { 48_000 };
    rate_hz *= match (fmt >> 11) & 0x7 {
        1 => 2,
        2 => 3,
        3 => 4,
        _ => 1,
    };
    rate_hz /= u32::from((fmt >> 8) & 0x7) + 1;
    let bits = match (fmt >> 4) & 0x7 {
        0b000 => 8,
        0b001 => 16,
        0b011 => 24,
        0b100 => 32,
        other => return Err(FormatError::UnsupportedBits(other)),
    };
    Ok(StreamParams {
        rate_hz,
        channels: (fmt & 0xF) as u8 + 1,
        bits,
    })
}
