//! Register window layout and backing store.
//!
//! Offsets and bit positions follow the Intel HDA controller programming
//! model; an unmodified guest driver is the consumer, so these must match the
//! datasheet bit-for-bit. Named sub-registers share their containing dword
//! (stream control/status, the CORB/RIRB control/status/size bytes), which is
//! why the backing store is one 32-bit cell per aligned dword with byte-lane
//! merge on partial writes.

// Global registers (byte offsets into the window).
pub const GCAP: u64 = 0x00;
pub const VMIN: u64 = 0x02;
pub const VMAJ: u64 = 0x03;
pub const OUTPAY: u64 = 0x04;
pub const INPAY: u64 = 0x06;
pub const GCTL: u64 = 0x08;
pub const WAKEEN: u64 = 0x0C;
pub const STATESTS: u64 = 0x0E;
pub const GSTS: u64 = 0x10;
pub const INTCTL: u64 = 0x20;
pub const INTSTS: u64 = 0x24;
pub const WALCLK: u64 = 0x30;
pub const SSYNC: u64 = 0x38;

// Command output ring.
pub const CORBLBASE: u64 = 0x40;
pub const CORBUBASE: u64 = 0x44;
pub const CORBWP: u64 = 0x48;
pub const CORBRP: u64 = 0x4A;
pub const CORBCTL: u64 = 0x4C;
pub const CORBSTS: u64 = 0x4D;
pub const CORBSIZE: u64 = 0x4E;

// Response input ring.
pub const RIRBLBASE: u64 = 0x50;
pub const RIRBUBASE: u64 = 0x54;
pub const RIRBWP: u64 = 0x58;
pub const RINTCNT: u64 = 0x5A;
pub const RIRBCTL: u64 = 0x5C;
pub const RIRBSTS: u64 = 0x5D;
pub const RIRBSIZE: u64 = 0x5E;

// DMA position buffer.
pub const DPLBASE: u64 = 0x70;
pub const DPUBASE: u64 = 0x74;

// Stream descriptors: eight blocks of 0x20 bytes starting at 0x80.
// The SD* constants below are offsets relative to a block.
pub const SD_BASE: u64 = 0x80;
pub const SD_SPAN: u64 = 0x20;
pub const SDCTL: u64 = 0x00;
pub const SDSTS: u64 = 0x03;
pub const SDLPIB: u64 = 0x04;
pub const SDCBL: u64 = 0x08;
pub const SDLVI: u64 = 0x0C;
pub const SDFIFOS: u64 = 0x10;
pub const SDFMT: u64 = 0x12;
pub const SDBDPL: u64 = 0x18;
pub const SDBDPU: u64 = 0x1C;

// Read-only alias page: the wall clock and each stream's position counter
// reappear at 0x2030 / 0x2084 + n*0x20.
pub const WALCLKA: u64 = 0x2030;
pub const SD_LPIBA_BASE: u64 = 0x2084;

pub fn sd_reg(stream: usize, reg: u64) -> u64 {
    SD_BASE + stream as u64 * SD_SPAN + reg
}

pub fn sd_lpib_alias(stream: usize) -> u64 {
    SD_LPIBA_BASE + stream as u64 * SD_SPAN
}

// Bit positions, relative to the named register (not its containing dword).
pub const GCTL_CRST: u32 = 1 << 0;
pub const INTCTL_GIE: u32 = 1 << 31;
pub const INTCTL_CIE: u32 = 1 << 30;
pub const INTSTS_GIS: u32 = 1 << 31;
pub const INTSTS_CIS: u32 = 1 << 30;
pub const CORBRP_RST: u32 = 1 << 15;
pub const CORBCTL_RUN: u32 = 1 << 1;
pub const RIRBWP_RST: u32 = 1 << 15;
pub const RIRBCTL_RUN: u32 = 1 << 1;
pub const RIRBSTS_RINTFL: u32 = 1 << 0;
pub const RIRBSTS_OIS: u32 = 1 << 2;
pub const RING_SIZE_MASK: u32 = 0x3;
pub const RING_SIZE_CAP: u32 = 0x70;
pub const DPLBASE_ENABLE: u32 = 1 << 0;
pub const SDCTL_SRST: u32 = 1 << 0;
pub const SDCTL_RUN: u32 = 1 << 1;
pub const SDCTL_TAG_SHIFT: u32 = 20;
pub const SDCTL_TAG_MASK: u32 = 0xF << SDCTL_TAG_SHIFT;
pub const SDSTS_BCIS: u32 = 1 << 2;
pub const SDSTS_FIFORDY: u32 = 1 << 5;
/// BCIS, FIFOE and DESE: sticky until the guest writes 1 to them.
pub const SDSTS_STICKY: u32 = 0x1C;

/// One partial-width register write, merged into its containing dword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    /// Byte offset of the containing dword.
    pub word: u64,
    pub old: u32,
    pub new: u32,
    /// Bits of the dword covered by the guest access.
    pub mask: u32,
}

/// Backing store for the register window.
///
/// `write` stores the merged value immediately; the caller then applies
/// register policy (write-1-to-clear lanes, read-only lanes, side effects)
/// using the reported old/new/mask and `set_word` to fix the cell up.
pub struct RegisterFile {
    cells: Vec<u32>,
}

impl RegisterFile {
    pub fn new(window: u64) -> Self {
        Self {
            cells: vec![0; (window / 4) as usize],
        }
    }

    pub fn zero(&mut self) {
        self.cells.fill(0);
    }

    /// Full dword containing `offset`.
    pub fn word(&self, offset: u64) -> u32 {
        self.cells
            .get((offset / 4) as usize)
            .copied()
            .unwrap_or(0)
    }

    pub fn set_word(&mut self, offset: u64, value: u32) {
        if let Some(cell) = self.cells.get_mut((offset / 4) as usize) {
            *cell = value;
        }
    }

    /// Reads `size` bytes at `offset`, shifted down to bit 0.
    ///
    /// The embedding framework validates offset and width; an access that
    /// would cross its dword boundary is a model bug and is clipped.
    pub fn read(&self, offset: u64, size: usize) -> u64 {
        lane_extract(self.word(offset), offset, size)
    }

    /// Merges `size` bytes of `value` into the dword containing `offset` and
    /// returns the old/new full-word values for side-effect dispatch.
    ///
    /// Returns `None` (and stores nothing) if `offset` is outside the window.
    pub fn write(&mut self, offset: u64, size: usize, value: u64) -> Option<RegWrite> {
        let lane = (offset & 3) as usize;
        debug_assert!(size >= 1 && lane + size <= 4, "register access crosses dword");
        let width = size.clamp(1, 4 - lane);
        let cell = self.cells.get_mut((offset / 4) as usize)?;

        let mask = width_mask(width) << (lane * 8);
        let old = *cell;
        let new = (old & !mask) | ((value as u32) << (lane * 8)) & mask;
        *cell = new;
        Some(RegWrite {
            word: offset & !3,
            old,
            new,
            mask,
        })
    }
}

/// Extracts the lane of `value` addressed by `offset`/`size`, clipped the
/// same way [`RegisterFile::read`] clips. Used for cells whose read value is
/// synthesized instead of stored (wall clock, position aliases).
pub(crate) fn lane_extract(value: u32, offset: u64, size: usize) -> u64 {
    let lane = (offset & 3) as usize;
    debug_assert!(size >= 1 && lane + size <= 4, "register access crosses dword");
    let width = size.clamp(1, 4 - lane);
    u64::from((value >> (lane * 8)) & width_mask(width))
}

fn width_mask(width: usize) -> u32 {
    if width >= 4 {
        u32::MAX
    } else {
        (1u32 << (width * 8)) - 1
    }
}

/// Write-1-to-clear merge for one dword: within `w1c`, bits written as 1 are
/// cleared and unwritten bits keep their old value; bits outside `w1c` take
/// the merged value unchanged.
pub fn apply_w1c(old: u32, new: u32, mask: u32, w1c: u32) -> u32 {
    (new & !w1c) | (old & w1c & !(new & mask))
}

/// Keeps `ro` bits at their old value regardless of what was written.
pub fn apply_ro(old: u32, new: u32, ro: u32) -> u32 {
    (new & !ro) | (old & ro)
}
