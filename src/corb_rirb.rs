//! CORB/RIRB ring descriptors.
//!
//! The rings themselves live in guest memory; this module only holds the
//! geometry cached at run-enable time (base address, entry count) and the
//! response-entry wire layout. Draining and response production are driven by
//! the controller's register dispatch.

/// Bytes per CORB slot (one 32-bit verb).
pub const CORB_ENTRY_BYTES: u64 = 4;
/// Bytes per RIRB slot (response dword + extended-response dword).
pub const RIRB_ENTRY_BYTES: u64 = 8;

const RESP_EX_UNSOL: u32 = 1 << 4;

/// Maps a CORBSIZE/RIRBSIZE selector (bits 1:0) to an entry count.
///
/// Selector 3 is reserved; real controllers only advertise the three sizes
/// below, so a guest writing it gets the configuration refused.
pub fn ring_entries(selector: u32) -> Option<u32> {
    match selector & 0x3 {
        0 => Some(2),
        1 => Some(16),
        2 => Some(256),
        _ => None,
    }
}

/// Ring geometry, latched when the guest sets the run-enable bit.
///
/// Base and size registers are deliberately not re-read per verb: the guest
/// may scribble on them while the ring runs without effect, exactly like
/// hardware that latched them at start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ring {
    pub base: u64,
    pub entries: u32,
    entry_bytes: u64,
}

impl Ring {
    pub fn corb(base: u64, entries: u32) -> Self {
        Self {
            base,
            entries,
            entry_bytes: CORB_ENTRY_BYTES,
        }
    }

    pub fn rirb(base: u64, entries: u32) -> Self {
        Self {
            base,
            entries,
            entry_bytes: RIRB_ENTRY_BYTES,
        }
    }

    pub fn byte_len(&self) -> u64 {
        u64::from(self.entries) * self.entry_bytes
    }

    /// Guest physical address of slot `ptr`.
    pub fn slot(&self, ptr: u32) -> u64 {
        self.base + u64::from(ptr % self.entries) * self.entry_bytes
    }

    /// Pointer advance with wrap.
    pub fn next(&self, ptr: u32) -> u32 {
        (ptr + 1) % self.entries
    }
}

/// One response slot: the payload dword plus the extended-response dword
/// carrying the codec address and the unsolicited flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RirbEntry {
    pub response: u32,
    pub resp_ex: u32,
}

impl RirbEntry {
    pub fn new(cad: u8, response: u32, unsolicited: bool) -> Self {
        let mut resp_ex = u32::from(cad & 0xF);
        if unsolicited {
            resp_ex |= RESP_EX_UNSOL;
        }
        Self { response, resp_ex }
    }

    pub fn to_bytes(self) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[..4].copy_from_slice(&self.response.to_le_bytes());
        bytes[4..].copy_from_slice(&self.resp_ex.to_le_bytes());
        bytes
    }
}
