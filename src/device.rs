//! Controller model: register window dispatch, CORB/RIRB engines, stream
//! start/stop, interrupt aggregation and the thread-safe device wrapper.
//!
//! [`HdaCore`] owns everything the codecs call back into (registers, rings,
//! stream engine) and is split from [`HdaController`] so a verb can borrow
//! one codec mutably while the core handles its response. [`HdaDevice`] is
//! the embedder-facing wrapper: a locked controller plus one audio worker
//! thread per direction.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use tracing::{debug, warn};

use crate::codec::{CodecCmd, HdaCodec, HdaOps};
use crate::corb_rirb::{ring_entries, Ring, RirbEntry};
use crate::mem::MemoryBus;
use crate::regs::{self, apply_ro, apply_w1c, RegWrite, RegisterFile};
use crate::stream::{
    load_bdl, run_transfer, StreamDir, StreamError, StreamState, STREAM_COUNT,
};
use crate::worker::{lock, AudioBackend, NullBackend, WorkerHandle};

/// Size of the MMIO register window (one 16 KiB BAR).
pub const HDA_MMIO_SIZE: u64 = 0x4000;

/// Wall clock rate: the link runs at 24.000 MHz.
const WALCLK_TICKS_PER_US: u64 = 24;

/// Level-triggered interrupt sink the embedder hangs the device on.
pub trait IrqLine: Send {
    fn set_level(&mut self, level: bool);
}

/// Register state and DMA engines, shared between MMIO dispatch and the
/// codecs' [`HdaOps`] callbacks.
struct HdaCore {
    mem: Arc<dyn MemoryBus>,
    regs: RegisterFile,
    corb: Option<Ring>,
    rirb: Option<Ring>,
    /// Responses queued since the last response interrupt.
    rirb_pending: u32,
    streams: [StreamState; STREAM_COUNT],
    /// Stream tag to hardware stream index, per direction. Latched at
    /// stream start and only overwritten by a later start.
    tag_map: [[Option<u8>; 16]; 2],
    /// DMA position buffer base, present while the guest has it enabled.
    posbuf: Option<u64>,
    walclk_epoch: Instant,
    intx: bool,
    irq_line: Option<Box<dyn IrqLine>>,
}

impl HdaCore {
    /// Puts every register and engine back to its hardware default.
    fn power_on(&mut self) {
        self.regs.zero();
        // 4 input and 4 output streams, 64-bit capable, version 1.0.
        self.regs.set_word(regs::GCAP, 0x0100_4401);
        // 60-word output payload, 29-word input payload.
        self.regs.set_word(regs::OUTPAY, 0x001D_003C);
        // Ring size capability 2/16/256 entries, 256 selected.
        self.regs.set_word(regs::CORBCTL, 0x0072_0000);
        self.regs.set_word(regs::RIRBCTL, 0x0072_0000);
        for idx in 0..STREAM_COUNT {
            self.stream_regs_reset(idx);
        }
        self.corb = None;
        self.rirb = None;
        self.rirb_pending = 0;
        for st in &mut self.streams {
            st.reset();
        }
        self.tag_map = [[None; 16]; 2];
        self.posbuf = None;
        self.walclk_epoch = Instant::now();
    }

    /// Returns one stream's descriptor registers to their defaults. The
    /// engine state is not touched here.
    fn stream_regs_reset(&mut self, idx: usize) {
        for reg in (0..regs::SD_SPAN).step_by(4) {
            self.regs.set_word(regs::sd_reg(idx, reg), 0);
        }
        self.regs
            .set_word(regs::sd_reg(idx, regs::SDCTL), regs::SDSTS_FIFORDY << 24);
        self.regs.set_word(regs::sd_reg(idx, regs::SDFIFOS), 0x100);
    }

    fn wall_clock(&self) -> u32 {
        let micros = self.walclk_epoch.elapsed().as_micros() as u64;
        micros.wrapping_mul(WALCLK_TICKS_PER_US) as u32
    }

    fn ring_base(&self, lbase: u64, ubase: u64) -> u64 {
        let lo = self.regs.word(lbase) & 0xFFFF_FF80;
        u64::from(self.regs.word(ubase)) << 32 | u64::from(lo)
    }

    /// Latches CORB geometry from the base/size registers. Refuses to start
    /// on a reserved size selector or an unreachable ring.
    fn start_corb(&mut self, ctl_word: u32) -> bool {
        let selector = (ctl_word >> 16) & regs::RING_SIZE_MASK;
        let Some(entries) = ring_entries(selector) else {
            warn!(selector, "command ring size selector is reserved");
            return false;
        };
        let ring = Ring::corb(self.ring_base(regs::CORBLBASE, regs::CORBUBASE), entries);
        if let Err(err) = self.mem.check_range(ring.base, ring.byte_len()) {
            warn!(%err, "command ring is not addressable");
            return false;
        }
        self.corb = Some(ring);
        true
    }

    fn start_rirb(&mut self, ctl_word: u32) -> bool {
        let selector = (ctl_word >> 16) & regs::RING_SIZE_MASK;
        let Some(entries) = ring_entries(selector) else {
            warn!(selector, "response ring size selector is reserved");
            return false;
        };
        let ring = Ring::rirb(self.ring_base(regs::RIRBLBASE, regs::RIRBUBASE), entries);
        if let Err(err) = self.mem.check_range(ring.base, ring.byte_len()) {
            warn!(%err, "response ring is not addressable");
            return false;
        }
        self.rirb_pending = 0;
        self.rirb = Some(ring);
        true
    }

    /// Loads the buffer descriptor list and moves the stream to running.
    /// Every descriptor is probed before the engine sees it, so transfer-time
    /// address math cannot leave guest memory.
    fn latch_stream(&mut self, idx: usize, ctl: u32) -> Result<u8, StreamError> {
        let lo = self.regs.word(regs::sd_reg(idx, regs::SDBDPL)) & 0xFFFF_FF80;
        let hi = self.regs.word(regs::sd_reg(idx, regs::SDBDPU));
        let base = u64::from(hi) << 32 | u64::from(lo);
        let lvi = self.regs.word(regs::sd_reg(idx, regs::SDLVI)) & 0xFFFF;
        let bdl = load_bdl(self.mem.as_ref(), base, lvi)?;
        let tag = ((ctl & regs::SDCTL_TAG_MASK) >> regs::SDCTL_TAG_SHIFT) as u8;
        let st = &mut self.streams[idx];
        st.running = true;
        st.tag = tag;
        st.bdl = bdl;
        st.entry = 0;
        st.entry_off = 0;
        st.pib = 0;
        let dir = StreamDir::of_index(idx);
        self.tag_map[dir.index()][usize::from(tag)] = Some(idx as u8);
        self.regs.set_word(regs::sd_reg(idx, regs::SDLPIB), 0);
        Ok(tag)
    }

    /// Moves one buffer through the stream for `tag`, then publishes the new
    /// position (LPIB, position buffer) and any buffer-completion interrupt.
    fn stream_transfer(
        &mut self,
        tag: u8,
        dir: StreamDir,
        buf: &mut [u8],
    ) -> Result<(), StreamError> {
        if tag == 0 {
            return Err(StreamError::UnmappedTag { tag });
        }
        let idx = self.tag_map[dir.index()][usize::from(tag & 0xF)]
            .ok_or(StreamError::UnmappedTag { tag })? as usize;
        let irq = run_transfer(&mut self.streams[idx], self.mem.as_ref(), dir, buf)?;
        let pib = self.streams[idx].pib;
        self.regs.set_word(regs::sd_reg(idx, regs::SDLPIB), pib);
        if let Some(base) = self.posbuf {
            if let Err(err) = self.mem.write_u32(base + idx as u64 * 8, pib) {
                warn!(stream = idx, %err, "position buffer write failed");
            }
        }
        if irq {
            let ctl = regs::sd_reg(idx, regs::SDCTL);
            let word = self.regs.word(ctl);
            self.regs.set_word(ctl, word | (regs::SDSTS_BCIS << 24));
            self.update_intr();
        }
        Ok(())
    }

    /// Rederives INTSTS from the per-source status registers and drives the
    /// interrupt line on level changes.
    fn update_intr(&mut self) {
        let mut intsts = 0u32;
        for idx in 0..STREAM_COUNT {
            let sts = self.regs.word(regs::sd_reg(idx, regs::SDCTL)) >> 24;
            if sts & regs::SDSTS_BCIS != 0 {
                intsts |= 1 << idx;
            }
        }
        let rirbsts = (self.regs.word(regs::RIRBCTL) >> 8) & 0xFF;
        let wake = self.regs.word(regs::WAKEEN);
        let controller_cause = rirbsts & (regs::RIRBSTS_RINTFL | regs::RIRBSTS_OIS) != 0
            || (wake >> 16) & wake & 0xFFFF != 0;
        if controller_cause {
            intsts |= regs::INTSTS_CIS;
        }
        if intsts != 0 {
            intsts |= regs::INTSTS_GIS;
        }
        self.regs.set_word(regs::INTSTS, intsts);

        let intctl = self.regs.word(regs::INTCTL);
        let level =
            intctl & regs::INTCTL_GIE != 0 && (intsts & !regs::INTSTS_GIS) & intctl != 0;
        if level != self.intx {
            self.intx = level;
            if let Some(line) = &mut self.irq_line {
                line.set_level(level);
            }
        }
    }
}

impl HdaOps for HdaCore {
    fn signal(&mut self, cad: u8) {
        let word = self.regs.word(regs::WAKEEN);
        let presence = 1u32 << (16 + u32::from(cad & 0xF));
        self.regs.set_word(regs::WAKEEN, word | presence);
        self.update_intr();
    }

    fn respond(&mut self, cad: u8, response: u32, unsolicited: bool) {
        let Some(rirb) = self.rirb else {
            debug!(cad, "response dropped, response ring is stopped");
            return;
        };
        let word = self.regs.word(regs::RIRBWP);
        let wp = rirb.next(word & 0xFF);
        let entry = RirbEntry::new(cad, response, unsolicited);
        if let Err(err) = self.mem.write_physical(rirb.slot(wp), &entry.to_bytes()) {
            // The response is lost: report it as a ring overrun.
            warn!(%err, "response slot write failed");
            let ctl = self.regs.word(regs::RIRBCTL);
            self.regs
                .set_word(regs::RIRBCTL, ctl | (regs::RIRBSTS_OIS << 8));
            self.update_intr();
            return;
        }
        self.regs.set_word(regs::RIRBWP, (word & 0xFFFF_0000) | wp);
        self.rirb_pending += 1;
        let threshold = (word >> 16) & 0xFF;
        if threshold == 0 || self.rirb_pending >= threshold {
            self.rirb_pending = 0;
            let ctl = self.regs.word(regs::RIRBCTL);
            self.regs
                .set_word(regs::RIRBCTL, ctl | (regs::RIRBSTS_RINTFL << 8));
            self.update_intr();
        }
    }

    fn transfer(&mut self, tag: u8, dir: StreamDir, buf: &mut [u8]) -> Result<(), StreamError> {
        self.stream_transfer(tag, dir, buf)
    }
}

/// Single-threaded controller: the core plus its codecs.
pub struct HdaController {
    core: HdaCore,
    codecs: Vec<HdaCodec>,
}

impl HdaController {
    /// Controller with one codec at address 0, freshly reset.
    pub fn new(mem: Arc<dyn MemoryBus>) -> Self {
        let mut controller = Self {
            core: HdaCore {
                mem,
                regs: RegisterFile::new(HDA_MMIO_SIZE),
                corb: None,
                rirb: None,
                rirb_pending: 0,
                streams: std::array::from_fn(|_| StreamState::default()),
                tag_map: [[None; 16]; 2],
                posbuf: None,
                walclk_epoch: Instant::now(),
                intx: false,
                irq_line: None,
            },
            codecs: vec![HdaCodec::new(0)],
        };
        controller.reset();
        controller
    }

    pub fn mmio_len(&self) -> u64 {
        HDA_MMIO_SIZE
    }

    /// Current level of the aggregated interrupt output.
    pub fn intx_level(&self) -> bool {
        self.core.intx
    }

    /// Connects the interrupt line and drives it to the current level.
    pub fn set_irq_line(&mut self, mut line: Box<dyn IrqLine>) {
        line.set_level(self.core.intx);
        self.core.irq_line = Some(line);
    }

    pub fn codec_mut(&mut self, cad: u8) -> Option<&mut HdaCodec> {
        self.codecs.iter_mut().find(|codec| codec.cad() == cad)
    }

    pub fn mmio_read(&self, offset: u64, size: usize) -> u64 {
        let word = offset & !3;
        if word == regs::WALCLK || word == regs::WALCLKA {
            return regs::lane_extract(self.core.wall_clock(), offset, size);
        }
        if let Some(idx) = lpib_alias_stream(word) {
            let pib = self.core.regs.word(regs::sd_reg(idx, regs::SDLPIB));
            return regs::lane_extract(pib, offset, size);
        }
        self.core.regs.read(offset, size)
    }

    pub fn mmio_write(&mut self, offset: u64, size: usize, value: u64) {
        let Some(w) = self.core.regs.write(offset, size, value) else {
            return;
        };
        self.dispatch(w);
    }

    /// Full controller reset: registers, rings, streams, codecs. The wall
    /// clock restarts and every worker parks.
    fn reset(&mut self) {
        self.core.power_on();
        for codec in &mut self.codecs {
            codec.reset(&mut self.core);
        }
        self.core.update_intr();
    }

    /// Side effects of one merged register write. The candidate value is
    /// already stored; handlers overwrite the cell where lanes are read-only
    /// or write-1-to-clear.
    fn dispatch(&mut self, w: RegWrite) {
        match w.word {
            // Capability, derived-status and alias cells ignore writes.
            regs::GCAP | regs::OUTPAY | regs::INTSTS | regs::WALCLK | regs::WALCLKA => {
                self.core.regs.set_word(w.word, w.old);
            }
            regs::GCTL => {
                if w.mask & regs::GCTL_CRST != 0 && w.new & regs::GCTL_CRST == 0 {
                    self.reset();
                }
            }
            regs::WAKEEN => {
                // STATESTS in the high lanes is write-1-to-clear.
                let fixed = apply_w1c(w.old, w.new, w.mask, 0xFFFF_0000);
                self.core.regs.set_word(w.word, fixed);
                self.core.update_intr();
            }
            regs::INTCTL => self.core.update_intr(),
            regs::CORBWP => {
                // Read pointer in the high lanes moves only via its reset
                // bit, which latches until written back to zero.
                let mut fixed = apply_ro(w.old, w.new, 0xFFFF_0000);
                if w.mask & (regs::CORBRP_RST << 16) != 0 {
                    if w.new & (regs::CORBRP_RST << 16) != 0 {
                        fixed = (fixed & 0x0000_FFFF) | (regs::CORBRP_RST << 16);
                    } else {
                        fixed &= !(regs::CORBRP_RST << 16);
                    }
                }
                self.core.regs.set_word(w.word, fixed);
                if w.mask & 0xFFFF != 0 {
                    self.drain_corb();
                }
            }
            regs::CORBCTL => {
                let mut fixed = apply_w1c(w.old, w.new, w.mask, 0xFF00);
                fixed = apply_ro(w.old, fixed, regs::RING_SIZE_CAP << 16);
                let was = w.old & regs::CORBCTL_RUN != 0;
                let run = fixed & regs::CORBCTL_RUN != 0;
                let mut drain = false;
                if !was && run {
                    if self.core.start_corb(fixed) {
                        drain = true;
                    } else {
                        fixed &= !regs::CORBCTL_RUN;
                    }
                } else if was && !run {
                    self.core.corb = None;
                }
                self.core.regs.set_word(w.word, fixed);
                if drain {
                    self.drain_corb();
                }
            }
            regs::RIRBWP => {
                // Write pointer is hardware-owned; its reset bit reads zero.
                let mut fixed = apply_ro(w.old, w.new, 0x0000_FFFF);
                if w.mask & regs::RIRBWP_RST != 0 && w.new & regs::RIRBWP_RST != 0 {
                    fixed &= 0xFFFF_0000;
                    self.core.rirb_pending = 0;
                }
                self.core.regs.set_word(w.word, fixed);
            }
            regs::RIRBCTL => {
                let mut fixed = apply_w1c(w.old, w.new, w.mask, 0xFF00);
                fixed = apply_ro(w.old, fixed, regs::RING_SIZE_CAP << 16);
                let was = w.old & regs::RIRBCTL_RUN != 0;
                let run = fixed & regs::RIRBCTL_RUN != 0;
                if !was && run {
                    if !self.core.start_rirb(fixed) {
                        fixed &= !regs::RIRBCTL_RUN;
                    }
                } else if was && !run {
                    self.core.rirb = None;
                }
                self.core.regs.set_word(w.word, fixed);
                self.core.update_intr();
            }
            regs::DPLBASE => {
                if w.new & regs::DPLBASE_ENABLE != 0 {
                    let hi = self.core.regs.word(regs::DPUBASE);
                    let base = u64::from(hi) << 32 | u64::from(w.new & 0xFFFF_FF80);
                    match self.core.mem.check_range(base, STREAM_COUNT as u64 * 8) {
                        Ok(()) => self.core.posbuf = Some(base),
                        Err(err) => {
                            warn!(%err, "position buffer is not addressable");
                            self.core.posbuf = None;
                            self.core
                                .regs
                                .set_word(w.word, w.new & !regs::DPLBASE_ENABLE);
                        }
                    }
                } else {
                    self.core.posbuf = None;
                }
            }
            word if (regs::SD_BASE..regs::SD_BASE + STREAM_COUNT as u64 * regs::SD_SPAN)
                .contains(&word) =>
            {
                let idx = ((word - regs::SD_BASE) / regs::SD_SPAN) as usize;
                let reg = (word - regs::SD_BASE) % regs::SD_SPAN;
                self.stream_reg_write(idx, reg, w);
            }
            word if lpib_alias_stream(word).is_some() => {
                self.core.regs.set_word(w.word, w.old);
            }
            // Everything else (SSYNC, GSTS, ring bases, unimplemented
            // offsets) is plain storage.
            _ => {}
        }
    }

    fn stream_reg_write(&mut self, idx: usize, reg: u64, w: RegWrite) {
        match reg {
            regs::SDCTL => {
                let mut fixed = apply_w1c(w.old, w.new, w.mask, regs::SDSTS_STICKY << 24);
                fixed = apply_ro(w.old, fixed, regs::SDSTS_FIFORDY << 24);
                if w.mask & regs::SDCTL_SRST != 0
                    && fixed & regs::SDCTL_SRST != 0
                    && w.old & regs::SDCTL_SRST == 0
                {
                    self.stream_reset(idx);
                    return;
                }
                let was = w.old & regs::SDCTL_RUN != 0;
                let run = fixed & regs::SDCTL_RUN != 0;
                let mut started = None;
                if !was && run {
                    match self.core.latch_stream(idx, fixed) {
                        Ok(tag) => started = Some(tag),
                        Err(err) => {
                            warn!(stream = idx, %err, "stream start refused");
                            fixed &= !regs::SDCTL_RUN;
                        }
                    }
                }
                self.core.regs.set_word(w.word, fixed);
                if let Some(tag) = started {
                    let dir = StreamDir::of_index(idx);
                    for codec in &mut self.codecs {
                        codec.notify_stream(tag, dir, true);
                    }
                } else if was && !run {
                    self.stream_stop(idx);
                }
                self.core.update_intr();
            }
            regs::SDLPIB => self.core.regs.set_word(w.word, w.old),
            regs::SDFIFOS => {
                // FIFO size in the low lanes is read-only, FMT is storage.
                let fixed = apply_ro(w.old, w.new, 0x0000_FFFF);
                self.core.regs.set_word(w.word, fixed);
            }
            // CBL, LVI and the descriptor list base are storage, latched at
            // stream start.
            _ => {}
        }
    }

    /// Stream reset: engine state and descriptor registers return to their
    /// defaults with the reset bit left readable as 1.
    fn stream_reset(&mut self, idx: usize) {
        self.stream_stop(idx);
        self.core.streams[idx].reset();
        self.core.stream_regs_reset(idx);
        let ctl = regs::sd_reg(idx, regs::SDCTL);
        let word = self.core.regs.word(ctl);
        self.core.regs.set_word(ctl, word | regs::SDCTL_SRST);
        self.core.update_intr();
    }

    fn stream_stop(&mut self, idx: usize) {
        if !self.core.streams[idx].running {
            return;
        }
        self.core.streams[idx].running = false;
        let tag = self.core.streams[idx].tag;
        let dir = StreamDir::of_index(idx);
        for codec in &mut self.codecs {
            codec.notify_stream(tag, dir, false);
        }
    }

    /// Fetches and dispatches queued verbs until the read pointer catches
    /// the write pointer, then stores the final read pointer once.
    ///
    /// Both pointers are masked to the live ring before the walk: the guest
    /// can leave a stale out-of-range write pointer behind by shrinking the
    /// ring size between runs, and an unmasked compare would never terminate.
    fn drain_corb(&mut self) {
        let Some(ring) = self.core.corb else {
            return;
        };
        let wrap = ring.entries - 1;
        let word = self.core.regs.word(regs::CORBWP);
        let wp = word & wrap;
        let mut rp = (word >> 16) & wrap;
        while rp != wp {
            rp = ring.next(rp);
            match self.core.mem.read_u32(ring.slot(rp)) {
                Ok(verb) => self.dispatch_verb(CodecCmd::decode(verb)),
                Err(err) => {
                    warn!(%err, "command fetch failed");
                    break;
                }
            }
        }
        let word = self.core.regs.word(regs::CORBWP);
        self.core
            .regs
            .set_word(regs::CORBWP, (word & 0x8000_FFFF) | (rp << 16));
    }

    fn dispatch_verb(&mut self, cmd: CodecCmd) {
        let Some(codec) = self.codecs.iter_mut().find(|codec| codec.cad() == cmd.cad) else {
            debug!(cad = cmd.cad, "verb to absent codec dropped");
            return;
        };
        codec.command(cmd, &mut self.core);
    }

    /// Moves bytes through the stream registered for `tag` in `dir`.
    pub fn transfer(&mut self, tag: u8, dir: StreamDir, buf: &mut [u8]) -> Result<(), StreamError> {
        self.core.stream_transfer(tag, dir, buf)
    }

    /// Transfer keyed by codec address: the codec's converter for `dir`
    /// names the tag. Workers call this, so an unmapped or parked converter
    /// is an error rather than a silent no-op.
    pub(crate) fn worker_transfer(
        &mut self,
        cad: u8,
        dir: StreamDir,
        buf: &mut [u8],
    ) -> Result<(), StreamError> {
        let tag = self
            .codecs
            .iter()
            .find(|codec| codec.cad() == cad)
            .map_or(0, |codec| codec.converter_tag(dir));
        self.core.stream_transfer(tag, dir, buf)
    }
}

/// Stream index for a dword offset inside the read-only position alias page.
fn lpib_alias_stream(offset: u64) -> Option<usize> {
    let rel = offset.checked_sub(regs::SD_LPIBA_BASE)?;
    let idx = (rel / regs::SD_SPAN) as usize;
    (rel % regs::SD_SPAN == 0 && idx < STREAM_COUNT).then_some(idx)
}

/// The full device: a locked controller plus one worker thread per
/// direction, wired to the codec at address 0.
pub struct HdaDevice {
    controller: Arc<Mutex<HdaController>>,
    workers: Vec<(WorkerHandle, JoinHandle<()>)>,
}

impl HdaDevice {
    /// Device without host audio: streams run and data goes nowhere.
    pub fn new(mem: Arc<dyn MemoryBus>) -> Self {
        Self::with_audio(mem, Box::new(NullBackend), Box::new(NullBackend))
    }

    pub fn with_audio(
        mem: Arc<dyn MemoryBus>,
        playback: Box<dyn AudioBackend>,
        capture: Box<dyn AudioBackend>,
    ) -> Self {
        let controller = Arc::new(Mutex::new(HdaController::new(mem)));
        let mut workers = Vec::new();
        for (dir, backend) in [(StreamDir::Output, playback), (StreamDir::Input, capture)] {
            let handle = WorkerHandle::new(backend);
            let thread = handle.spawn(Arc::downgrade(&controller), 0, dir);
            if let Some(codec) = lock(&controller).codec_mut(0) {
                codec.attach_worker(dir, handle.clone());
            }
            workers.push((handle, thread));
        }
        Self { controller, workers }
    }

    /// Direct access for embeddings that route MMIO themselves.
    pub fn controller(&self) -> &Arc<Mutex<HdaController>> {
        &self.controller
    }

    pub fn mmio_len(&self) -> u64 {
        HDA_MMIO_SIZE
    }

    pub fn mmio_read(&self, offset: u64, size: usize) -> u64 {
        lock(&self.controller).mmio_read(offset, size)
    }

    pub fn mmio_write(&self, offset: u64, size: usize, value: u64) {
        lock(&self.controller).mmio_write(offset, size, value)
    }

    pub fn intx_level(&self) -> bool {
        lock(&self.controller).intx_level()
    }

    pub fn set_irq_line(&self, line: Box<dyn IrqLine>) {
        lock(&self.controller).set_irq_line(line);
    }
}

impl Drop for HdaDevice {
    fn drop(&mut self) {
        for (handle, _) in &self.workers {
            handle.shutdown();
        }
        for (_, thread) in self.workers.drain(..) {
            if thread.join().is_err() {
                warn!("audio worker exited by panic");
            }
        }
    }
}
