//! CORB/RIRB behavior as a guest driver sees it: everything goes through
//! MMIO and guest memory.

use std::sync::Arc;

use aero_devices_hda::mem::{MemoryBus, SharedRam};
use aero_devices_hda::regs;
use aero_devices_hda::HdaController;

const CORB_BASE: u64 = 0x1000;
const RIRB_BASE: u64 = 0x2000;

// Verb ids as a driver would encode them.
const GET_PARAMETER: u32 = 0xF00;
const PARAM_VENDOR_ID: u8 = 0x00;

fn new_hda() -> (HdaController, Arc<SharedRam>) {
    let ram = Arc::new(SharedRam::new(0x1_0000));
    (HdaController::new(ram.clone()), ram)
}

fn start_rings(hda: &mut HdaController) {
    hda.mmio_write(regs::CORBLBASE, 4, CORB_BASE);
    hda.mmio_write(regs::RIRBLBASE, 4, RIRB_BASE);
    // Both rings at the default 256 entries.
    hda.mmio_write(regs::CORBCTL, 1, u64::from(regs::CORBCTL_RUN));
    hda.mmio_write(regs::RIRBCTL, 1, u64::from(regs::RIRBCTL_RUN));
}

fn verb_long(cad: u8, nid: u8, verb: u32, payload: u8) -> u32 {
    u32::from(cad) << 28 | u32::from(nid) << 20 | verb << 8 | u32::from(payload)
}

/// Queues one command the way a driver does: write the next CORB slot, then
/// advance the write pointer.
fn push_verb(hda: &mut HdaController, ram: &SharedRam, word: u32) {
    let wp = (hda.mmio_read(regs::CORBWP, 2) as u32 + 1) % 256;
    ram.write_u32(CORB_BASE + u64::from(wp) * 4, word).unwrap();
    hda.mmio_write(regs::CORBWP, 2, u64::from(wp));
}

fn rirb_slot(ram: &SharedRam, idx: u32) -> (u32, u32) {
    let off = RIRB_BASE + u64::from(idx) * 8;
    (ram.read_u32(off).unwrap(), ram.read_u32(off + 4).unwrap())
}

#[test]
fn corb_command_produces_rirb_response_and_interrupt() {
    let (mut hda, ram) = new_hda();
    start_rings(&mut hda);
    hda.mmio_write(regs::INTCTL, 4, 0xC000_0000);

    push_verb(&mut hda, &ram, verb_long(0, 0, GET_PARAMETER, PARAM_VENDOR_ID));

    assert_eq!(hda.mmio_read(regs::CORBRP, 2), 1);
    assert_eq!(hda.mmio_read(regs::RIRBWP, 2), 1);
    let (response, resp_ex) = rirb_slot(&ram, 1);
    assert_eq!(response, 0x10EC_0662);
    // Solicited, codec address 0.
    assert_eq!(resp_ex, 0);

    // RINTCNT 0 interrupts on every response.
    assert_eq!(hda.mmio_read(regs::RIRBSTS, 1), 1);
    assert_eq!(hda.mmio_read(regs::INTSTS, 4), 0xC000_0000);
    assert!(hda.intx_level());

    // Clearing the response flag drops the line.
    hda.mmio_write(regs::RIRBSTS, 1, 1);
    assert_eq!(hda.mmio_read(regs::INTSTS, 4), 0);
    assert!(!hda.intx_level());
}

#[test]
fn first_response_lands_after_the_reset_slot() {
    let (mut hda, ram) = new_hda();
    start_rings(&mut hda);
    ram.write_u32(RIRB_BASE, 0xDEAD_BEEF).unwrap();

    push_verb(&mut hda, &ram, verb_long(0, 0, GET_PARAMETER, PARAM_VENDOR_ID));

    // Slot 0 belongs to the pointer's reset position and is never written.
    assert_eq!(ram.read_u32(RIRB_BASE).unwrap(), 0xDEAD_BEEF);
    assert_eq!(rirb_slot(&ram, 1).0, 0x10EC_0662);
}

#[test]
fn corb_rirb_base_ignores_low_reserved_bits() {
    let (mut hda, ram) = new_hda();
    hda.mmio_write(regs::CORBLBASE, 4, CORB_BASE | 0x7F);
    hda.mmio_write(regs::RIRBLBASE, 4, RIRB_BASE | 0x55);
    hda.mmio_write(regs::CORBCTL, 1, u64::from(regs::CORBCTL_RUN));
    hda.mmio_write(regs::RIRBCTL, 1, u64::from(regs::RIRBCTL_RUN));

    push_verb(&mut hda, &ram, verb_long(0, 0, GET_PARAMETER, PARAM_VENDOR_ID));

    assert_eq!(rirb_slot(&ram, 1).0, 0x10EC_0662);
}

#[test]
fn two_entry_ring_wraps_its_pointers() {
    let (mut hda, ram) = new_hda();
    hda.mmio_write(regs::CORBSIZE, 1, 0);
    hda.mmio_write(regs::CORBLBASE, 4, CORB_BASE);
    hda.mmio_write(regs::RIRBLBASE, 4, RIRB_BASE);
    hda.mmio_write(regs::CORBCTL, 1, u64::from(regs::CORBCTL_RUN));
    hda.mmio_write(regs::RIRBCTL, 1, u64::from(regs::RIRBCTL_RUN));

    let verb = verb_long(0, 0, GET_PARAMETER, PARAM_VENDOR_ID);
    ram.write_u32(CORB_BASE + 4, verb).unwrap();
    hda.mmio_write(regs::CORBWP, 2, 1);
    // Second command wraps the read pointer back to slot 0.
    ram.write_u32(CORB_BASE, verb).unwrap();
    hda.mmio_write(regs::CORBWP, 2, 0);

    assert_eq!(hda.mmio_read(regs::CORBRP, 2), 0);
    assert_eq!(hda.mmio_read(regs::RIRBWP, 2), 2);
    assert_eq!(rirb_slot(&ram, 1).0, 0x10EC_0662);
    assert_eq!(rirb_slot(&ram, 2).0, 0x10EC_0662);
}

#[test]
fn sixteen_entry_ring_drains_every_queued_command() {
    let (mut hda, ram) = new_hda();
    hda.mmio_write(regs::CORBSIZE, 1, 1);
    hda.mmio_write(regs::RIRBSIZE, 1, 1);
    hda.mmio_write(regs::CORBLBASE, 4, CORB_BASE);
    hda.mmio_write(regs::RIRBLBASE, 4, RIRB_BASE);
    hda.mmio_write(regs::CORBCTL, 1, u64::from(regs::CORBCTL_RUN));
    hda.mmio_write(regs::RIRBCTL, 1, u64::from(regs::RIRBCTL_RUN));

    for _ in 0..5 {
        push_verb(&mut hda, &ram, verb_long(0, 0, GET_PARAMETER, PARAM_VENDOR_ID));
    }

    assert_eq!(hda.mmio_read(regs::CORBRP, 2), 5);
    assert_eq!(hda.mmio_read(regs::RIRBWP, 2), 5);
    for idx in 1..=5 {
        assert_eq!(rirb_slot(&ram, idx).0, 0x10EC_0662);
    }
}

#[test]
fn corb_size_shrink_with_stale_write_pointer_terminates() {
    let (mut hda, ram) = new_hda();
    start_rings(&mut hda);
    push_verb(&mut hda, &ram, verb_long(0, 0, GET_PARAMETER, PARAM_VENDOR_ID));
    assert_eq!(hda.mmio_read(regs::CORBRP, 2), 1);

    // Stop, shrink to 2 entries, leave a write pointer far outside the new
    // ring, then restart. The drain must still terminate.
    hda.mmio_write(regs::CORBCTL, 1, 0);
    hda.mmio_write(regs::CORBSIZE, 1, 0);
    hda.mmio_write(regs::CORBWP, 2, 200);
    hda.mmio_write(regs::CORBCTL, 1, u64::from(regs::CORBCTL_RUN));

    assert_eq!(hda.mmio_read(regs::CORBRP, 2), 0);
}

#[test]
fn reserved_ring_size_selector_refuses_to_start() {
    let (mut hda, _ram) = new_hda();
    hda.mmio_write(regs::CORBLBASE, 4, CORB_BASE);
    hda.mmio_write(regs::RIRBLBASE, 4, RIRB_BASE);
    hda.mmio_write(regs::CORBSIZE, 1, 3);
    hda.mmio_write(regs::RIRBSIZE, 1, 3);

    hda.mmio_write(regs::CORBCTL, 1, u64::from(regs::CORBCTL_RUN));
    hda.mmio_write(regs::RIRBCTL, 1, u64::from(regs::RIRBCTL_RUN));

    assert_eq!(hda.mmio_read(regs::CORBCTL, 1) & 0x2, 0);
    assert_eq!(hda.mmio_read(regs::RIRBCTL, 1) & 0x2, 0);
}

#[test]
fn responses_are_dropped_while_response_ring_is_stopped() {
    let (mut hda, ram) = new_hda();
    hda.mmio_write(regs::CORBLBASE, 4, CORB_BASE);
    hda.mmio_write(regs::RIRBLBASE, 4, RIRB_BASE);
    hda.mmio_write(regs::CORBCTL, 1, u64::from(regs::CORBCTL_RUN));

    push_verb(&mut hda, &ram, verb_long(0, 0, GET_PARAMETER, PARAM_VENDOR_ID));

    // The command was consumed, the response went nowhere.
    assert_eq!(hda.mmio_read(regs::CORBRP, 2), 1);
    assert_eq!(hda.mmio_read(regs::RIRBWP, 2), 0);
    assert_eq!(ram.read_u32(RIRB_BASE + 8).unwrap(), 0);
}

#[test]
fn response_interrupt_batches_at_rintcnt() {
    let (mut hda, ram) = new_hda();
    start_rings(&mut hda);
    hda.mmio_write(regs::RINTCNT, 2, 3);

    let verb = verb_long(0, 0, GET_PARAMETER, PARAM_VENDOR_ID);
    push_verb(&mut hda, &ram, verb);
    push_verb(&mut hda, &ram, verb);
    assert_eq!(hda.mmio_read(regs::RIRBSTS, 1), 0);
    push_verb(&mut hda, &ram, verb);
    assert_eq!(hda.mmio_read(regs::RIRBSTS, 1), 1);

    // The counter restarts after each interrupt.
    hda.mmio_write(regs::RIRBSTS, 1, 1);
    push_verb(&mut hda, &ram, verb);
    push_verb(&mut hda, &ram, verb);
    assert_eq!(hda.mmio_read(regs::RIRBSTS, 1), 0);
    push_verb(&mut hda, &ram, verb);
    assert_eq!(hda.mmio_read(regs::RIRBSTS, 1), 1);
}

#[test]
fn rirb_write_pointer_is_read_only_until_reset() {
    let (mut hda, ram) = new_hda();
    start_rings(&mut hda);
    let verb = verb_long(0, 0, GET_PARAMETER, PARAM_VENDOR_ID);
    push_verb(&mut hda, &ram, verb);
    push_verb(&mut hda, &ram, verb);
    assert_eq!(hda.mmio_read(regs::RIRBWP, 2), 2);

    // Plain writes do not move the pointer.
    hda.mmio_write(regs::RIRBWP, 2, 7);
    assert_eq!(hda.mmio_read(regs::RIRBWP, 2), 2);

    // The reset bit clears it and itself reads back zero.
    hda.mmio_write(regs::RIRBWP, 2, u64::from(regs::RIRBWP_RST));
    assert_eq!(hda.mmio_read(regs::RIRBWP, 2), 0);

    push_verb(&mut hda, &ram, verb);
    assert_eq!(hda.mmio_read(regs::RIRBWP, 2), 1);
}
