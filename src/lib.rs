//! Intel High Definition Audio (HDA) controller + codec emulation.
//!
//! The crate is self-contained: the only external inputs are a memory bus
//! (guest physical memory access for DMA) and an optional pair of audio
//! backends (host playback/capture endpoints). Register dispatch is
//! single-threaded behind [`HdaDevice`]'s lock; per-direction worker threads
//! move PCM between the stream engine and the backends.
//!
//! Supported:
//! - the 16 KiB MMIO register window with byte/word/dword access and the
//!   read-only wall clock / position alias page
//! - CORB/RIRB command and response rings (2/16/256 entries)
//! - 4 input + 4 output stream engines with buffer descriptor lists,
//!   LPIB/DMA position buffer reporting and completion interrupts
//! - a fixed duplex codec (DAC + output pin, ADC + input pin) answering the
//!   standard parameter/control verbs
//!
//! Interrupts:
//! - Only a level-triggered INTx-style output is modelled (via
//!   [`HdaController::intx_level`] or an attached [`IrqLine`]).

pub mod codec;
pub mod corb_rirb;
pub mod device;
pub mod mem;
pub mod regs;
pub mod stream;
pub mod worker;

pub use device::{HdaController, HdaDevice, IrqLine, HDA_MMIO_SIZE};
pub use mem::{MemoryBus, MemoryError, SharedRam};
pub use stream::{StreamDir, StreamParams};
pub use worker::{AudioBackend, BackendError, NullBackend, WorkerHandle, STREAM_CHUNK_BYTES};
