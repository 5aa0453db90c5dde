//! Audio worker threads.
//!
//! Each configured direction gets one long-lived thread that shuttles
//! fixed-size chunks between the stream engine and a host [`AudioBackend`].
//! The thread is spawned when the device is built and parks on a condition
//! variable whenever its run flag is clear; starting a stream only flips the
//! flag and signals, so stream start/stop never pays thread creation cost.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{debug, warn};

use crate::device::HdaController;
use crate::stream::{StreamDir, StreamParams};

/// Bytes moved per pump iteration. Must stay a multiple of the DMA step so
/// buffer-descriptor boundaries land exactly on chunk positions.
pub const STREAM_CHUNK_BYTES: usize = 4096;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("unsupported stream parameters {0:?}")]
    Unsupported(StreamParams),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Host-side audio endpoint for one direction.
///
/// `play` and `record` are expected to block until the host has consumed or
/// produced the chunk; that back-pressure is what paces the guest stream.
pub trait AudioBackend: Send {
    /// Prepares the backend for a stream. An `Err` refuses the start and
    /// leaves the worker parked.
    fn configure(&mut self, params: &StreamParams) -> Result<(), BackendError>;
    /// Consumes one chunk of guest PCM.
    fn play(&mut self, buf: &[u8]);
    /// Fills `buf` with one chunk of host PCM.
    fn record(&mut self, buf: &mut [u8]);
}

/// Backend that accepts every format, discards playback and records silence.
#[derive(Debug, Default)]
pub struct NullBackend;

impl AudioBackend for NullBackend {
    fn configure(&mut self, _params: &StreamParams) -> Result<(), BackendError> {
        Ok(())
    }

    fn play(&mut self, _buf: &[u8]) {}

    fn record(&mut self, buf: &mut [u8]) {
        buf.fill(0);
    }
}

#[derive(Debug, Default)]
struct WorkerFlags {
    run: bool,
    shutdown: bool,
}

#[derive(Default)]
struct WorkerControl {
    flags: Mutex<WorkerFlags>,
    cond: Condvar,
}

/// Start/stop handle for one worker thread.
///
/// Clones share the same thread: the codec keeps one to act on stream
/// notifications, the device keeps another to shut the thread down on drop.
#[derive(Clone)]
pub struct WorkerHandle {
    control: Arc<WorkerControl>,
    backend: Arc<Mutex<Box<dyn AudioBackend>>>,
}

impl WorkerHandle {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            control: Arc::new(WorkerControl::default()),
            backend: Arc::new(Mutex::new(backend)),
        }
    }

    /// Runs backend setup and, on success, sets the run flag and wakes the
    /// worker. A refused setup leaves the flag clear and reports `false`.
    pub fn start(&self, params: StreamParams) -> bool {
        if let Err(err) = lock(&self.backend).configure(&params) {
            warn!(%err, ?params, "audio backend refused configuration");
            return false;
        }
        let mut flags = lock(&self.control.flags);
        flags.run = true;
        self.control.cond.notify_all();
        true
    }

    /// Clears the run flag. The worker parks after its in-flight chunk; the
    /// thread itself stays alive for the next start.
    pub fn request_stop(&self) {
        let mut flags = lock(&self.control.flags);
        flags.run = false;
        self.control.cond.notify_all();
    }

    pub fn is_running(&self) -> bool {
        lock(&self.control.flags).run
    }

    pub(crate) fn shutdown(&self) {
        let mut flags = lock(&self.control.flags);
        flags.shutdown = true;
        self.control.cond.notify_all();
    }

    pub(crate) fn spawn(
        &self,
        controller: Weak<Mutex<HdaController>>,
        cad: u8,
        dir: StreamDir,
    ) -> JoinHandle<()> {
        let control = Arc::clone(&self.control);
        let backend = Arc::clone(&self.backend);
        thread::spawn(move || worker_loop(&control, &backend, &controller, cad, dir))
    }
}

#[derive(Clone, Copy)]
enum Pump {
    Moved,
    StreamStopped,
    DeviceGone,
}

fn worker_loop(
    control: &WorkerControl,
    backend: &Mutex<Box<dyn AudioBackend>>,
    controller: &Weak<Mutex<HdaController>>,
    cad: u8,
    dir: StreamDir,
) {
    let mut chunk = vec![0u8; STREAM_CHUNK_BYTES];
    loop {
        {
            let mut flags = lock(&control.flags);
            loop {
                if flags.shutdown {
                    return;
                }
                if flags.run {
                    break;
                }
                flags = control
                    .cond
                    .wait(flags)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }

        // One chunk per pass. The controller lock is released before the
        // backend call so MMIO dispatch never waits on host audio I/O.
        let outcome = match dir {
            StreamDir::Output => {
                let outcome = pump_guest(controller, cad, dir, &mut chunk);
                if matches!(outcome, Pump::Moved) {
                    lock(backend).play(&chunk);
                }
                outcome
            }
            StreamDir::Input => {
                lock(backend).record(&mut chunk);
                pump_guest(controller, cad, dir, &mut chunk)
            }
        };
        match outcome {
            Pump::Moved => {}
            Pump::StreamStopped => lock(&control.flags).run = false,
            Pump::DeviceGone => return,
        }
    }
}

fn pump_guest(
    controller: &Weak<Mutex<HdaController>>,
    cad: u8,
    dir: StreamDir,
    chunk: &mut [u8],
) -> Pump {
    let Some(controller) = controller.upgrade() else {
        return Pump::DeviceGone;
    };
    let mut controller = lock(&controller);
    match controller.worker_transfer(cad, dir, chunk) {
        Ok(()) => Pump::Moved,
        Err(err) => {
            debug!(cad, ?dir, %err, "stream transfer stopped, worker parking");
            Pump::StreamStopped
        }
    }
}

/// Lock that survives a panicked holder. Worker threads and MMIO dispatch
/// share these mutexes; a poisoned guard's data is still consistent because
/// every critical section leaves the model in a valid state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
