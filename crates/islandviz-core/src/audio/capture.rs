//! Loopback capture session and its worker thread
//!
//! [`CaptureSession`] is the synchronous lifecycle (start/stop on a backend).
//! [`LoopbackCapture`] runs a session on a dedicated thread and accepts
//! fire-and-forget commands, so opening a slow device never stalls the render
//! tick. Failures are logged and leave the shared levels inactive, which the
//! animation treats as "no signal".

use super::backend::{CaptureBackend, ErrorNotifier, FrameSink};
use super::envelope::{BandEnvelopeFollower, SharedBandLevels};
use super::SpectralAnalyzer;
use crate::config::VisualizerConfig;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Audio capture failures. All of them lead to fallback motion.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// No loopback-capable device exists
    #[error("no audio loopback device available")]
    NoDevice,

    /// The OS refused capture
    #[error("permission to capture audio was denied")]
    PermissionDenied,

    /// The device went away while capturing
    #[error("audio device was lost")]
    DeviceLost,

    /// The device offers no sample format we can read
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// Any other backend failure
    #[error("audio backend error: {0}")]
    Backend(String),
}

/// Description of an opened capture stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Started {
    /// Device name
    pub device: String,
    /// Frames per second
    pub sample_rate: u32,
    /// Channels per frame
    pub channels: u16,
}

/// Capture counters, for diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Callback buffers received
    pub batches: u64,
    /// Interleaved samples received
    pub samples: u64,
    /// Spectra computed and published
    pub spectra: u64,
    /// Sessions successfully opened
    pub sessions_started: u64,
    /// Failed opens and lost devices
    pub failures: u64,
}

#[derive(Debug, Default)]
struct CaptureCounters {
    batches: AtomicU64,
    samples: AtomicU64,
    spectra: AtomicU64,
    sessions_started: AtomicU64,
    failures: AtomicU64,
}

impl CaptureCounters {
    fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            batches: self.batches.load(Ordering::Relaxed),
            samples: self.samples.load(Ordering::Relaxed),
            spectra: self.spectra.load(Ordering::Relaxed),
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Commands for the capture worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Stop,
    /// The device of the given session reported a failure
    DeviceLost(u64),
    Shutdown,
}

/// One capture lifecycle on one backend.
///
/// Analysis state (accumulation window, FFT buffers, envelope) is created on
/// [`start`](Self::start) and dropped on [`stop`](Self::stop).
pub struct CaptureSession<B: CaptureBackend> {
    backend: B,
    config: VisualizerConfig,
    levels: SharedBandLevels,
    counters: Arc<CaptureCounters>,
    current: Option<Started>,
    session_id: u64,
    /// Id of the open session, 0 while closed. Read by device-thread notifiers.
    live_session: Arc<AtomicU64>,
    loss_tx: Option<Sender<Command>>,
}

impl<B: CaptureBackend> CaptureSession<B> {
    /// Session publishing into `levels`
    pub fn new(backend: B, config: VisualizerConfig, levels: SharedBandLevels) -> Self {
        Self {
            backend,
            config,
            levels,
            counters: Arc::new(CaptureCounters::default()),
            current: None,
            session_id: 0,
            live_session: Arc::new(AtomicU64::new(0)),
            loss_tx: None,
        }
    }

    fn with_counters(mut self, counters: Arc<CaptureCounters>) -> Self {
        self.counters = counters;
        self
    }

    fn with_loss_channel(mut self, tx: Sender<Command>) -> Self {
        self.loss_tx = Some(tx);
        self
    }

    /// Open the device and begin publishing band levels.
    ///
    /// Does nothing and returns the open stream when already active.
    pub fn start(&mut self) -> Result<Started, CaptureError> {
        if let Some(started) = &self.current {
            debug!("Capture already active on '{}'", started.device);
            self.levels.set_active(true);
            return Ok(started.clone());
        }

        self.session_id += 1;
        let sink = self.make_sink();
        let notifier = self.make_notifier();
        // Errors may arrive while the device is still opening
        self.live_session.store(self.session_id, Ordering::SeqCst);

        match self.backend.open(sink, notifier) {
            Ok(started) => {
                self.levels.set_active(true);
                self.counters.sessions_started.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Capture session {} started via {} backend on '{}'",
                    self.session_id,
                    self.backend.name(),
                    started.device
                );
                self.current = Some(started.clone());
                Ok(started)
            }
            Err(e) => {
                self.live_session.store(0, Ordering::SeqCst);
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                self.levels.set_active(false);
                Err(e)
            }
        }
    }

    /// Close the device. Safe to call repeatedly or after a failed start.
    pub fn stop(&mut self) {
        // Callback goes first so it never runs against released state
        self.backend.close();
        self.live_session.store(0, Ordering::SeqCst);
        self.levels.set_active(false);
        if self.current.take().is_some() {
            info!("Capture session {} stopped", self.session_id);
        }
    }

    /// Whether a stream is open
    pub fn is_active(&self) -> bool {
        self.current.is_some()
    }

    /// Counter snapshot
    pub fn stats(&self) -> CaptureStats {
        self.counters.snapshot()
    }

    /// Tear down after the device of `session` failed
    fn handle_device_lost(&mut self, session: u64) {
        if session != self.session_id || self.current.is_none() {
            debug!("Ignoring device loss from stale session {}", session);
            return;
        }
        warn!("Audio device lost, falling back to procedural motion");
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        self.stop();
    }

    fn make_sink(&self) -> FrameSink {
        let mut analyzer = SpectralAnalyzer::from_config(&self.config);
        let mut follower = BandEnvelopeFollower::new(self.config.bar_count);
        let levels = self.levels.clone();
        let counters = Arc::clone(&self.counters);

        Box::new(move |batch| {
            counters.batches.fetch_add(1, Ordering::Relaxed);
            counters
                .samples
                .fetch_add(batch.samples.len() as u64, Ordering::Relaxed);

            let spectra = analyzer.process_batch(batch, |instant| {
                levels.publish(follower.apply(instant));
            });
            if spectra > 0 {
                counters.spectra.fetch_add(spectra as u64, Ordering::Relaxed);
            }
        })
    }

    fn make_notifier(&self) -> ErrorNotifier {
        let levels = self.levels.clone();
        let loss_tx = self.loss_tx.clone();
        let live_session = Arc::clone(&self.live_session);
        let session = self.session_id;

        Arc::new(move |err: CaptureError| {
            // A closed stream can still report late; it must not silence its successor
            if live_session.load(Ordering::SeqCst) != session {
                debug!("Ignoring error from closed capture session {}: {}", session, err);
                return;
            }
            warn!("Capture session {} failed: {}", session, err);
            levels.set_active(false);
            if let Some(tx) = &loss_tx {
                let _ = tx.send(Command::DeviceLost(session));
            }
        })
    }
}

/// Capture session running on its own thread.
///
/// `start`/`stop` only enqueue a command and return immediately. Dropping
/// the handle stops capture and joins the worker.
pub struct LoopbackCapture {
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
    levels: SharedBandLevels,
    counters: Arc<CaptureCounters>,
}

impl LoopbackCapture {
    /// Spawn the worker. `make_backend` runs on the worker thread, so the
    /// backend itself need not be `Send`.
    pub fn spawn<F, B>(
        config: &VisualizerConfig,
        levels: SharedBandLevels,
        make_backend: F,
    ) -> Result<Self, CaptureError>
    where
        F: FnOnce() -> B + Send + 'static,
        B: CaptureBackend,
    {
        let (tx, rx) = unbounded();
        let counters = Arc::new(CaptureCounters::default());

        let worker_config = config.clone();
        let worker_levels = levels.clone();
        let worker_counters = Arc::clone(&counters);
        let loss_tx = tx.clone();

        let worker = std::thread::Builder::new()
            .name("islandviz-capture".into())
            .spawn(move || {
                let session = CaptureSession::new(make_backend(), worker_config, worker_levels)
                    .with_counters(worker_counters)
                    .with_loss_channel(loss_tx);
                run_worker(session, rx);
            })
            .map_err(|e| CaptureError::Backend(format!("failed to spawn capture thread: {e}")))?;

        debug!("Capture worker spawned");

        Ok(Self {
            commands: tx,
            worker: Some(worker),
            levels,
            counters,
        })
    }

    /// Ask the worker to open the device
    pub fn start(&self) {
        self.send(Command::Start);
    }

    /// Ask the worker to close the device
    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Whether audio is currently flowing into the shared levels
    pub fn is_active(&self) -> bool {
        self.levels.is_active()
    }

    /// Shared band levels this capture publishes into
    pub fn levels(&self) -> &SharedBandLevels {
        &self.levels
    }

    /// Counter snapshot
    pub fn stats(&self) -> CaptureStats {
        self.counters.snapshot()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Capture worker gone, dropping {:?}", command);
        }
    }
}

impl Drop for LoopbackCapture {
    fn drop(&mut self) {
        self.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Capture worker panicked");
            }
        }
    }
}

fn run_worker<B: CaptureBackend>(mut session: CaptureSession<B>, commands: Receiver<Command>) {
    for command in commands.iter() {
        match command {
            Command::Start => {
                if let Err(e) = session.start() {
                    warn!("Audio capture unavailable, using fallback motion: {}", e);
                }
            }
            Command::Stop => session.stop(),
            Command::DeviceLost(id) => session.handle_device_lost(id),
            Command::Shutdown => break,
        }
    }
    session.stop();
    debug!("Capture worker exiting");
}
