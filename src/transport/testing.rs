//! Scripted in-memory transport for unit tests.
//!
//! The test drives the remote end through [`Remote`]: it injects fragments,
//! closes and faults, and inspects what reached the wire. Both halves count
//! how many receives/sends are outstanding at once.

use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::error::{Error, Result};

use super::socket::{Connector, FrameSink, FrameSource, Fragment, TransportLimits};

// ============================================================================
// Concurrency Gauge
// ============================================================================

/// Tracks current and peak number of overlapping operations.
#[derive(Debug, Default)]
pub(crate) struct Gauge {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) -> GaugeGuard<'_> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        GaugeGuard { gauge: self }
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

struct GaugeGuard<'a> {
    gauge: &'a Gauge,
}

impl Drop for GaugeGuard<'_> {
    fn drop(&mut self) {
        self.gauge.active.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Wire
// ============================================================================

#[derive(Debug, Default)]
struct WireInner {
    frames: Mutex<Vec<Bytes>>,
    close_reasons: Mutex<Vec<String>>,
    sends: Gauge,
    fail_sends: AtomicBool,
    stall_close: AtomicBool,
}

/// Observer for everything written to a [`RecordingSink`].
#[derive(Debug, Clone, Default)]
pub(crate) struct Wire(Arc<WireInner>);

impl Wire {
    pub(crate) fn frames(&self) -> Vec<Bytes> {
        self.0.frames.lock().clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.0
            .frames
            .lock()
            .iter()
            .map(|frame| String::from_utf8_lossy(frame).into_owned())
            .collect()
    }

    pub(crate) fn close_reasons(&self) -> Vec<String> {
        self.0.close_reasons.lock().clone()
    }

    pub(crate) fn max_concurrent_sends(&self) -> usize {
        self.0.sends.peak()
    }

    /// Makes every following send fail with a connection reset.
    pub(crate) fn fail_sends(&self) {
        self.0.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Makes `close_output` record its reason and then never finish.
    pub(crate) fn stall_close(&self) {
        self.0.stall_close.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// RecordingSink
// ============================================================================

/// Write half that records frames instead of sending them.
#[derive(Debug)]
pub(crate) struct RecordingSink {
    wire: Wire,
}

impl RecordingSink {
    pub(crate) fn new() -> (Self, Wire) {
        let wire = Wire::default();
        (Self { wire: wire.clone() }, wire)
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn send_frame(&mut self, payload: Bytes) -> Result<()> {
        let _guard = self.wire.0.sends.enter();

        // Writes take at least one scheduler turn.
        tokio::task::yield_now().await;

        if self.wire.0.fail_sends.load(Ordering::SeqCst) {
            return Err(IoError::new(ErrorKind::ConnectionReset, "connection reset").into());
        }

        self.wire.0.frames.lock().push(payload);
        Ok(())
    }

    async fn close_output(&mut self, reason: &str) -> Result<()> {
        self.wire.0.close_reasons.lock().push(reason.to_owned());

        if self.wire.0.stall_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

// ============================================================================
// ScriptedSource
// ============================================================================

/// Read half fed by a [`Remote`].
#[derive(Debug)]
pub(crate) struct ScriptedSource {
    inbound: mpsc::UnboundedReceiver<Result<Fragment>>,
    receives: Arc<Gauge>,
    closed: Arc<AtomicBool>,
    open: bool,
}

impl ScriptedSource {
    pub(crate) fn new() -> (Self, Remote) {
        let (tx, inbound) = mpsc::unbounded_channel();
        let receives = Arc::new(Gauge::default());
        let closed = Arc::new(AtomicBool::new(false));
        let source = Self {
            inbound,
            receives: Arc::clone(&receives),
            closed: Arc::clone(&closed),
            open: true,
        };
        let remote = Remote {
            tx,
            receives,
            closed,
            wire: Wire::default(),
        };
        (source, remote)
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn receive_fragment(&mut self) -> Result<Fragment> {
        let receives = Arc::clone(&self.receives);
        let _guard = receives.enter();

        match self.inbound.recv().await {
            Some(Ok(Fragment::Close)) | None => {
                self.open = false;
                self.closed.store(true, Ordering::SeqCst);
                Ok(Fragment::Close)
            }
            Some(other) => other,
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

// ============================================================================
// Remote
// ============================================================================

/// Test-side controller of a scripted channel.
#[derive(Debug)]
pub(crate) struct Remote {
    tx: mpsc::UnboundedSender<Result<Fragment>>,
    receives: Arc<Gauge>,
    closed: Arc<AtomicBool>,
    wire: Wire,
}

impl Remote {
    pub(crate) fn push(&self, fragment: Fragment) {
        let _ = self.tx.send(Ok(fragment));
    }

    /// Sends `text` as a single-fragment message.
    pub(crate) fn send_text(&self, text: &str) {
        self.push(Fragment::last(Bytes::copy_from_slice(text.as_bytes())));
    }

    /// Sends one message split into `parts`.
    pub(crate) fn send_fragments(&self, parts: &[&str]) {
        let Some((last, head)) = parts.split_last() else {
            return;
        };
        for part in head {
            self.push(Fragment::partial(Bytes::copy_from_slice(part.as_bytes())));
        }
        self.push(Fragment::last(Bytes::copy_from_slice(last.as_bytes())));
    }

    pub(crate) fn close(&self) {
        self.push(Fragment::Close);
    }

    /// Makes the next receive fail with a connection reset.
    pub(crate) fn fail(&self) {
        let err = IoError::new(ErrorKind::ConnectionReset, "connection reset by peer");
        let _ = self.tx.send(Err(Error::Io(err)));
    }

    pub(crate) fn wire(&self) -> &Wire {
        &self.wire
    }

    /// Returns `true` once the source has handed out the close.
    pub(crate) fn close_delivered(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn max_concurrent_receives(&self) -> usize {
        self.receives.peak()
    }
}

// ============================================================================
// Connectors
// ============================================================================

/// Connector handing out one scripted channel.
#[derive(Debug)]
pub(crate) struct ScriptedConnector {
    halves: Mutex<Option<(ScriptedSource, RecordingSink)>>,
}

/// Creates a connector and the controller for its remote end.
pub(crate) fn scripted() -> (ScriptedConnector, Remote) {
    let (source, mut remote) = ScriptedSource::new();
    let (sink, wire) = RecordingSink::new();
    remote.wire = wire;

    let connector = ScriptedConnector {
        halves: Mutex::new(Some((source, sink))),
    };
    (connector, remote)
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Source = ScriptedSource;
    type Sink = RecordingSink;

    async fn connect(
        &self,
        _url: &Url,
        _limits: TransportLimits,
    ) -> Result<(Self::Source, Self::Sink)> {
        self.halves
            .lock()
            .take()
            .ok_or_else(|| Error::connection("scripted channel already used"))
    }
}

/// Connector whose handshake never finishes.
#[derive(Debug, Default)]
pub(crate) struct StalledConnector;

#[async_trait]
impl Connector for StalledConnector {
    type Source = ScriptedSource;
    type Sink = RecordingSink;

    async fn connect(
        &self,
        _url: &Url,
        _limits: TransportLimits,
    ) -> Result<(Self::Source, Self::Sink)> {
        std::future::pending().await
    }
}
