//! Append-only audit trail plumbing.
//!
//! One serialization point per sink: events from concurrent workers are
//! appended in receipt order, and each record's own events arrive in
//! stage order because a record is processed by exactly one worker.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::error;

use phi_model::AuditEvent;

use crate::metrics::EngineMetrics;

/// Destination for audit events. Append-only; no update or delete.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> io::Result<()>;
}

/// File-backed sink writing one JSON event per line.
pub struct JsonlSink {
    file: Mutex<std::fs::File>,
}

impl JsonlSink {
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl AuditSink for JsonlSink {
    fn append(&self, event: &AuditEvent) -> io::Result<()> {
        let line = serde_json::to_string(event).map_err(io::Error::other)?;
        let mut guard = self
            .file
            .lock()
            .map_err(|_| io::Error::other("audit file lock poisoned"))?;
        guard.write_all(line.as_bytes())?;
        guard.write_all(b"\n")?;
        guard.flush()
    }
}

/// In-memory sink for tests and dry runs.
#[derive(Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().map_or_else(|_| Vec::new(), |g| g.clone())
    }
}

impl AuditSink for MemorySink {
    fn append(&self, event: &AuditEvent) -> io::Result<()> {
        self.events
            .lock()
            .map_err(|_| io::Error::other("memory sink lock poisoned"))?
            .push(event.clone());
        Ok(())
    }
}

/// Records events without ever failing the calling record pipeline.
///
/// Appends run on a dedicated writer thread; `record` waits for the
/// write acknowledgement up to the per-operation deadline, so a hung
/// sink cannot stall a worker. A write failure or deadline overrun
/// latches the unhealthy flag; the coordinator checks it before
/// dispatching further records. The trail is the compliance guarantee,
/// so an unavailable sink escalates to the batch level rather than
/// being silently dropped. A sink whose `append` never returns leaks
/// the writer thread.
pub struct AuditRecorder {
    tx: Sender<(AuditEvent, SyncSender<io::Result<()>>)>,
    metrics: Arc<EngineMetrics>,
    unhealthy: AtomicBool,
    timeout: Duration,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>, metrics: Arc<EngineMetrics>, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<(AuditEvent, SyncSender<io::Result<()>>)>();
        thread::spawn(move || {
            for (event, ack) in rx {
                let result = sink.append(&event);
                let _ = ack.send(result);
            }
        });
        Self {
            tx,
            metrics,
            unhealthy: AtomicBool::new(false),
            timeout,
        }
    }

    pub fn record(&self, event: AuditEvent) {
        if !self.is_healthy() {
            return;
        }
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if self.tx.send((event, ack_tx)).is_err() {
            self.mark_unhealthy("audit writer thread terminated");
            return;
        }
        match ack_rx.recv_timeout(self.timeout) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.mark_unhealthy(&e.to_string()),
            Err(_) => self.mark_unhealthy("audit write exceeded the operation deadline"),
        }
    }

    fn mark_unhealthy(&self, message: &str) {
        self.metrics.inc_audit_write_failures();
        if !self.unhealthy.swap(true, Ordering::SeqCst) {
            error!(error = message, "audit sink write failed, halting batch dispatch");
        }
    }

    pub fn is_healthy(&self) -> bool {
        !self.unhealthy.load(Ordering::SeqCst)
    }
}
