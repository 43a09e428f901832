//! Record publication
//!
//! Capture paths hand completed records to whatever sink is installed in the
//! process-global slot. The slot is empty until [`install_sink`] runs and can
//! be reverted with [`uninstall_sink`], so tests (and hosts that only want
//! instrumentation sometimes) can flip capture on and off.
//!
//! Publishing is synchronous and infallible from the caller's point of view:
//! a sink that cannot deliver drops the record, never the request.

use std::sync::{Arc, Mutex, RwLock};

use once_cell::sync::Lazy;
use tokio::sync::mpsc;

use netlens_core::record::RequestRecord;
use netlens_core::wire::WireMessage;

/// Destination for completed records.
pub trait RecordSink: Send + Sync {
    fn publish(&self, record: RequestRecord);
}

static SINK: Lazy<RwLock<Option<Arc<dyn RecordSink>>>> = Lazy::new(|| RwLock::new(None));

/// Install a sink into the global slot, replacing any previous one.
pub fn install_sink(sink: Arc<dyn RecordSink>) {
    *SINK.write().expect("sink slot poisoned") = Some(sink);
}

/// Revert the global slot; capture surfaces become passthrough again.
pub fn uninstall_sink() {
    *SINK.write().expect("sink slot poisoned") = None;
}

/// The currently installed sink, if any. Resolved once per intercepted call
/// so a record is owned by exactly one capture path end to end.
pub(crate) fn current_sink() -> Option<Arc<dyn RecordSink>> {
    SINK.read().expect("sink slot poisoned").clone()
}

/// Sink that feeds the IPC channel task.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<WireMessage>,
}

impl ChannelSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<WireMessage>) -> Self {
        Self { tx }
    }
}

impl RecordSink for ChannelSink {
    fn publish(&self, record: RequestRecord) {
        if self
            .tx
            .send(WireMessage::RequestEnd { record })
            .is_err()
        {
            tracing::debug!("channel task gone, record dropped");
        }
    }
}

/// Test sink that stores every published record in memory.
#[derive(Default)]
pub struct CollectorSink {
    records: Mutex<Vec<RequestRecord>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<RequestRecord> {
        self.records.lock().expect("collector poisoned").clone()
    }
}

impl RecordSink for CollectorSink {
    fn publish(&self, record: RequestRecord) {
        self.records.lock().expect("collector poisoned").push(record);
    }
}
