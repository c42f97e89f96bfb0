//! Per-invocation buffer of log and subrequest records.
//!
//! Appends may arrive from interleaved (or truly parallel) fetch completions,
//! so both sequences sit behind one mutex that is never held across an await.
//! Subrequests keep the order in which calls were *issued*: a call reserves
//! its slot when it starts and seals it when it settles.

use crate::payload::{LogRecord, SubrequestRecord};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;

/// Ordered, append-only record buffer for one invocation.
///
/// Cloning yields another handle to the same buffer.
#[derive(Debug, Clone)]
pub struct LogCollector {
    service: Arc<str>,
    correlation_id: Option<Arc<str>>,
    buffers: Arc<Mutex<Buffers>>,
}

#[derive(Debug, Default)]
struct Buffers {
    logs: Vec<LogRecord>,
    subrequests: Vec<Option<SubrequestRecord>>,
}

/// Position reserved for a subrequest that has not settled yet.
#[derive(Debug)]
#[must_use = "a reserved slot is omitted from the payload unless sealed"]
pub(crate) struct SubrequestSlot(usize);

impl LogCollector {
    pub fn new(service: impl Into<Arc<str>>, correlation_id: Option<&str>) -> Self {
        Self {
            service: service.into(),
            correlation_id: correlation_id.map(Arc::from),
            buffers: Arc::default(),
        }
    }

    /// Appends a log entry built from `data`, `service` and `correlationId`.
    pub fn append_log(&self, data: Value) {
        let record = LogRecord::new(data, &self.service, self.correlation_id.as_deref());
        self.buffers.lock().logs.push(record);
    }

    /// Appends an already sealed subrequest record.
    pub fn append_subrequest(&self, record: SubrequestRecord) {
        self.buffers.lock().subrequests.push(Some(record));
    }

    pub(crate) fn reserve_subrequest(&self) -> SubrequestSlot {
        let mut buffers = self.buffers.lock();
        buffers.subrequests.push(None);
        SubrequestSlot(buffers.subrequests.len() - 1)
    }

    pub(crate) fn seal_subrequest(&self, slot: SubrequestSlot, record: SubrequestRecord) {
        let mut buffers = self.buffers.lock();
        if let Some(entry) = buffers.subrequests.get_mut(slot.0) {
            *entry = Some(record);
        }
    }

    /// Log records in insertion order.
    pub fn logs(&self) -> Vec<LogRecord> {
        self.buffers.lock().logs.clone()
    }

    /// Settled subrequest records in call-issue order.
    pub fn subrequests(&self) -> Vec<SubrequestRecord> {
        self.buffers
            .lock()
            .subrequests
            .iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Number of calls that were issued but never settled.
    pub fn unsettled(&self) -> usize {
        self.buffers
            .lock()
            .subrequests
            .iter()
            .filter(|slot| slot.is_none())
            .count()
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }
}
