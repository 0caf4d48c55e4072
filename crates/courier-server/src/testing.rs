//! In-memory [`FrameSink`] for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use courier_core::{ConnectionId, Message, TransportError};
use parking_lot::Mutex;

use crate::transport::{CloseReason, FrameSink};

/// Records every frame written to it. Can be told to fail after `n` writes.
pub(crate) struct RecordingSink {
    id: ConnectionId,
    frames: Mutex<Vec<String>>,
    fail_after: Option<usize>,
    closed: Mutex<Option<CloseReason>>,
}

impl RecordingSink {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::with_limit(None))
    }

    /// Every write fails.
    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self::with_limit(Some(0)))
    }

    /// The first `n` writes succeed, the rest fail.
    pub(crate) fn failing_after(n: usize) -> Arc<Self> {
        Arc::new(Self::with_limit(Some(n)))
    }

    fn with_limit(fail_after: Option<usize>) -> Self {
        Self {
            id: ConnectionId::new(),
            frames: Mutex::new(Vec::new()),
            fail_after,
            closed: Mutex::new(None),
        }
    }

    pub(crate) fn contents(&self) -> Vec<String> {
        self.frames
            .lock()
            .iter()
            .map(|f| Message::decode(f, Utc::now()).unwrap().content().to_owned())
            .collect()
    }

    pub(crate) fn close_reason(&self) -> Option<CloseReason> {
        *self.closed.lock()
    }
}

#[async_trait]
impl FrameSink for RecordingSink {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn write_frame(&self, frame: String) -> Result<(), TransportError> {
        if self.closed.lock().is_some() {
            return Err(TransportError::Closed);
        }
        let mut frames = self.frames.lock();
        if self.fail_after.is_some_and(|n| frames.len() >= n) {
            return Err(TransportError::Socket("broken pipe".into()));
        }
        frames.push(frame);
        Ok(())
    }

    fn close(&self, reason: CloseReason) {
        let mut closed = self.closed.lock();
        if closed.is_none() {
            *closed = Some(reason);
        }
    }
}

pub(crate) fn msg(from: &str, to: &str, content: &str) -> Message {
    Message::new(from.into(), to.into(), content)
}
