//! In-memory transport for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::dispatch::{Command, Transport};
use crate::error::DispatchError;

#[derive(Default)]
struct Inner {
    sent: Vec<Command>,
    fail_next: Option<String>,
    fail_all: Option<String>,
}

/// Records every command it is asked to send; can be told to fail.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commands accepted so far, oldest first.
    pub fn sent(&self) -> Vec<Command> {
        self.lock().sent.clone()
    }

    pub fn clear(&self) {
        self.lock().sent.clear();
    }

    /// Fail only the next send with `Unavailable(reason)`.
    pub fn fail_next(&self, reason: &str) {
        self.lock().fail_next = Some(reason.to_string());
    }

    /// Fail every send until cleared with `None`.
    pub fn fail_all(&self, reason: Option<&str>) {
        self.lock().fail_all = reason.map(str::to_string);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, command: &Command) -> Result<(), DispatchError> {
        let mut inner = self.lock();
        if let Some(reason) = inner.fail_next.take().or_else(|| inner.fail_all.clone()) {
            return Err(DispatchError::Unavailable(reason));
        }
        inner.sent.push(*command);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
