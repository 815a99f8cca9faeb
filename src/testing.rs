//! In-memory doubles for the IoT seams.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::iot::{EventPublisher, PassthroughEvent, ShadowStore};
use crate::shadow::{DesiredState, ShadowDocument};

#[derive(Default)]
pub struct MemoryStore {
    document: Mutex<Option<ShadowDocument>>,
    fail: bool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// A device with no shadow at all.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_desired(desired: DesiredState) -> Self {
        Self::with_document(ShadowDocument::from_desired(desired))
    }

    pub fn with_document(document: ShadowDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            ..Self::default()
        }
    }

    /// Every call errors, as if the data plane were unreachable.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn desired(&self) -> Option<DesiredState> {
        self.document.lock().unwrap().as_ref()?.desired().cloned()
    }
}

#[async_trait]
impl ShadowStore for MemoryStore {
    async fn get(&self) -> Result<Option<ShadowDocument>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("shadow store unavailable");
        }
        Ok(self.document.lock().unwrap().clone())
    }

    async fn update(&self, document: &ShadowDocument) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("shadow store unavailable");
        }
        *self.document.lock().unwrap() = Some(document.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<PassthroughEvent>>,
    fail: bool,
    stall: bool,
}

impl MemoryPublisher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Records the event, then never completes.
    pub fn stalled() -> Self {
        Self {
            stall: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<PassthroughEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: &PassthroughEvent) -> Result<()> {
        self.events.lock().unwrap().push(event.clone());
        if self.stall {
            std::future::pending::<()>().await;
        }
        if self.fail {
            bail!("broker unavailable");
        }
        Ok(())
    }
}
