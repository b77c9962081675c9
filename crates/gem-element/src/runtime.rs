//! Runtime
//!
//! Everything elements share: the scheduler, the frame queue, the
//! stylesheet registry, the custom element registry and the document.

use crate::dom::RootNode;
use crate::registry::Registry;
use crate::stylesheet::StyleRegistry;
use gem_core::{Checkpoint, EventTarget, FrameQueue, FrameReport, RuntimeConfig, Scheduler};
use std::fmt;
use std::rc::Rc;

/// Shared runtime handle
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

struct RuntimeInner {
    config: RuntimeConfig,
    scheduler: Scheduler,
    frames: FrameQueue,
    styles: StyleRegistry,
    registry: Registry,
    document: RootNode,
    document_events: EventTarget,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("pending", &self.inner.scheduler.pending())
            .field("frames", &self.inner.frames.len())
            .finish()
    }
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let scheduler = Scheduler::new();
        tracing::debug!(
            frame_budget_ms = config.frame_budget_ms,
            "gem runtime v{}",
            crate::VERSION
        );
        Self {
            inner: Rc::new(RuntimeInner {
                frames: FrameQueue::new(&config),
                styles: StyleRegistry::new(&scheduler),
                registry: Registry::new(),
                document: RootNode::document(),
                document_events: EventTarget::new(),
                scheduler,
                config,
            }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    pub fn frames(&self) -> &FrameQueue {
        &self.inner.frames
    }

    pub fn styles(&self) -> &StyleRegistry {
        &self.inner.styles
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn document(&self) -> &RootNode {
        &self.inner.document
    }

    /// Receives events dispatched by global emitters
    pub fn document_events(&self) -> &EventTarget {
        &self.inner.document_events
    }

    /// Drain the microtask queue
    pub fn run_microtasks(&self) -> Checkpoint {
        self.inner.scheduler.run_microtasks()
    }

    /// One display frame: non-blocking work, then the microtasks it queued
    pub fn run_frame(&self) -> FrameReport {
        let mut report = self.inner.frames.run_frame();
        let checkpoint = self.inner.scheduler.run_microtasks();
        report.errors.extend(checkpoint.errors);
        report
    }
}
