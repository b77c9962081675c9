//! Non-blocking Frame Queue
//!
//! Low-priority FIFO for elements marked non-blocking. The host calls
//! [`FrameQueue::run_frame`] once per display refresh; each frame processes
//! queued callbacks until the frame budget is spent, then yields.

use crate::{Callback, GemError, RuntimeConfig};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Frame statistics
#[derive(Debug, Default)]
pub struct FrameReport {
    pub executed: usize,
    pub remaining: usize,
    pub elapsed: Duration,
    pub errors: Vec<GemError>,
}

impl FrameReport {
    /// Whether another frame should be requested
    pub fn needs_frame(&self) -> bool {
        self.remaining > 0
    }
}

/// Time-sliced task queue
#[derive(Clone)]
pub struct FrameQueue {
    inner: Rc<FrameQueueInner>,
}

struct FrameQueueInner {
    tasks: RefCell<VecDeque<Callback>>,
    budget: Duration,
    high_water: Option<usize>,
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::new(&RuntimeConfig::default())
    }
}

impl FrameQueue {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            inner: Rc::new(FrameQueueInner {
                tasks: RefCell::new(VecDeque::new()),
                budget: config.frame_budget(),
                high_water: config.frame_queue_high_water,
            }),
        }
    }

    /// Append `task`, moving it to the tail if it is already queued
    pub fn add(&self, task: Callback) {
        let mut tasks = self.inner.tasks.borrow_mut();
        if let Some(pos) = tasks.iter().position(|t| t.ptr_eq(&task)) {
            tasks.remove(pos);
        }
        tasks.push_back(task);
    }

    /// Cancel a queued task, returns whether it was still pending
    pub fn delete(&self, task: &Callback) -> bool {
        let mut tasks = self.inner.tasks.borrow_mut();
        match tasks.iter().position(|t| t.ptr_eq(task)) {
            Some(pos) => {
                tasks.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, task: &Callback) -> bool {
        self.inner.tasks.borrow().iter().any(|t| t.ptr_eq(task))
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queue depth reached the configured high-water mark
    pub fn is_saturated(&self) -> bool {
        self.inner.high_water.is_some_and(|limit| self.len() >= limit)
    }

    pub fn budget(&self) -> Duration {
        self.inner.budget
    }

    /// Process one frame with the configured budget
    pub fn run_frame(&self) -> FrameReport {
        self.run_frame_with_budget(self.inner.budget)
    }

    /// Process tasks in FIFO order until `budget` is exceeded.
    /// At least one task runs per frame so the queue always makes progress.
    pub fn run_frame_with_budget(&self, budget: Duration) -> FrameReport {
        let start = Instant::now();
        let mut report = FrameReport::default();
        loop {
            let next = self.inner.tasks.borrow_mut().pop_front();
            let Some(task) = next else { break };
            report.executed += 1;
            if let Err(err) = task.call() {
                tracing::error!("unhandled error in non-blocking task: {}", err);
                report.errors.push(err);
            }
            if start.elapsed() >= budget {
                break;
            }
        }
        report.elapsed = start.elapsed();
        report.remaining = self.len();
        if report.remaining > 0 {
            tracing::debug!(
                executed = report.executed,
                remaining = report.remaining,
                "frame budget exhausted, yielding"
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn recorder(log: &Rc<RefCell<Vec<u32>>>, id: u32) -> Callback {
        let log = log.clone();
        Callback::from_fn(move || log.borrow_mut().push(id))
    }

    #[test]
    fn test_fifo_within_budget() {
        let queue = FrameQueue::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            queue.add(recorder(&log, i));
        }
        let report = queue.run_frame_with_budget(Duration::from_secs(1));
        assert_eq!(report.executed, 3);
        assert!(!report.needs_frame());
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn test_zero_budget_runs_one_per_frame() {
        let queue = FrameQueue::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            queue.add(recorder(&log, i));
        }
        let report = queue.run_frame_with_budget(Duration::ZERO);
        assert_eq!(report.executed, 1);
        assert!(report.needs_frame());
        assert_eq!(report.remaining, 2);
    }

    #[test]
    fn test_delete_cancels() {
        let queue = FrameQueue::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let a = recorder(&log, 1);
        let b = recorder(&log, 2);
        queue.add(a.clone());
        queue.add(b);
        assert!(queue.delete(&a));
        assert!(!queue.delete(&a));
        queue.run_frame();
        assert_eq!(*log.borrow(), vec![2]);
    }

    #[test]
    fn test_saturation() {
        let config = RuntimeConfig {
            frame_queue_high_water: Some(2),
            ..RuntimeConfig::default()
        };
        let queue = FrameQueue::new(&config);
        let log = Rc::new(RefCell::new(Vec::new()));
        queue.add(recorder(&log, 1));
        assert!(!queue.is_saturated());
        queue.add(recorder(&log, 2));
        assert!(queue.is_saturated());
    }
}
