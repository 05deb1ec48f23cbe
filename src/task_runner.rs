/*
    Copyright © 2026, the mirror_sync authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! A single-worker ordered task queue.
//!
//! Each sync channel serializes its work through [`TaskRunner`]s instead of
//! holding locks: every task submitted to one runner executes on the same
//! worker thread, strictly in submission order, never overlapping. This is the
//! mechanism behind the per-channel "send queue" and "chain queue".

use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle, ThreadId};

type Task = Box<dyn FnOnce() + Send>;

pub(crate) struct TaskRunner {
    sender: Option<Sender<Task>>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl TaskRunner {
    /// Spawn a named worker thread draining this runner's queue.
    pub(crate) fn new(name: String) -> TaskRunner {
        let (sender, receiver) = mpsc::channel::<Task>();
        let worker = thread::Builder::new()
            .name(name)
            .spawn(move || {
                while let Ok(task) = receiver.recv() {
                    task()
                }
            })
            .expect("Programming error: fail to spawn TaskRunner worker thread.");
        let worker_id = worker.thread().id();
        TaskRunner {
            sender: Some(sender),
            worker: Some(worker),
            worker_id,
        }
    }

    /// Enqueue a task behind everything submitted before it. Never blocks.
    /// Silently drops the task if the runner has already shut down.
    pub(crate) fn follow(&self, task: impl FnOnce() + Send + 'static) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(Box::new(task));
        }
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        // Closing the sender lets the worker drain the backlog and exit.
        drop(self.sender.take());
        if let Some(worker) = self.worker.take() {
            // A task may own the last handle to the struct that owns this
            // runner; joining the worker from itself would deadlock.
            if thread::current().id() != self.worker_id {
                let _ = worker.join();
            }
        }
    }
}
