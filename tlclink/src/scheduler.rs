use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use crate::command::{Command, Priority};
use crate::error::Shutdown;

#[derive(Default)]
struct Queues {
    high: VecDeque<Command>,
    low: VecDeque<Command>,
    closed: bool,
}

impl Queues {
    fn pop(&mut self) -> Option<Command> {
        self.high.pop_front().or_else(|| self.low.pop_front())
    }

    fn len(&self) -> usize {
        self.high.len() + self.low.len()
    }
}

struct Inner {
    queues: Mutex<Queues>,
    notify: Notify,
}

/// Two-tier FIFO of commands waiting for the transport
///
/// Every `High` command drains before any `Low` command; within a tier commands
/// drain in the order they were enqueued. Clones share the same queues.
#[derive(Clone)]
pub(crate) struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                queues: Mutex::new(Queues::default()),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queues> {
        // the queues are always left consistent, so a poisoned lock is still usable
        self.inner
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// add a command to the back of its tier, returning false once closed
    pub(crate) fn enqueue(&self, command: Command) -> bool {
        {
            let mut queues = self.lock();
            if queues.closed {
                return false;
            }
            match command.priority {
                Priority::High => queues.high.push_back(command),
                Priority::Low => queues.low.push_back(command),
            }
        }
        self.inner.notify.notify_one();
        true
    }

    /// remove the next command without waiting
    pub(crate) fn try_dequeue(&self) -> Option<Command> {
        self.lock().pop()
    }

    /// wait for the next command, failing once the scheduler is closed and empty
    pub(crate) async fn dequeue(&self) -> Result<Command, Shutdown> {
        loop {
            {
                let mut queues = self.lock();
                if let Some(command) = queues.pop() {
                    return Ok(command);
                }
                if queues.closed {
                    return Err(Shutdown);
                }
            }
            // a permit stored by enqueue/close while the lock was released
            // wakes this immediately
            self.inner.notify.notified().await;
        }
    }

    /// drop every pending command, returning how many were discarded
    pub(crate) fn clear(&self) -> usize {
        let mut queues = self.lock();
        let count = queues.len();
        queues.high = VecDeque::new();
        queues.low = VecDeque::new();
        count
    }

    /// refuse new commands and wake the consumer once the queue drains
    pub(crate) fn close(&self) {
        self.lock().closed = true;
        self.inner.notify.notify_one();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.lock().len() == 0
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
