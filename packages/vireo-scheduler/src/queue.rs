use std::cell::RefCell;
use std::collections::VecDeque;

/// A FIFO queue of one-shot tasks.
/// The scheduler is single-threaded, so a RefCell<VecDeque> is enough.
#[derive(Default)]
pub struct TaskQueue {
    queue: RefCell<VecDeque<Box<dyn FnOnce()>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
        }
    }

    pub fn push(&self, task: Box<dyn FnOnce()>) {
        self.queue.borrow_mut().push_back(task);
    }

    pub fn pop(&self) -> Option<Box<dyn FnOnce()>> {
        self.queue.borrow_mut().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    /// Runs tasks until the queue is empty, including tasks queued by the
    /// tasks themselves. Returns how many ran.
    pub fn drain(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop() {
            task();
            ran += 1;
        }
        ran
    }
}

thread_local! {
    static MICROTASKS: TaskQueue = TaskQueue::new();
}

/// Queues a task to run at the end of the current turn, when the host calls
/// [`run_microtasks`].
pub fn queue_microtask(task: impl FnOnce() + 'static) {
    MICROTASKS.with(|q| q.push(Box::new(task)));
}

/// Drains the microtask queue of this thread. Hosts call this once their
/// synchronous work for a turn is done.
pub fn run_microtasks() -> usize {
    MICROTASKS.with(TaskQueue::drain)
}

pub fn has_pending_microtasks() -> bool {
    MICROTASKS.with(|q| !q.is_empty())
}
