//! The job queue.
//!
//! Jobs are deduplicated, kept sorted by id and flushed from a microtask,
//! so any number of synchronous mutations in one turn produce one flush.
//! A flush runs the main queue, then the post-flush callbacks, and repeats
//! until both are empty.

use crate::error::{call_with_error_handling, warn, ErrorCode, RuntimeError};
use crate::job::Job;
use crate::queue::queue_microtask;
use futures::channel::oneshot;
use futures::FutureExt;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// How many times one job may run within a single flush.
pub const RECURSION_LIMIT: u32 = 100;

#[derive(Default)]
struct SchedulerState {
    queue: Vec<Job>,
    flush_index: usize,
    is_flushing: bool,
    is_flush_pending: bool,
    pending_post: Vec<Job>,
    active_post: Option<Vec<Job>>,
    post_flush_index: usize,
    after_flush: Vec<Box<dyn FnOnce()>>,
}

thread_local! {
    static STATE: RefCell<SchedulerState> = RefCell::new(SchedulerState::default());
}

fn with_state<R>(f: impl FnOnce(&mut SchedulerState) -> R) -> R {
    STATE.with(|s| f(&mut s.borrow_mut()))
}

/// Invocation counts per job for the current flush.
type Seen = FxHashMap<usize, u32>;

fn check_recursive_updates(seen: &mut Seen, job: &Job) -> bool {
    let count = seen.entry(job.addr()).or_insert(0);
    if *count > RECURSION_LIMIT {
        warn(RuntimeError::RecursionLimit {
            limit: RECURSION_LIMIT,
        });
        return true;
    }
    *count += 1;
    false
}

/// Binary search for the slot that keeps ids ascending. Pre-phase jobs with
/// the same id stay in front of the incoming job.
fn find_insertion_index(s: &SchedulerState, id: u32) -> usize {
    let id = u64::from(id);
    let mut start = if s.is_flushing {
        (s.flush_index + 1).min(s.queue.len())
    } else {
        0
    };
    let mut end = s.queue.len();
    while start < end {
        let middle = (start + end) / 2;
        let middle_job = &s.queue[middle];
        let middle_id = middle_job.sort_id();
        if middle_id < id || (middle_id == id && middle_job.is_pre()) {
            start = middle + 1;
        } else {
            end = middle;
        }
    }
    start
}

fn compare_jobs(a: &Job, b: &Job) -> std::cmp::Ordering {
    a.sort_id()
        .cmp(&b.sort_id())
        .then_with(|| b.is_pre().cmp(&a.is_pre()))
}

/// Queues `job` unless it is already waiting to run. The job currently
/// running counts as waiting unless it allows recursion.
pub fn queue_job(job: &Job) {
    let queued = with_state(|s| {
        let start = if s.is_flushing && job.allow_recurse() {
            s.flush_index + 1
        } else {
            s.flush_index
        };
        if s.queue.iter().skip(start).any(|j| j.ptr_eq(job)) {
            return false;
        }
        match job.id() {
            None => s.queue.push(job.clone()),
            Some(id) => {
                let at = find_insertion_index(s, id);
                s.queue.insert(at, job.clone());
            }
        }
        true
    });
    if queued {
        queue_flush();
    }
}

fn queue_flush() {
    let schedule = with_state(|s| {
        if s.is_flushing || s.is_flush_pending {
            return false;
        }
        s.is_flush_pending = true;
        true
    });
    if schedule {
        queue_microtask(flush_jobs);
    }
}

/// Removes a job that has not run yet in the current flush.
pub fn invalidate_job(job: &Job) {
    with_state(|s| {
        if let Some(i) = s.queue.iter().position(|j| j.ptr_eq(job)) {
            if !s.is_flushing || i > s.flush_index {
                s.queue.remove(i);
            }
        }
    });
}

/// Queues a callback for after the main queue. Deduplicated against the
/// callbacks of a post flush that is already running.
pub fn queue_post_flush_cb(job: &Job) {
    with_state(|s| {
        let start = if job.allow_recurse() {
            s.post_flush_index + 1
        } else {
            s.post_flush_index
        };
        let running = s
            .active_post
            .as_ref()
            .is_some_and(|active| active.iter().skip(start).any(|j| j.ptr_eq(job)));
        if !running {
            s.pending_post.push(job.clone());
        }
    });
    queue_flush();
}

/// Queues a batch of post callbacks as is.
pub fn queue_post_flush_cbs(jobs: impl IntoIterator<Item = Job>) {
    with_state(|s| s.pending_post.extend(jobs));
    queue_flush();
}

/// Runs queued pre-phase jobs right away. With `owner`, only the jobs whose
/// id matches run (a component flushing its own watchers before render).
pub fn flush_pre_flush_cbs(owner: Option<u32>) {
    let mut seen = Seen::default();
    let mut i = with_state(|s| if s.is_flushing { s.flush_index + 1 } else { 0 });
    loop {
        let next = with_state(|s| {
            while i < s.queue.len() {
                let job = &s.queue[i];
                if job.is_pre() && owner.is_none_or(|uid| job.id() == Some(uid)) {
                    return Some(job.clone());
                }
                i += 1;
            }
            None
        });
        let Some(job) = next else {
            break;
        };
        // Warnings reach user handlers, so the check runs outside the borrow.
        if check_recursive_updates(&mut seen, &job) {
            i += 1;
            continue;
        }
        with_state(|s| {
            if let Some(pos) = s.queue.iter().position(|j| j.ptr_eq(&job)) {
                s.queue.remove(pos);
            }
        });
        if job.is_active() {
            call_with_error_handling(ErrorCode::SchedulerJob, || job.run());
        }
    }
}

/// Runs pending post-flush callbacks, sorted by id. When a post flush is
/// already running, the new callbacks join it instead.
pub fn flush_post_flush_cbs() {
    flush_post_flush_cbs_with(&mut Seen::default());
}

fn flush_post_flush_cbs_with(seen: &mut Seen) {
    let started = with_state(|s| {
        if s.pending_post.is_empty() {
            return false;
        }
        let mut ids = FxHashSet::default();
        let deduped: Vec<Job> = s
            .pending_post
            .drain(..)
            .filter(|job| ids.insert(job.addr()))
            .collect();
        if let Some(active) = s.active_post.as_mut() {
            active.extend(deduped);
            return false;
        }
        let mut deduped = deduped;
        deduped.sort_by_key(Job::sort_id);
        s.active_post = Some(deduped);
        s.post_flush_index = 0;
        true
    });
    if !started {
        return;
    }
    loop {
        let job = with_state(|s| {
            s.active_post
                .as_ref()
                .and_then(|active| active.get(s.post_flush_index).cloned())
        });
        let Some(job) = job else {
            break;
        };
        if job.is_active() && !check_recursive_updates(seen, &job) {
            call_with_error_handling(ErrorCode::SchedulerJob, || job.run());
        }
        with_state(|s| s.post_flush_index += 1);
    }
    with_state(|s| {
        s.active_post = None;
        s.post_flush_index = 0;
    });
}

/// Drains the queue and the post callbacks until both are empty. Normally
/// runs from the microtask queued by the first [`queue_job`] of a turn.
pub fn flush_jobs() {
    let already_flushing = with_state(|s| {
        if s.is_flushing {
            return true;
        }
        s.is_flush_pending = false;
        s.is_flushing = true;
        false
    });
    if already_flushing {
        return;
    }

    let mut seen = Seen::default();
    let mut passes = 0u32;
    loop {
        passes += 1;
        with_state(|s| {
            s.queue.sort_by(compare_jobs);
            s.flush_index = 0;
        });
        loop {
            let job = with_state(|s| s.queue.get(s.flush_index).cloned());
            let Some(job) = job else {
                break;
            };
            if job.is_active() && !check_recursive_updates(&mut seen, &job) {
                call_with_error_handling(ErrorCode::SchedulerJob, || job.run());
            }
            with_state(|s| s.flush_index += 1);
        }
        with_state(|s| {
            s.flush_index = 0;
            s.queue.clear();
        });
        flush_post_flush_cbs_with(&mut seen);

        let more = with_state(|s| !s.queue.is_empty() || !s.pending_post.is_empty());
        if !more {
            break;
        }
    }
    tracing::debug!(passes, "scheduler flush complete");

    let callbacks = with_state(|s| {
        s.is_flushing = false;
        std::mem::take(&mut s.after_flush)
    });
    for callback in callbacks {
        queue_microtask(move || {
            call_with_error_handling(ErrorCode::SchedulerFlush, callback);
        });
    }
}

pub fn is_flushing() -> bool {
    with_state(|s| s.is_flushing)
}

pub fn is_flush_pending() -> bool {
    with_state(|s| s.is_flush_pending)
}

/// Number of jobs waiting in the main queue.
pub fn queued_job_count() -> usize {
    with_state(|s| s.queue.len().saturating_sub(s.flush_index))
}

/// Runs `f` after the pending (or running) flush, or on the next microtask
/// when nothing is scheduled.
pub fn next_tick_then(f: impl FnOnce() + 'static) {
    let now = with_state(|s| {
        if s.is_flush_pending || s.is_flushing {
            s.after_flush.push(Box::new(f));
            None
        } else {
            Some(f)
        }
    });
    if let Some(f) = now {
        queue_microtask(move || {
            call_with_error_handling(ErrorCode::SchedulerFlush, f);
        });
    }
}

/// Resolves once the pending flush has run.
pub struct NextTick {
    rx: oneshot::Receiver<()>,
}

impl Future for NextTick {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.rx.poll_unpin(cx).map(|_| ())
    }
}

pub fn next_tick() -> NextTick {
    let (tx, rx) = oneshot::channel();
    next_tick_then(move || {
        let _ = tx.send(());
    });
    NextTick { rx }
}
