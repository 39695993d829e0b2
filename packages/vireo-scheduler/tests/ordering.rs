use std::cell::RefCell;
use std::rc::Rc;
use vireo_scheduler::{
    flush_pre_flush_cbs, invalidate_job, queue_job, queue_post_flush_cb, run_microtasks, Job,
};

type Log = Rc<RefCell<Vec<&'static str>>>;

fn logging_job(log: &Log, name: &'static str) -> Job {
    let log = log.clone();
    Job::new(move || log.borrow_mut().push(name))
}

#[test]
fn test_jobs_run_by_id() {
    let log = Log::default();
    queue_job(&logging_job(&log, "2").with_id(2));
    queue_job(&logging_job(&log, "1").with_id(1));
    queue_job(&logging_job(&log, "none"));
    queue_job(&logging_job(&log, "0").with_id(0));

    // Nothing runs until the microtask queue is drained.
    assert!(log.borrow().is_empty());
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["0", "1", "2", "none"]);
}

#[test]
fn test_pre_job_runs_before_same_id() {
    let log = Log::default();
    queue_job(&logging_job(&log, "render").with_id(1));
    queue_job(&logging_job(&log, "pre").with_id(1).with_pre(true));
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["pre", "render"]);
}

#[test]
fn test_duplicate_job_runs_once() {
    let log = Log::default();
    let job = logging_job(&log, "job");
    queue_job(&job);
    queue_job(&job);
    queue_job(&job.clone());
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["job"]);
}

#[test]
fn test_post_callbacks_run_after_queue_sorted_and_deduped() {
    let log = Log::default();
    let post_b = logging_job(&log, "post-b").with_id(5);
    let post_a = logging_job(&log, "post-a").with_id(1);
    queue_post_flush_cb(&post_b);
    queue_post_flush_cb(&post_a);
    queue_post_flush_cb(&post_b);
    queue_job(&logging_job(&log, "job"));
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["job", "post-a", "post-b"]);
}

#[test]
fn test_job_queued_during_flush_joins_it() {
    let log = Log::default();
    let late = logging_job(&log, "late").with_id(3);
    let first = {
        let log = log.clone();
        let late = late.clone();
        Job::new(move || {
            log.borrow_mut().push("first");
            queue_job(&late);
        })
        .with_id(1)
    };
    queue_job(&first);
    queue_job(&logging_job(&log, "second").with_id(2));
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["first", "second", "late"]);
}

#[test]
fn test_post_callback_queueing_job_triggers_another_pass() {
    let log = Log::default();
    let job = logging_job(&log, "job");
    let post = {
        let log = log.clone();
        let job = job.clone();
        Job::new(move || {
            log.borrow_mut().push("post");
            queue_job(&job);
        })
    };
    queue_post_flush_cb(&post);
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["post", "job"]);
}

#[test]
fn test_inactive_and_invalidated_jobs_are_skipped() {
    let log = Log::default();
    let inactive = logging_job(&log, "inactive");
    let invalidated = logging_job(&log, "invalidated");
    queue_job(&inactive);
    queue_job(&invalidated);
    queue_job(&logging_job(&log, "kept"));
    inactive.set_active(false);
    invalidate_job(&invalidated);
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["kept"]);
}

#[test]
fn test_flush_pre_flush_cbs_for_one_owner() {
    let log = Log::default();
    queue_job(&logging_job(&log, "pre-1").with_id(1).with_pre(true));
    queue_job(&logging_job(&log, "pre-2").with_id(2).with_pre(true));
    queue_job(&logging_job(&log, "render-1").with_id(1));

    flush_pre_flush_cbs(Some(2));
    assert_eq!(*log.borrow(), vec!["pre-2"]);

    run_microtasks();
    assert_eq!(*log.borrow(), vec!["pre-2", "pre-1", "render-1"]);
}
