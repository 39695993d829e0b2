use futures::FutureExt;
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use vireo_scheduler::{
    flush_pre_flush_cbs, has_pending_microtasks, is_flush_pending, next_tick, next_tick_then,
    queue_job, queue_microtask, run_microtasks, set_error_handler, set_warn_handler, Job,
    RuntimeError, ErrorCode, RECURSION_LIMIT,
};

#[test]
fn test_microtask_chaining() {
    // Microtasks queued by microtasks run in the same drain.
    let log = Rc::new(RefCell::new(Vec::new()));
    {
        let log = log.clone();
        queue_microtask(move || {
            log.borrow_mut().push("task1");
            let log = log.clone();
            queue_microtask(move || log.borrow_mut().push("task2"));
        });
    }
    assert!(has_pending_microtasks());
    assert_eq!(run_microtasks(), 2);
    assert!(!has_pending_microtasks());
    assert_eq!(*log.borrow(), vec!["task1", "task2"]);
}

#[test]
fn test_one_flush_per_turn() {
    let runs = Rc::new(Cell::new(0));
    let job = {
        let runs = runs.clone();
        Job::new(move || runs.set(runs.get() + 1))
    };
    assert!(!is_flush_pending());
    queue_job(&job);
    assert!(is_flush_pending());
    queue_job(&job);
    // One flush microtask plus nothing else.
    assert_eq!(run_microtasks(), 1);
    assert_eq!(runs.get(), 1);
    assert!(!is_flush_pending());
}

#[test]
fn test_next_tick_resolves_after_flush() {
    let log = Rc::new(RefCell::new(Vec::new()));
    {
        let log = log.clone();
        queue_job(&Job::new(move || log.borrow_mut().push("job")));
    }
    let tick = next_tick();
    {
        let log = log.clone();
        next_tick_then(move || log.borrow_mut().push("after"));
    }
    run_microtasks();
    assert_eq!(*log.borrow(), vec!["job", "after"]);
    assert_eq!(tick.now_or_never(), Some(()));
}

#[test]
fn test_next_tick_without_pending_flush() {
    let tick = next_tick();
    run_microtasks();
    assert_eq!(tick.now_or_never(), Some(()));
}

#[test]
fn test_panicking_job_is_reported_and_flush_continues() {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let previous = set_error_handler(Some(Rc::new({
        let errors = errors.clone();
        move |err: &RuntimeError| errors.borrow_mut().push(err.clone())
    })));

    let ran = Rc::new(Cell::new(false));
    queue_job(&Job::new(|| panic!("boom")).with_id(1));
    {
        let ran = ran.clone();
        queue_job(&Job::new(move || ran.set(true)).with_id(2));
    }
    run_microtasks();
    set_error_handler(previous);

    assert!(ran.get());
    assert_eq!(
        *errors.borrow(),
        vec![RuntimeError::Callback {
            code: ErrorCode::SchedulerJob,
            message: "boom".to_string(),
        }]
    );
}

#[test]
fn test_panicking_after_flush_callback_is_reported() {
    let codes = Rc::new(RefCell::new(Vec::new()));
    let previous = set_error_handler(Some(Rc::new({
        let codes = codes.clone();
        move |err: &RuntimeError| codes.borrow_mut().push(err.code())
    })));

    let ran = Rc::new(Cell::new(false));
    queue_job(&Job::new(|| {}));
    next_tick_then(|| panic!("tick failed"));
    {
        let ran = ran.clone();
        next_tick_then(move || ran.set(true));
    }
    run_microtasks();
    set_error_handler(previous);

    assert!(ran.get());
    assert_eq!(*codes.borrow(), vec![Some(ErrorCode::SchedulerFlush)]);
}

#[test]
fn test_self_requeueing_job_hits_recursion_limit() {
    let runs = Rc::new(Cell::new(0u32));
    let job: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
    let this = {
        let runs = runs.clone();
        let job = job.clone();
        Job::new(move || {
            runs.set(runs.get() + 1);
            if let Some(me) = job.borrow().as_ref() {
                queue_job(me);
            }
        })
    };
    this.set_allow_recurse(true);
    *job.borrow_mut() = Some(this.clone());

    queue_job(&this);
    run_microtasks();
    assert_eq!(runs.get(), RECURSION_LIMIT + 1);

    // Break the cycle so the job can be dropped.
    job.borrow_mut().take();
}

#[test]
fn test_recursion_warning_handler_can_queue_work() {
    let warnings = Rc::new(Cell::new(0u32));
    let follow_up_ran = Rc::new(Cell::new(false));
    let follow_up = {
        let ran = follow_up_ran.clone();
        Job::new(move || ran.set(true))
    };
    let previous = set_warn_handler(Some(Rc::new({
        let warnings = warnings.clone();
        let follow_up = follow_up.clone();
        move |_: &str| {
            warnings.set(warnings.get() + 1);
            queue_job(&follow_up);
        }
    })));

    let runs = Rc::new(Cell::new(0u32));
    let job: Rc<RefCell<Option<Job>>> = Rc::new(RefCell::new(None));
    let this = {
        let runs = runs.clone();
        let job = job.clone();
        Job::new(move || {
            runs.set(runs.get() + 1);
            if let Some(me) = job.borrow().as_ref() {
                queue_job(me);
            }
        })
        .with_pre(true)
    };
    *job.borrow_mut() = Some(this.clone());

    queue_job(&this);
    flush_pre_flush_cbs(None);
    assert_eq!(runs.get(), RECURSION_LIMIT + 1);
    assert_eq!(warnings.get(), 1);

    job.borrow_mut().take();
    run_microtasks();
    set_warn_handler(previous);
    assert!(follow_up_ran.get());
}
