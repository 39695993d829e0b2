pub mod error;
pub mod job;
pub mod queue;
pub mod scheduler;

pub use error::{
    call_with_error_handling, handle_error, set_error_handler, set_warn_handler, warn, ErrorCode,
    ErrorHandler, RuntimeError, WarnHandler,
};
pub use job::Job;
pub use queue::{has_pending_microtasks, queue_microtask, run_microtasks, TaskQueue};
pub use scheduler::{
    flush_jobs, flush_post_flush_cbs, flush_pre_flush_cbs, invalidate_job, is_flush_pending,
    is_flushing, next_tick, next_tick_then, queue_job, queue_post_flush_cb,
    queue_post_flush_cbs, queued_job_count, NextTick, RECURSION_LIMIT,
};
