use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

struct JobInner {
    func: Box<dyn Fn()>,
    id: Cell<Option<u32>>,
    pre: Cell<bool>,
    active: Cell<bool>,
    allow_recurse: Cell<bool>,
}

/// A unit of deferred work.
///
/// Lower ids run first; a job without an id runs after every job that has
/// one. Among jobs sharing an id, pre-phase jobs run first. Identity is the
/// allocation, so cloning a `Job` yields the same job for dedup purposes.
#[derive(Clone)]
pub struct Job(Rc<JobInner>);

impl Job {
    pub fn new(f: impl Fn() + 'static) -> Self {
        Self(Rc::new(JobInner {
            func: Box::new(f),
            id: Cell::new(None),
            pre: Cell::new(false),
            active: Cell::new(true),
            allow_recurse: Cell::new(false),
        }))
    }

    pub fn with_id(self, id: u32) -> Self {
        self.0.id.set(Some(id));
        self
    }

    pub fn with_pre(self, pre: bool) -> Self {
        self.0.pre.set(pre);
        self
    }

    pub fn id(&self) -> Option<u32> {
        self.0.id.get()
    }

    pub fn set_id(&self, id: Option<u32>) {
        self.0.id.set(id);
    }

    pub fn is_pre(&self) -> bool {
        self.0.pre.get()
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    /// Inactive jobs stay queued but are skipped when their turn comes.
    pub fn set_active(&self, active: bool) {
        self.0.active.set(active);
    }

    pub fn allow_recurse(&self) -> bool {
        self.0.allow_recurse.get()
    }

    pub fn set_allow_recurse(&self, allow: bool) {
        self.0.allow_recurse.set(allow);
    }

    pub fn run(&self) {
        (self.0.func)();
    }

    pub fn ptr_eq(&self, other: &Job) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Ordering key: by id, with id-less jobs last.
    pub(crate) fn sort_id(&self) -> u64 {
        self.id().map_or(u64::MAX, u64::from)
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Job {}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.id())
            .field("pre", &self.is_pre())
            .field("active", &self.is_active())
            .finish()
    }
}
