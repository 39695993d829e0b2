use crate::dependency::Dep;
use crate::effect::ReactiveEffect;
use crate::refs::{track_ref_value, trigger_ref_value, Ref, RefImpl};
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

pub(crate) struct ComputedRefImpl {
    dep: Rc<Dep>,
    value: RefCell<Value>,
    dirty: Cell<bool>,
    cacheable: bool,
    effect: ReactiveEffect,
    setter: Option<Box<dyn Fn(Value)>>,
}

impl ComputedRefImpl {
    fn new<F, R>(getter: F, setter: Option<Box<dyn Fn(Value)>>, cacheable: bool) -> Rc<Self>
    where
        F: Fn() -> R + 'static,
        R: Into<Value>,
    {
        Rc::new_cyclic(|this: &std::rc::Weak<Self>| {
            let this = this.clone();
            let effect = ReactiveEffect::new(getter).with_scheduler(move || {
                let Some(this) = this.upgrade() else {
                    return;
                };
                if !this.dirty.get() {
                    this.dirty.set(true);
                    trigger_ref_value(&this.dep, None);
                }
            });
            effect.mark_computed();
            effect.set_active(cacheable);
            Self {
                dep: Dep::new(),
                value: RefCell::new(Value::Undefined),
                dirty: Cell::new(true),
                cacheable,
                effect,
                setter,
            }
        })
    }

    fn value(&self) -> Value {
        track_ref_value(&self.dep);
        if self.dirty.get() || !self.cacheable {
            self.dirty.set(false);
            let value = self.effect.run();
            *self.value.borrow_mut() = value;
        }
        self.value.borrow().clone()
    }
}

impl RefImpl for ComputedRefImpl {
    fn get(&self) -> Value {
        self.value()
    }

    fn set(&self, value: Value) {
        match &self.setter {
            Some(setter) => setter(value),
            None => tracing::warn!("write operation failed: computed value is readonly"),
        }
    }

    fn dep(&self) -> Option<Rc<Dep>> {
        Some(self.dep.clone())
    }

    fn is_readonly(&self) -> bool {
        self.setter.is_none()
    }
}

impl Drop for ComputedRefImpl {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

/// A lazily evaluated, cached derived value.
///
/// The getter only re-runs when it is read after one of its dependencies
/// changed. A computed cell is also a ref: [`Computed::to_ref`] hands out a
/// [`Ref`] sharing the same cell.
#[derive(Clone)]
pub struct Computed(Rc<ComputedRefImpl>);

impl Computed {
    /// A computed that recomputes on every read and never caches.
    pub fn uncached<F, R>(getter: F) -> Self
    where
        F: Fn() -> R + 'static,
        R: Into<Value>,
    {
        Self(ComputedRefImpl::new(getter, None, false))
    }

    pub fn get(&self) -> Value {
        self.0.value()
    }

    pub fn set(&self, value: impl Into<Value>) {
        RefImpl::set(&*self.0, value.into());
    }

    pub fn is_dirty(&self) -> bool {
        self.0.dirty.get()
    }

    pub fn effect(&self) -> &ReactiveEffect {
        &self.0.effect
    }

    pub fn to_ref(&self) -> Ref {
        Ref(self.0.clone() as Rc<dyn RefImpl>)
    }
}

impl From<Computed> for Value {
    fn from(c: Computed) -> Self {
        Value::Ref(c.to_ref())
    }
}

impl fmt::Debug for Computed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("dirty", &self.0.dirty.get())
            .field("value", &self.0.value.borrow())
            .finish()
    }
}

pub fn computed<F, R>(getter: F) -> Computed
where
    F: Fn() -> R + 'static,
    R: Into<Value>,
{
    Computed(ComputedRefImpl::new(getter, None, true))
}

/// A computed whose writes are forwarded to `setter`.
pub fn writable_computed<F, R, S>(getter: F, setter: S) -> Computed
where
    F: Fn() -> R + 'static,
    R: Into<Value>,
    S: Fn(Value) + 'static,
{
    Computed(ComputedRefImpl::new(getter, Some(Box::new(setter)), true))
}
