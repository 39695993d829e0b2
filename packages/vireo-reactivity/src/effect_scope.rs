use crate::effect::ReactiveEffect;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

thread_local! {
    static ACTIVE_SCOPE: RefCell<Option<EffectScope>> = const { RefCell::new(None) };
}

struct ScopeInner {
    active: Cell<bool>,
    detached: bool,
    effects: RefCell<Vec<ReactiveEffect>>,
    cleanups: RefCell<Vec<Box<dyn FnOnce()>>>,
    parent: Option<Weak<ScopeInner>>,
    scopes: RefCell<Vec<EffectScope>>,
}

/// Owns a group of effects, child scopes and dispose callbacks so they can
/// be stopped together.
#[derive(Clone)]
pub struct EffectScope(Rc<ScopeInner>);

impl EffectScope {
    /// A scope nested in the active scope. A detached scope is not collected
    /// by its parent and has to be stopped on its own.
    pub fn new(detached: bool) -> Self {
        let parent = if detached { None } else { get_current_scope() };
        let scope = Self(Rc::new(ScopeInner {
            active: Cell::new(true),
            detached,
            effects: RefCell::new(Vec::new()),
            cleanups: RefCell::new(Vec::new()),
            parent: parent.as_ref().map(|p| Rc::downgrade(&p.0)),
            scopes: RefCell::new(Vec::new()),
        }));
        if let Some(parent) = parent {
            parent.0.scopes.borrow_mut().push(scope.clone());
        }
        scope
    }

    pub fn is_active(&self) -> bool {
        self.0.active.get()
    }

    pub fn ptr_eq(&self, other: &EffectScope) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Runs `f` with this scope active. Returns `None` for a stopped scope.
    pub fn run<R>(&self, f: impl FnOnce() -> R) -> Option<R> {
        if !self.is_active() {
            tracing::warn!("cannot run an inactive effect scope");
            return None;
        }
        let _guard = ScopeGuard::enter(self.clone());
        Some(f())
    }

    pub fn effect_count(&self) -> usize {
        self.0.effects.borrow().len()
    }

    pub(crate) fn record(&self, effect: &ReactiveEffect) {
        if self.is_active() {
            self.0.effects.borrow_mut().push(effect.clone());
        }
    }

    /// Forgets `effect` without stopping it.
    pub fn remove_effect(&self, effect: &ReactiveEffect) {
        self.0.effects.borrow_mut().retain(|e| !e.ptr_eq(effect));
    }

    pub fn on_dispose(&self, f: impl FnOnce() + 'static) {
        self.0.cleanups.borrow_mut().push(Box::new(f));
    }

    pub fn stop(&self) {
        if !self.0.active.replace(false) {
            return;
        }
        let effects = std::mem::take(&mut *self.0.effects.borrow_mut());
        for effect in effects {
            effect.stop();
        }
        let cleanups = std::mem::take(&mut *self.0.cleanups.borrow_mut());
        for cleanup in cleanups {
            cleanup();
        }
        let scopes = std::mem::take(&mut *self.0.scopes.borrow_mut());
        for scope in scopes {
            scope.stop();
        }
        if !self.0.detached {
            if let Some(parent) = self.0.parent.as_ref().and_then(Weak::upgrade) {
                parent.scopes.borrow_mut().retain(|s| !Rc::ptr_eq(&s.0, &self.0));
            }
        }
    }
}

struct ScopeGuard {
    previous: Option<EffectScope>,
}

impl ScopeGuard {
    fn enter(scope: EffectScope) -> Self {
        let previous = ACTIVE_SCOPE.with(|s| s.borrow_mut().replace(scope));
        Self { previous }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_SCOPE.with(|s| *s.borrow_mut() = previous);
    }
}

pub fn effect_scope(detached: bool) -> EffectScope {
    EffectScope::new(detached)
}

pub fn get_current_scope() -> Option<EffectScope> {
    ACTIVE_SCOPE.with(|s| s.borrow().clone())
}

/// Registers `f` to run when the active scope stops.
pub fn on_scope_dispose(f: impl FnOnce() + 'static) {
    match get_current_scope() {
        Some(scope) => scope.on_dispose(f),
        None => tracing::warn!(
            "on_scope_dispose() is called when there is no active effect scope to be associated with"
        ),
    }
}

/// Records `effect` in `scope`, or in the active scope when `scope` is `None`.
pub fn record_effect_scope(effect: &ReactiveEffect, scope: Option<&EffectScope>) {
    match scope {
        Some(scope) => scope.record(effect),
        None => {
            if let Some(scope) = get_current_scope() {
                scope.record(effect);
            }
        }
    }
}
