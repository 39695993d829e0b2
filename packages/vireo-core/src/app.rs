use crate::component::{Component, ProvideScope};
use crate::host::{HostNode, HostOps};
use crate::renderer::Renderer;
use crate::vnode::{h_component, Props, VNode};
use std::cell::RefCell;
use std::rc::Rc;
use vireo_reactivity::Value;
use vireo_scheduler::{set_error_handler, set_warn_handler, warn, ErrorHandler, WarnHandler};

/// Per-app settings. The handlers are installed for the lifetime of the
/// mounted app.
#[derive(Clone, Default)]
pub struct AppConfig {
    pub error_handler: Option<ErrorHandler>,
    pub warn_handler: Option<WarnHandler>,
}

struct AppContextInner {
    config: RefCell<AppConfig>,
    provides: Rc<ProvideScope>,
}

/// State shared by every component of one mounted tree.
#[derive(Clone)]
pub struct AppContext(Rc<AppContextInner>);

impl AppContext {
    pub fn new() -> Self {
        Self(Rc::new(AppContextInner {
            config: RefCell::new(AppConfig::default()),
            provides: ProvideScope::new(None),
        }))
    }

    pub fn config(&self) -> AppConfig {
        self.0.config.borrow().clone()
    }

    pub(crate) fn provides(&self) -> Rc<ProvideScope> {
        self.0.provides.clone()
    }

    pub fn ptr_eq(&self, other: &AppContext) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new()
    }
}

struct Mounted {
    unmount: Box<dyn Fn()>,
    previous_handlers: (Option<ErrorHandler>, Option<WarnHandler>),
}

/// A root component plus the context it is mounted with.
pub struct App {
    root: Component,
    root_props: Props,
    context: AppContext,
    mounted: RefCell<Option<Mounted>>,
}

pub fn create_app(root: &Component) -> App {
    App {
        root: root.clone(),
        root_props: Props::new(),
        context: AppContext::new(),
        mounted: RefCell::new(None),
    }
}

impl App {
    pub fn with_prop(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.root_props.insert(Rc::from(name), value.into());
        self
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn on_error(&self, handler: impl Fn(&vireo_scheduler::RuntimeError) + 'static) -> &Self {
        self.context.0.config.borrow_mut().error_handler = Some(Rc::new(handler));
        self
    }

    pub fn on_warn(&self, handler: impl Fn(&str) + 'static) -> &Self {
        self.context.0.config.borrow_mut().warn_handler = Some(Rc::new(handler));
        self
    }

    /// App-level provide, visible to every component.
    pub fn provide(&self, key: &str, value: impl Into<Value>) -> &Self {
        self.context.0.provides.insert(Rc::from(key), value.into());
        self
    }

    pub fn is_mounted(&self) -> bool {
        self.mounted.borrow().is_some()
    }

    /// Renders the root component into `container` and returns the root
    /// vnode. Mounting twice is refused with a warning.
    pub fn mount<H: HostOps + 'static>(
        &self,
        renderer: &Renderer<H>,
        container: HostNode,
    ) -> Option<VNode> {
        if self.is_mounted() {
            warn("app has already been mounted; create a new app to mount again");
            return None;
        }
        let config = self.context.config();
        let previous_handlers = (
            set_error_handler(config.error_handler),
            set_warn_handler(config.warn_handler),
        );

        let mut root = h_component(&self.root);
        for (name, value) in &self.root_props {
            root = root.prop(name, value.clone());
        }
        let root = root.build();
        root.set_app_context(Some(self.context.clone()));
        tracing::debug!(component = self.root.name(), "mounting app");
        renderer.render(Some(&root), container);

        let renderer = renderer.clone();
        *self.mounted.borrow_mut() = Some(Mounted {
            unmount: Box::new(move || renderer.render(None, container)),
            previous_handlers,
        });
        Some(root)
    }

    /// Unmounts the tree and restores the handlers that were installed
    /// before [`App::mount`].
    pub fn unmount(&self) {
        let Some(mounted) = self.mounted.borrow_mut().take() else {
            warn("cannot unmount an app that is not mounted");
            return;
        };
        (mounted.unmount)();
        let (error_handler, warn_handler) = mounted.previous_handlers;
        set_error_handler(error_handler);
        set_warn_handler(warn_handler);
    }
}
