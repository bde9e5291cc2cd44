//! Handler registry: maps server push kinds to handlers for the command
//! layer.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::types::DisconnectReason;

/// Handles one kind of server push (`["kind", ...args]`).
///
/// Implemented for any `Fn(Vec<Value>) + Send + Sync` closure; the
/// [`HandlerRegistry::on`] shorthand takes such closures directly.
///
/// # Example
///
/// ```rust,no_run
/// use rws_client::HandlerRegistry;
///
/// let reg = HandlerRegistry::new()
///     .on("notification", |args| println!("notification: {args:?}"))
///     .on("kept", |args| println!("kept {} pages", args.len()));
/// ```
pub trait PushHandler: Send + Sync + 'static {
    fn handle(&self, args: Vec<Value>);
}

impl<F> PushHandler for F
where
    F: Fn(Vec<Value>) + Send + Sync + 'static,
{
    fn handle(&self, args: Vec<Value>) {
        self(args)
    }
}

type ConnectHook = Arc<dyn Fn() + Send + Sync>;
type DisconnectHook = Arc<dyn Fn(DisconnectReason, Option<Duration>) + Send + Sync>;

/// Registry of push handlers plus optional lifecycle hooks.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn PushHandler>>,
    on_connect: Option<ConnectHook>,
    on_disconnect: Option<DisconnectHook>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a closure for `kind`.  Replaces any existing handler for
    /// the same kind.  Kinds are matched exactly.
    pub fn on<F>(mut self, kind: impl Into<String>, f: F) -> Self
    where
        F: Fn(Vec<Value>) + Send + Sync + 'static,
    {
        self.register(kind, f);
        self
    }

    /// Register any [`PushHandler`] implementation for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, handler: impl PushHandler) {
        self.handlers.insert(kind.into(), Arc::new(handler));
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connect = Some(Arc::new(f));
        self
    }

    pub fn on_disconnect(
        mut self,
        f: impl Fn(DisconnectReason, Option<Duration>) + Send + Sync + 'static,
    ) -> Self {
        self.on_disconnect = Some(Arc::new(f));
        self
    }

    pub fn get(&self, kind: &str) -> Option<&Arc<dyn PushHandler>> {
        self.handlers.get(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn connected(&self) {
        if let Some(f) = &self.on_connect {
            f();
        }
    }

    pub(crate) fn disconnected(&self, reason: DisconnectReason, waited: Option<Duration>) {
        if let Some(f) = &self.on_disconnect {
            f(reason, waited);
        }
    }
}
