//! The dispatcher: route registration and the per-request pipeline.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::Uri;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Binding, BindingTable, Context, CookieScope, Request, RequestHandle, Response};
use crate::observability::{Monitor, SpanId, SpanTracker};
use crate::routing::{
    Continuation, Control, Handler, LegacyHandler, MethodMask, Phase, RouteTable, Target,
};
use crate::session::{RequestScopedBackend, Session, SessionBackend};
use crate::Result;

/// Dispatcher settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Stripped from the request path before matching.
    pub prefix: String,
    /// Scope for cookies set through [`Context::set_cookie`].
    pub cookie: CookieScope,
    /// Requests slower than this are logged. `None` disables the check.
    pub slow_threshold: Option<Duration>,
    pub filters_enabled: bool,
    pub handlers_enabled: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            cookie: CookieScope::default(),
            slow_threshold: None,
            filters_enabled: true,
            handlers_enabled: true,
        }
    }
}

impl DispatchConfig {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }
}

/// Where a request is in its pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Filters,
    Handlers,
    Done,
}

/// Routes requests through ordered filters and handlers with a session
/// bound to each request.
///
/// Registration takes `&mut self`, so routes are fixed once the dispatcher
/// is shared. Dispatching only needs `&self`.
pub struct Dispatcher {
    config: DispatchConfig,
    cookie_scope: Arc<CookieScope>,
    routes: RouteTable,
    backend: Arc<dyn SessionBackend>,
    bindings: Arc<BindingTable>,
    tracker: Option<Arc<dyn SpanTracker>>,
}

impl Dispatcher {
    /// Dispatcher with throwaway per-request sessions.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_backend(prefix, Arc::new(RequestScopedBackend::new()))
    }

    pub fn with_backend(prefix: impl Into<String>, backend: Arc<dyn SessionBackend>) -> Self {
        Self::from_config(DispatchConfig::new(prefix), backend)
    }

    pub fn from_config(config: DispatchConfig, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            cookie_scope: Arc::new(config.cookie.clone()),
            config,
            routes: RouteTable::new(),
            backend,
            bindings: Arc::new(BindingTable::new()),
            tracker: None,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn SessionBackend> {
        &self.backend
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn set_filters_enabled(&mut self, enabled: bool) {
        self.config.filters_enabled = enabled;
    }

    pub fn set_handlers_enabled(&mut self, enabled: bool) {
        self.config.handlers_enabled = enabled;
    }

    pub fn set_slow_threshold(&mut self, threshold: Option<Duration>) {
        self.config.slow_threshold = threshold;
    }

    pub fn set_cookie_scope(&mut self, domain: impl Into<String>, path: impl Into<String>) {
        self.config.cookie = CookieScope {
            domain: domain.into(),
            path: path.into(),
        };
        self.cookie_scope = Arc::new(self.config.cookie.clone());
    }

    // Filters

    pub fn filter<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self>
    where
        H: Handler + 'static,
    {
        self.filter_method(pattern, handler, MethodMask::Any)
    }

    pub fn filter_fn<F>(&mut self, pattern: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Control + Send + Sync + 'static,
    {
        self.filter(pattern, f)
    }

    pub fn filter_method<H>(
        &mut self,
        pattern: &str,
        handler: H,
        methods: impl Into<MethodMask>,
    ) -> Result<&mut Self>
    where
        H: Handler + 'static,
    {
        self.register(
            Phase::Filter,
            pattern,
            methods.into(),
            Target::Pipeline(Box::new(handler)),
        )
    }

    pub fn filter_method_fn<F>(
        &mut self,
        pattern: &str,
        f: F,
        methods: impl Into<MethodMask>,
    ) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Control + Send + Sync + 'static,
    {
        self.filter_method(pattern, f, methods)
    }

    // Handlers

    pub fn handle<H>(&mut self, pattern: &str, handler: H) -> Result<&mut Self>
    where
        H: Handler + 'static,
    {
        self.handle_method(pattern, handler, MethodMask::Any)
    }

    pub fn handle_fn<F>(&mut self, pattern: &str, f: F) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Control + Send + Sync + 'static,
    {
        self.handle(pattern, f)
    }

    pub fn handle_method<H>(
        &mut self,
        pattern: &str,
        handler: H,
        methods: impl Into<MethodMask>,
    ) -> Result<&mut Self>
    where
        H: Handler + 'static,
    {
        self.register(
            Phase::Handler,
            pattern,
            methods.into(),
            Target::Pipeline(Box::new(handler)),
        )
    }

    pub fn handle_method_fn<F>(
        &mut self,
        pattern: &str,
        f: F,
        methods: impl Into<MethodMask>,
    ) -> Result<&mut Self>
    where
        F: Fn(&mut Context) -> Control + Send + Sync + 'static,
    {
        self.handle_method(pattern, f, methods)
    }

    /// Register a session-unaware handler. `continuation` decides whether
    /// the handler sequence keeps going after it runs.
    pub fn handle_legacy<H>(
        &mut self,
        pattern: &str,
        handler: H,
        continuation: Continuation,
    ) -> Result<&mut Self>
    where
        H: LegacyHandler + 'static,
    {
        self.handle_legacy_method(pattern, handler, MethodMask::Any, continuation)
    }

    pub fn handle_legacy_method<H>(
        &mut self,
        pattern: &str,
        handler: H,
        methods: impl Into<MethodMask>,
        continuation: Continuation,
    ) -> Result<&mut Self>
    where
        H: LegacyHandler + 'static,
    {
        self.register(
            Phase::Handler,
            pattern,
            methods.into(),
            Target::Legacy {
                handler: Box::new(handler),
                continuation,
            },
        )
    }

    pub fn handle_legacy_fn<F>(
        &mut self,
        pattern: &str,
        f: F,
        continuation: Continuation,
    ) -> Result<&mut Self>
    where
        F: Fn(&Request, &mut Response) + Send + Sync + 'static,
    {
        self.handle_legacy(pattern, f, continuation)
    }

    fn register(
        &mut self,
        phase: Phase,
        pattern: &str,
        methods: MethodMask,
        target: Target,
    ) -> Result<&mut Self> {
        debug!(%phase, pattern, %methods, "registering route");
        self.routes.register(phase, pattern, methods, target)?;
        Ok(self)
    }

    // Observability

    /// Install a fresh [`Monitor`] as the span tracker and return it.
    pub fn start_monitor(&mut self) -> Arc<Monitor> {
        let monitor = Arc::new(Monitor::new());
        self.tracker = Some(monitor.clone());
        monitor
    }

    pub fn set_span_tracker(&mut self, tracker: Arc<dyn SpanTracker>) {
        self.tracker = Some(tracker);
    }

    /// Snapshot from the span tracker, if one is installed.
    pub fn state(&self) -> Option<Value> {
        self.tracker.as_ref().map(|tracker| tracker.state())
    }

    /// Session bound to an in-flight request.
    pub fn request_session(&self, handle: RequestHandle) -> Option<Arc<Session>> {
        self.bindings.session(handle)
    }

    /// Shared handle on the in-flight table, for targets that need to look
    /// up their own binding.
    pub fn bindings(&self) -> Arc<BindingTable> {
        self.bindings.clone()
    }

    // Dispatch

    /// Run one request through the pipeline.
    ///
    /// Never fails: unmatched requests get a 404. A panicking target
    /// unwinds through this call after the binding has been removed and
    /// the backend released.
    pub fn dispatch(&self, mut request: Request) -> Response {
        debug!(method = %request.method(), uri = %request.uri(), "received request");
        let started = Instant::now();
        request.strip_prefix(&self.config.prefix);

        let mut response = Response::new();
        let session = self
            .backend
            .resolve(request.headers(), response.headers_mut());

        let handle = request.handle();
        self.bindings.insert(
            handle,
            Binding {
                session: session.clone(),
                method: request.method().clone(),
                path: request.path().to_string(),
                started,
            },
        );
        let _in_flight = InFlight {
            dispatcher: self,
            handle,
            session: session.clone(),
            uri: request.uri().clone(),
            started,
        };

        let mut ctx = Context::new(session, request, response, self.cookie_scope.clone());
        let matched = self.run_pipeline(&mut ctx);
        let path = ctx.request().path().to_string();
        let mut response = ctx.into_response();
        if !matched {
            debug!(path = %path, "no route matched");
            response.not_found();
        }
        response
    }

    /// Walk the stages and report whether any entry matched.
    fn run_pipeline(&self, ctx: &mut Context) -> bool {
        let mut matched = false;
        let mut stage = Stage::Filters;
        loop {
            stage = match stage {
                Stage::Filters if !self.config.filters_enabled => Stage::Handlers,
                Stage::Filters => {
                    let (hit, control) = self.run_phase(Phase::Filter, ctx);
                    matched |= hit;
                    match control {
                        Control::Continue => Stage::Handlers,
                        Control::Return => Stage::Done,
                    }
                }
                Stage::Handlers => {
                    if self.config.handlers_enabled {
                        let (hit, _) = self.run_phase(Phase::Handler, ctx);
                        matched |= hit;
                    }
                    Stage::Done
                }
                Stage::Done => return matched,
            };
        }
    }

    fn run_phase(&self, phase: Phase, ctx: &mut Context) -> (bool, Control) {
        let mut matched = false;
        for entry in self.routes.entries(phase) {
            if !entry.applies_to(ctx.request().path(), ctx.request().method()) {
                continue;
            }
            matched = true;

            let control = {
                let _span = SpanGuard::start(self.tracker.as_deref(), phase, entry.pattern());
                entry.target().invoke(ctx)
            };
            debug!(
                %phase,
                pattern = entry.pattern(),
                path = ctx.request().path(),
                %control,
                "matched route"
            );
            if control == Control::Return {
                return (true, Control::Return);
            }
        }
        (matched, Control::Continue)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("routes", &self.routes)
            .field("in_flight", &self.bindings.len())
            .field("tracker", &self.tracker.is_some())
            .finish()
    }
}

/// Unbinds the request and releases its session when the pipeline ends,
/// however it ends.
struct InFlight<'a> {
    dispatcher: &'a Dispatcher,
    handle: RequestHandle,
    session: Arc<Session>,
    uri: Uri,
    started: Instant,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.dispatcher.bindings.remove(self.handle);
        self.dispatcher.backend.release(&self.session);

        if let Some(threshold) = self.dispatcher.config.slow_threshold {
            let elapsed = self.started.elapsed();
            if elapsed > threshold {
                warn!(
                    uri = %self.uri,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "slow request"
                );
            }
        }
    }
}

/// Finishes a tracker span on drop.
struct SpanGuard<'a> {
    tracker: &'a dyn SpanTracker,
    id: SpanId,
}

impl<'a> SpanGuard<'a> {
    fn start(tracker: Option<&'a dyn SpanTracker>, phase: Phase, pattern: &str) -> Option<Self> {
        tracker.map(|tracker| {
            let id = tracker.start(&format!("{}_{}", phase.label(), pattern));
            Self { tracker, id }
        })
    }
}

impl Drop for SpanGuard<'_> {
    fn drop(&mut self) {
        self.tracker.done(self.id);
    }
}
