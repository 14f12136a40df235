//! The dispatcher: route registration and the per-request chain.

use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::{DispatchError, Result};
use crate::finalize::{BufferedSink, FinalizedResponse, Finalizer, ResponseSink};
use crate::handler::{Handler, Next, SharedHandler};
use crate::options::ServerOptions;
use crate::path::{normalize_path, RoutePattern};
use crate::request::{Method, Request};
use crate::response::Response;
use crate::table::{join_methods, NewRoute, Route, RouteId, RouteMatch, RouteTable};
use crate::trap::{self, HandlerFailure, UncaughtHook};
use crate::version::{self, parse_version};

/// Hook fired once per request after the response has been written.
pub type AfterHook = Arc<dyn Fn(&Request, &Response, Option<&Route>) + Send + Sync>;

#[derive(Debug, Clone)]
enum PatternSource {
    Path(String),
    Regex(Regex),
}

/// What to register: a path or regex, plus an optional version and name.
///
/// ```
/// use oxide_dispatch::RouteSpec;
///
/// let spec = RouteSpec::path("/users/:id").version("1.2.3").name("user");
/// assert_eq!(spec.pattern_text(), "/users/:id");
/// ```
#[derive(Debug, Clone)]
pub struct RouteSpec {
    pattern: PatternSource,
    version: Option<String>,
    name: Option<String>,
}

impl RouteSpec {
    /// A path pattern with `:name` or `{name}` parameters.
    pub fn path(pattern: impl Into<String>) -> Self {
        Self {
            pattern: PatternSource::Path(pattern.into()),
            version: None,
            name: None,
        }
    }

    /// A regular expression matched against the normalized path.
    pub fn regex(regex: Regex) -> Self {
        Self {
            pattern: PatternSource::Regex(regex),
            version: None,
            name: None,
        }
    }

    /// Sets the version this route serves.
    #[must_use]
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the route name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The pattern as written.
    pub fn pattern_text(&self) -> &str {
        match &self.pattern {
            PatternSource::Path(p) => p,
            PatternSource::Regex(r) => r.as_str(),
        }
    }
}

impl From<&str> for RouteSpec {
    fn from(path: &str) -> Self {
        Self::path(path)
    }
}

impl From<String> for RouteSpec {
    fn from(path: String) -> Self {
        Self::path(path)
    }
}

impl From<Regex> for RouteSpec {
    fn from(regex: Regex) -> Self {
        Self::regex(regex)
    }
}

fn single(handler: impl Handler + 'static) -> Vec<SharedHandler> {
    let handler: SharedHandler = Arc::new(handler);
    vec![handler]
}

enum Flow {
    Continue,
    Stop,
}

/// Routes requests through pre handlers, the route table, `use` handlers
/// and route handlers, then finalizes the response.
///
/// Handlers and hooks are added with `&mut self` during setup. Routes can
/// be added and removed through `&self` at any time, including while
/// requests are in flight.
///
/// ```
/// use oxide_dispatch::{handler_fn, Next, Request, Server};
///
/// # tokio_test_block(async {
/// let server = Server::new();
/// server
///     .get("/hello/:name", handler_fn(|req, res| {
///         let name = req.params.get("name").unwrap_or("world").to_string();
///         res.send(format!("hello {name}"));
///         Next::Continue
///     }))
///     .unwrap();
///
/// let res = server
///     .handle(Request::get("/hello/mark").header("Accept", "text/plain"))
///     .await;
/// assert_eq!(res.status, 200);
/// assert_eq!(res.body_string().unwrap(), "hello mark");
/// # });
/// # fn tokio_test_block(f: impl std::future::Future<Output = ()>) {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
pub struct Server {
    options: ServerOptions,
    pre: Vec<SharedHandler>,
    chain: Vec<SharedHandler>,
    routes: RouteTable,
    after: Vec<AfterHook>,
    uncaught: Option<UncaughtHook>,
    finalizer: Finalizer,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// Creates a server with default options.
    pub fn new() -> Self {
        Self::with_options(ServerOptions::default())
    }

    /// Creates a server with the given options.
    pub fn with_options(options: ServerOptions) -> Self {
        let server_name = options.server_header.then(|| options.name.clone());
        let finalizer = Finalizer::new(options.default_format, server_name);
        Self {
            options,
            pre: Vec::new(),
            chain: Vec::new(),
            routes: RouteTable::new(),
            after: Vec::new(),
            uncaught: None,
            finalizer,
        }
    }

    /// The options this server was built with.
    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    /// Adds a handler that runs before routing, for every request.
    pub fn pre(&mut self, handler: impl Handler + 'static) -> &mut Self {
        self.pre.push(Arc::new(handler));
        self
    }

    /// Adds a handler that runs after routing, before the route's own
    /// handlers.
    pub fn use_handler(&mut self, handler: impl Handler + 'static) -> &mut Self {
        self.chain.push(Arc::new(handler));
        self
    }

    /// Registers a hook fired after every response is written.
    pub fn on_after<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Request, &Response, Option<&Route>) + Send + Sync + 'static,
    {
        self.after.push(Arc::new(hook));
        self
    }

    /// Replaces the default 500 response for panicking handlers.
    pub fn on_uncaught<F>(&mut self, hook: F) -> &mut Self
    where
        F: Fn(&Request, &mut Response, Option<&Route>, &HandlerFailure) + Send + Sync + 'static,
    {
        self.uncaught = Some(Arc::new(hook));
        self
    }

    /// Registers a route with a chain of handlers.
    ///
    /// Routes without a version get [`ServerOptions::default_version`].
    ///
    /// # Errors
    ///
    /// [`DispatchError::InvalidPattern`] for a bad path,
    /// [`DispatchError::InvalidVersion`] for a bad version and
    /// [`DispatchError::DuplicateRoute`] if an identical route exists.
    pub fn on(
        &self,
        method: Method,
        spec: impl Into<RouteSpec>,
        handlers: Vec<SharedHandler>,
    ) -> Result<RouteId> {
        let spec = spec.into();
        let pattern = match spec.pattern {
            PatternSource::Path(path) => RoutePattern::path(&path)?,
            PatternSource::Regex(regex) => RoutePattern::regex(regex),
        };
        let version = spec
            .version
            .as_deref()
            .or(self.options.default_version.as_deref())
            .map(parse_version)
            .transpose()?;

        let id = self.routes.add(NewRoute {
            method,
            pattern,
            version,
            name: spec.name,
            handlers,
        })?;
        info!(%id, %method, "route registered");
        Ok(id)
    }

    /// Registers a `GET` route.
    ///
    /// # Errors
    ///
    /// See [`Server::on`].
    pub fn get(
        &self,
        spec: impl Into<RouteSpec>,
        handler: impl Handler + 'static,
    ) -> Result<RouteId> {
        self.on(Method::Get, spec, single(handler))
    }

    /// Registers a `POST` route.
    ///
    /// # Errors
    ///
    /// See [`Server::on`].
    pub fn post(
        &self,
        spec: impl Into<RouteSpec>,
        handler: impl Handler + 'static,
    ) -> Result<RouteId> {
        self.on(Method::Post, spec, single(handler))
    }

    /// Registers a `PUT` route.
    ///
    /// # Errors
    ///
    /// See [`Server::on`].
    pub fn put(
        &self,
        spec: impl Into<RouteSpec>,
        handler: impl Handler + 'static,
    ) -> Result<RouteId> {
        self.on(Method::Put, spec, single(handler))
    }

    /// Registers a `PATCH` route.
    ///
    /// # Errors
    ///
    /// See [`Server::on`].
    pub fn patch(
        &self,
        spec: impl Into<RouteSpec>,
        handler: impl Handler + 'static,
    ) -> Result<RouteId> {
        self.on(Method::Patch, spec, single(handler))
    }

    /// Registers a `DELETE` route.
    ///
    /// # Errors
    ///
    /// See [`Server::on`].
    pub fn del(
        &self,
        spec: impl Into<RouteSpec>,
        handler: impl Handler + 'static,
    ) -> Result<RouteId> {
        self.on(Method::Delete, spec, single(handler))
    }

    /// Registers a `HEAD` route.
    ///
    /// # Errors
    ///
    /// See [`Server::on`].
    pub fn head(
        &self,
        spec: impl Into<RouteSpec>,
        handler: impl Handler + 'static,
    ) -> Result<RouteId> {
        self.on(Method::Head, spec, single(handler))
    }

    /// Registers an `OPTIONS` route, replacing the automatic `Allow` reply
    /// for its path.
    ///
    /// # Errors
    ///
    /// See [`Server::on`].
    pub fn opts(
        &self,
        spec: impl Into<RouteSpec>,
        handler: impl Handler + 'static,
    ) -> Result<RouteId> {
        self.on(Method::Options, spec, single(handler))
    }

    /// Removes a route. Requests already routed to it finish normally.
    pub fn remove(&self, id: RouteId) -> bool {
        let removed = self.routes.remove(id);
        if removed {
            info!(%id, "route removed");
        }
        removed
    }

    /// The route table.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Dispatches one request and writes exactly one response to `sink`.
    ///
    /// # Errors
    ///
    /// Only transport failures: a sink write error or an error yielded by
    /// a streamed body. The response state is final by then.
    pub async fn dispatch(&self, mut req: Request, sink: &mut dyn ResponseSink) -> io::Result<()> {
        debug!(method = %req.method, url = %req.url, "dispatching");

        let mut res = Response::new();
        let route = self.run(&mut req, &mut res).await;

        let result = self
            .finalizer
            .flush(req.method, req.get_header("accept"), &mut res, sink)
            .await;
        match &result {
            Ok(()) => debug!(
                method = %req.method,
                path = %req.path,
                status = res.status(),
                "response written"
            ),
            Err(e) => warn!(method = %req.method, path = %req.path, error = %e, "response write failed"),
        }

        for hook in &self.after {
            let outcome =
                std::panic::catch_unwind(AssertUnwindSafe(|| hook(&req, &res, route.as_deref())));
            if let Err(payload) = outcome {
                warn!(
                    message = HandlerFailure::from_panic(payload).message(),
                    "after hook panicked"
                );
            }
        }

        result
    }

    /// Dispatches into an in-memory sink and returns what was written.
    pub async fn handle(&self, req: Request) -> FinalizedResponse {
        let mut sink = BufferedSink::new();
        if let Err(e) = self.dispatch(req, &mut sink).await {
            debug!(error = %e, "buffered dispatch ended with a transport error");
        }
        sink.into_response()
    }

    async fn run(&self, req: &mut Request, res: &mut Response) -> Option<Arc<Route>> {
        match normalize_path(&req.url) {
            Ok(path) => req.path = path,
            Err(err) => {
                self.reject(req, res, &err);
                return None;
            }
        }

        if let Flow::Stop = self.run_chain(&self.pre, req, res, None).await {
            return None;
        }

        let matched = match self.route(req, res) {
            Ok(Some(matched)) => matched,
            Ok(None) => return None,
            Err(err) => {
                self.reject(req, res, &err);
                return None;
            }
        };

        let route = matched.route;
        req.params = matched.params;
        req.route = Some(Arc::clone(&route));
        debug!(route = %route, id = %route.id(), "route resolved");

        let current = Some(route.as_ref());
        if let Flow::Continue = self.run_chain(&self.chain, req, res, current).await {
            if let Flow::Continue = self.run_chain(route.handlers(), req, res, current).await {
                if !res.is_sent() {
                    debug!(route = %route, "handler chain finished without sending");
                }
            }
        }

        Some(route)
    }

    /// Resolves the route for a request against one table snapshot.
    ///
    /// `Ok(None)` means the response was already produced (automatic
    /// `OPTIONS`).
    fn route(&self, req: &Request, res: &mut Response) -> Result<Option<RouteMatch>> {
        let snapshot = self.routes.snapshot();
        let method = req.method;
        let path = req.path.as_str();

        let mut candidates = snapshot.find_by_method_and_path(method, path);
        if candidates.is_empty() && method == Method::Head && self.options.head_falls_back_to_get {
            candidates = snapshot.find_by_method_and_path(Method::Get, path);
        }

        if candidates.is_empty() {
            let allowed = snapshot.allowed_methods(path);
            if allowed.is_empty() {
                return Err(DispatchError::NotFound {
                    method,
                    path: path.to_string(),
                });
            }
            if method == Method::Options {
                res.set_header("Allow", join_methods(&allowed));
                res.send_status(200);
                return Ok(None);
            }
            return Err(DispatchError::MethodNotAllowed {
                method,
                path: path.to_string(),
                allowed,
            });
        }

        version::resolve(
            candidates,
            req.accept_version(),
            self.options.version_tie_break,
        )
        .map(Some)
    }

    async fn run_chain(
        &self,
        handlers: &[SharedHandler],
        req: &mut Request,
        res: &mut Response,
        route: Option<&Route>,
    ) -> Flow {
        for handler in handlers {
            match trap::guarded(&**handler, req, res).await {
                Ok(Next::Continue) => {}
                Ok(Next::Halt) => return Flow::Stop,
                Ok(Next::Error(err)) => {
                    self.reject(req, res, &DispatchError::Handler(err));
                    return Flow::Stop;
                }
                Err(failure) => {
                    trap::recover(self.uncaught.as_ref(), req, res, route, &failure);
                    return Flow::Stop;
                }
            }
        }
        Flow::Continue
    }

    fn reject(&self, req: &Request, res: &mut Response, err: &DispatchError) {
        debug!(method = %req.method, url = %req.url, error = %err, "request rejected");
        if let DispatchError::MethodNotAllowed { allowed, .. } = err {
            res.set_header("Allow", join_methods(allowed));
        }
        res.send_error(&err.to_http_error());
    }
}
