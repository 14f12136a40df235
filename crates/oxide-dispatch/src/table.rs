//! Route storage and lookup.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use semver::Version;
use tracing::debug;

use crate::error::{DispatchError, Result};
use crate::handler::SharedHandler;
use crate::path::RoutePattern;
use crate::request::{Method, PathParams};

/// Opaque handle for a registered route, used for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteId(u64);

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route-{}", self.0)
    }
}

/// A single registered route. Immutable once in the table.
pub struct Route {
    id: RouteId,
    name: Option<String>,
    method: Method,
    pattern: RoutePattern,
    version: Option<Version>,
    handlers: Vec<SharedHandler>,
}

impl Route {
    /// The route's handle.
    pub fn id(&self) -> RouteId {
        self.id
    }

    /// Optional route name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// HTTP method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Path pattern.
    pub fn pattern(&self) -> &RoutePattern {
        &self.pattern
    }

    /// Version served by this route, if any.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Handlers bound at registration, in order.
    pub fn handlers(&self) -> &[SharedHandler] {
        &self.handlers
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("method", &self.method)
            .field("pattern", &self.pattern.as_str())
            .field("version", &self.version.as_ref().map(ToString::to_string))
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)?;
        if let Some(version) = &self.version {
            write!(f, " (v{version})")?;
        }
        Ok(())
    }
}

/// A route whose pattern matched a path, with the extracted parameters.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    /// The matched route.
    pub route: Arc<Route>,
    /// Parameters extracted from the path.
    pub params: PathParams,
}

/// Everything needed to register a route.
pub struct NewRoute {
    pub method: Method,
    pub pattern: RoutePattern,
    pub version: Option<Version>,
    pub name: Option<String>,
    pub handlers: Vec<SharedHandler>,
}

/// Registered routes in insertion order.
///
/// Lookups load an immutable snapshot without locking. Registration and
/// removal build a new snapshot and swap it in, so a request that already
/// loaded the old one finishes against it.
pub struct RouteTable {
    routes: ArcSwap<Vec<Arc<Route>>>,
    write_lock: Mutex<()>,
    next_id: AtomicU64,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            routes: ArcSwap::from_pointee(Vec::new()),
            write_lock: Mutex::new(()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Adds a route and returns its handle.
    ///
    /// # Errors
    ///
    /// [`DispatchError::DuplicateRoute`] if a route with the same method,
    /// pattern text and version is already registered.
    pub fn add(&self, new: NewRoute) -> Result<RouteId> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.routes.load_full();
        let duplicate = current.iter().any(|r| {
            r.method == new.method
                && r.pattern.as_str() == new.pattern.as_str()
                && r.pattern.is_regex() == new.pattern.is_regex()
                && r.version == new.version
        });
        if duplicate {
            return Err(DispatchError::DuplicateRoute {
                method: new.method,
                pattern: new.pattern.as_str().to_string(),
                version: new
                    .version
                    .as_ref()
                    .map_or_else(|| "none".to_string(), ToString::to_string),
            });
        }

        let id = RouteId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let route = Arc::new(Route {
            id,
            name: new.name,
            method: new.method,
            pattern: new.pattern,
            version: new.version,
            handlers: new.handlers,
        });
        debug!(%id, route = %route, "route added");

        let mut next = Vec::with_capacity(current.len() + 1);
        next.extend(current.iter().cloned());
        next.push(route);
        self.routes.store(Arc::new(next));

        Ok(id)
    }

    /// Removes a route. Returns false if the handle is unknown.
    pub fn remove(&self, id: RouteId) -> bool {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let current = self.routes.load_full();
        if !current.iter().any(|r| r.id == id) {
            return false;
        }

        let next: Vec<Arc<Route>> = current.iter().filter(|r| r.id != id).cloned().collect();
        self.routes.store(Arc::new(next));
        debug!(%id, "route removed");
        true
    }

    /// Looks up a route by handle.
    pub fn get(&self, id: RouteId) -> Option<Arc<Route>> {
        self.snapshot().iter().find(|r| r.id == id).cloned()
    }

    /// The current routes, as one consistent snapshot.
    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot(self.routes.load_full())
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    /// Returns true if no routes are registered.
    pub fn is_empty(&self) -> bool {
        self.routes.load().is_empty()
    }

    /// All routes of any method whose pattern matches `path`.
    pub fn find_by_path(&self, path: &str) -> Vec<RouteMatch> {
        self.snapshot().find_by_path(path)
    }

    /// Routes of `method` whose pattern matches `path`.
    pub fn find_by_method_and_path(&self, method: Method, path: &str) -> Vec<RouteMatch> {
        self.snapshot().find_by_method_and_path(method, path)
    }

    /// The `Allow` header value for `path`, e.g. `GET, POST`.
    pub fn allow_header(&self, path: &str) -> String {
        join_methods(&self.snapshot().allowed_methods(path))
    }
}

/// An immutable view of the table at one point in time.
///
/// A request resolves against a single snapshot, so concurrent
/// registration or removal never yields a mix of old and new routes.
#[derive(Debug, Clone)]
pub struct RouteSnapshot(Arc<Vec<Arc<Route>>>);

impl RouteSnapshot {
    /// Iterates over routes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.0.iter()
    }

    /// Number of routes in the snapshot.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the snapshot holds no routes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All routes of any method whose pattern matches `path`.
    pub fn find_by_path(&self, path: &str) -> Vec<RouteMatch> {
        self.matching(path, None)
    }

    /// Routes of `method` whose pattern matches `path`.
    pub fn find_by_method_and_path(&self, method: Method, path: &str) -> Vec<RouteMatch> {
        self.matching(path, Some(method))
    }

    /// Methods with at least one route matching `path`, de-duplicated in
    /// first-registration order.
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = Vec::new();
        for route in self.iter() {
            if !methods.contains(&route.method) && route.pattern.match_path(path).is_some() {
                methods.push(route.method);
            }
        }
        methods
    }

    fn matching(&self, path: &str, method: Option<Method>) -> Vec<RouteMatch> {
        self.iter()
            .filter(|r| method.map_or(true, |m| r.method == m))
            .filter_map(|r| {
                r.pattern.match_path(path).map(|params| RouteMatch {
                    route: Arc::clone(r),
                    params,
                })
            })
            .collect()
    }
}

/// Joins methods for an `Allow` header.
pub fn join_methods(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
