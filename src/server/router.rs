//! Two-level request routing.
//!
//! A [`Router`] maps context paths to handlers and picks the longest context
//! that prefixes the request path. Within a context, [`Routes`] matches the
//! remaining relative path against patterns such as
//! `/session/:session/element/:target` and dispatches on the method.
//!
//! Both are built before the server starts and are immutable afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use thiserror::Error;

use crate::parser::{Method, Request};
use crate::server::error::HttpError;
use crate::server::handler::{Handler, NotFoundHandler};
use crate::server::response::Response;

/// Maps context paths to handlers.
pub struct Router {
    /// Sorted longest path first.
    contexts: Vec<(String, Arc<dyn Handler>)>,
    fallback: Arc<dyn Handler>,
}

/// The handler a request path resolved to.
pub struct Resolved<'a> {
    pub context_path: &'a str,
    pub relative_path: String,
    pub handler: &'a Arc<dyn Handler>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            contexts: Vec::new(),
            fallback: Arc::new(NotFoundHandler),
        }
    }

    /// Mount `handler` at `context`, replacing any handler already there.
    pub fn mount(self, context: &str, handler: impl Handler + 'static) -> Self {
        self.mount_shared(context, Arc::new(handler))
    }

    /// Mount a handler that is shared with other contexts.
    pub fn mount_shared(mut self, context: &str, handler: Arc<dyn Handler>) -> Self {
        let context = normalize_context(context);
        self.contexts.retain(|(path, _)| *path != context);
        self.contexts.push((context, handler));
        self.contexts.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));
        self
    }

    /// Mounted context paths, longest first.
    pub fn contexts(&self) -> impl Iterator<Item = &str> {
        self.contexts.iter().map(|(path, _)| path.as_str())
    }

    /// Find the handler for `path`. Paths outside every context resolve to a
    /// handler at `/` that answers 404.
    pub fn resolve(&self, path: &str) -> Resolved<'_> {
        for (context, handler) in &self.contexts {
            if let Some(relative_path) = relative_path(context, path) {
                return Resolved {
                    context_path: context,
                    relative_path,
                    handler,
                };
            }
        }

        Resolved {
            context_path: "/",
            relative_path: relative_path("/", path).unwrap_or_else(|| "/".to_string()),
            handler: &self.fallback,
        }
    }

    /// Run every mounted handler's shutdown hook.
    pub fn shutdown(&self) {
        for (_, handler) in &self.contexts {
            handler.shutdown();
        }
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("contexts", &self.contexts().collect::<Vec<_>>())
            .finish()
    }
}

fn normalize_context(context: &str) -> String {
    format!("/{}", context.trim_matches('/'))
}

/// The part of `path` below `context`, or `None` if `path` is outside it.
/// A context only matches at a segment boundary; an exact match yields `/`.
fn relative_path(context: &str, path: &str) -> Option<String> {
    let rest = if context == "/" {
        path
    } else {
        let rest = path.strip_prefix(context)?;
        if !rest.is_empty() && !rest.starts_with('/') {
            return None;
        }
        rest
    };

    if rest.is_empty() || rest == "/" {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        Some(format!("/{rest}"))
    }
}

/// Errors from compiling a route pattern.
#[derive(Debug, Error)]
pub enum PatternError {
    /// A `:name` segment has an empty or non-identifier name.
    #[error("Invalid capture name {name:?} in route pattern {pattern:?}")]
    InvalidName { pattern: String, name: String },

    /// The same capture name appears twice.
    #[error("Duplicate capture name {name:?} in route pattern {pattern:?}")]
    DuplicateName { pattern: String, name: String },

    /// The compiled expression was rejected.
    #[error("Invalid route pattern {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// A compiled route pattern.
///
/// Segments starting with `:` capture one path segment under that name;
/// every other segment must match literally. The whole path must match, and
/// trailing slashes are ignored on both sides.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
    names: Vec<String>,
}

impl Pattern {
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let mut names: Vec<String> = Vec::new();
        let mut expr = String::from("^");

        for segment in pattern.trim_matches('/').split('/').filter(|s| !s.is_empty()) {
            expr.push('/');
            match segment.strip_prefix(':') {
                Some(name) => {
                    let valid = !name.is_empty()
                        && !name.starts_with(|c: char| c.is_ascii_digit())
                        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
                    if !valid {
                        return Err(PatternError::InvalidName {
                            pattern: pattern.to_string(),
                            name: name.to_string(),
                        });
                    }
                    if names.iter().any(|n| n == name) {
                        return Err(PatternError::DuplicateName {
                            pattern: pattern.to_string(),
                            name: name.to_string(),
                        });
                    }
                    expr.push_str(&format!("(?P<{name}>[^/]+)"));
                    names.push(name.to_string());
                }
                None => expr.push_str(&regex::escape(segment)),
            }
        }
        if expr == "^" {
            expr.push('/');
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|source| PatternError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
            names,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match `path`, returning the named captures.
    pub fn captures(&self, path: &str) -> Option<HashMap<String, String>> {
        let trimmed = path.trim_end_matches('/');
        let path = if trimmed.is_empty() { "/" } else { trimmed };

        let caps = self.regex.captures(path)?;
        Some(
            self.names
                .iter()
                .filter_map(|name| Some((name.clone(), caps.name(name)?.as_str().to_string())))
                .collect(),
        )
    }
}

struct Mapping {
    pattern: Pattern,
    methods: Vec<(Method, Arc<dyn Handler>)>,
}

impl Mapping {
    fn handler(&self, method: &Method) -> Option<&Arc<dyn Handler>> {
        self.methods
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, handler)| handler)
    }

    fn allowed(&self) -> String {
        self.methods
            .iter()
            .map(|(m, _)| m.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Pattern routes within one context, dispatched by method.
///
/// Patterns are tried in registration order. No matching pattern answers
/// 404; a matching pattern without a handler for the method answers 405.
#[derive(Default)]
pub struct Routes {
    mappings: Vec<Mapping>,
}

impl Routes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `method` requests matching `pattern` to `handler`.
    pub fn route(self, method: Method, pattern: &str, handler: impl Handler + 'static) -> Result<Self, PatternError> {
        self.route_shared(method, pattern, Arc::new(handler))
    }

    pub fn route_shared(
        mut self,
        method: Method,
        pattern: &str,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, PatternError> {
        let compiled = Pattern::new(pattern)?;
        let existing = self
            .mappings
            .iter_mut()
            .find(|m| m.pattern.regex.as_str() == compiled.regex.as_str());

        match existing {
            Some(mapping) => {
                mapping.methods.retain(|(m, _)| *m != method);
                mapping.methods.push((method, handler));
            }
            None => self.mappings.push(Mapping {
                pattern: compiled,
                methods: vec![(method, handler)],
            }),
        }
        Ok(self)
    }

    pub fn get(self, pattern: &str, handler: impl Handler + 'static) -> Result<Self, PatternError> {
        self.route(Method::GET, pattern, handler)
    }

    pub fn post(self, pattern: &str, handler: impl Handler + 'static) -> Result<Self, PatternError> {
        self.route(Method::POST, pattern, handler)
    }

    pub fn put(self, pattern: &str, handler: impl Handler + 'static) -> Result<Self, PatternError> {
        self.route(Method::PUT, pattern, handler)
    }

    pub fn delete(self, pattern: &str, handler: impl Handler + 'static) -> Result<Self, PatternError> {
        self.route(Method::DELETE, pattern, handler)
    }

    fn find(&self, path: &str) -> Option<(&Mapping, HashMap<String, String>)> {
        self.mappings
            .iter()
            .find_map(|mapping| Some((mapping, mapping.pattern.captures(path)?)))
    }
}

impl fmt::Debug for Routes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        for mapping in &self.mappings {
            list.entry(&format_args!("{} [{}]", mapping.pattern.as_str(), mapping.allowed()));
        }
        list.finish()
    }
}

#[async_trait]
impl Handler for Routes {
    async fn handle(&self, request: &mut Request<'_>, response: &mut Response<'_>) -> Result<(), HttpError> {
        let Some((mapping, params)) = self.find(request.relative_path()) else {
            return Err(HttpError::not_found(format!("No route for {}", request.path())));
        };
        let Some(handler) = mapping.handler(request.method()) else {
            let allowed = mapping.allowed();
            return Err(HttpError::method_not_allowed(format!(
                "Method {} not allowed for {}. Allowed methods: {allowed}",
                request.method(),
                request.path(),
            ))
            .with_header("Allow", allowed));
        };

        request.set_params(params);
        handler.handle(request, response).await
    }

    fn should_continue(&self, request: &Request<'_>) -> bool {
        match self.find(request.relative_path()) {
            Some((mapping, _)) => mapping
                .handler(request.method())
                .map_or(true, |handler| handler.should_continue(request)),
            None => true,
        }
    }

    fn shutdown(&self) {
        for mapping in &self.mappings {
            for (_, handler) in &mapping.methods {
                handler.shutdown();
            }
        }
    }
}
