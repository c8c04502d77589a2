use crate::context::{Context, Operations};
use jiff::Timestamp;
use std::fmt::{self, Display};
use thiserror::Error;

/// Boxed error used as the source of a contextual [`Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type shared by the store contract and the application service.
pub type Result<T> = std::result::Result<T, Error>;

/// Classification of an error, used for status mapping and log routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// Unclassified.
    Other,
    /// Malformed input; the caller's fault, never retried.
    InvalidValue,
    /// No such id or token.
    NotFound,
    /// Engine malfunction: transaction failure, corrupt data.
    Store,
    /// External I/O failure.
    Io,
    /// Token encoding or decoding failure.
    Tokenizer,
    /// Operation attempted after shutdown.
    Closed,
    /// Deadline passed before the operation was admitted.
    Interrupted,
    /// Broken internal invariant.
    Internal,
}

impl Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Other => "other",
            Kind::InvalidValue => "invalid value",
            Kind::NotFound => "not found",
            Kind::Store => "store",
            Kind::Io => "I/O",
            Kind::Tokenizer => "tokenizer",
            Kind::Closed => "closed",
            Kind::Interrupted => "interrupted",
            Kind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Observability-only severity of an error. Never drives control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        };
        f.write_str(name)
    }
}

/// Leaf causes raised by the core and the engines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Cause {
    #[error("link with id [{id}] not found")]
    NotFound { id: u64 },
    #[error("invalid url [{url}]: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("store is closed")]
    Closed,
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Shortens `s` to at most `max` characters for log and error messages,
/// marking a cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &s[..end]),
        None => s.to_owned(),
    }
}

/// A contextual error: kind, severity, operation path and the underlying cause.
#[derive(Debug)]
pub struct Error {
    kind: Kind,
    severity: Severity,
    ops: Operations,
    request_id: Option<String>,
    timestamp: Timestamp,
    message: Option<String>,
    source: BoxError,
}

impl Error {
    /// Creates an error carrying the context's operation path, request id and
    /// default kind/severity.
    pub fn new(ctx: &Context, source: impl Into<BoxError>) -> Self {
        Self {
            kind: ctx.default_kind(),
            severity: ctx.default_severity(),
            ops: ctx.operations().clone(),
            request_id: ctx.request_id().map(str::to_owned),
            timestamp: Timestamp::now(),
            message: None,
            source: source.into(),
        }
    }

    /// Wraps an inner error with business context. Kind and severity are
    /// inherited from `inner`.
    pub fn wrap(ctx: &Context, inner: Error, message: impl Into<String>) -> Self {
        let kind = inner.kind;
        let severity = inner.severity;
        Self::new(ctx, inner)
            .with_kind(kind)
            .with_severity(severity)
            .with_message(message)
    }

    /// Shorthand for a [`Cause::NotFound`] error with warning severity.
    pub fn not_found(ctx: &Context, id: u64) -> Self {
        Self::new(ctx, Cause::NotFound { id })
            .with_kind(Kind::NotFound)
            .with_severity(Severity::Warning)
    }

    /// Shorthand for a [`Cause::Closed`] error.
    pub fn closed(ctx: &Context) -> Self {
        Self::new(ctx, Cause::Closed)
            .with_kind(Kind::Closed)
            .with_severity(Severity::Error)
    }

    pub fn with_kind(mut self, kind: Kind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn operations(&self) -> &Operations {
        &self.ops
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the kind of the innermost [`Error`] in the source chain.
    pub fn root_kind(&self) -> Kind {
        let mut kind = self.kind;
        let mut current: &(dyn std::error::Error + 'static) = self.source.as_ref();
        loop {
            if let Some(inner) = current.downcast_ref::<Error>() {
                kind = inner.kind;
            }
            match current.source() {
                Some(next) => current = next,
                None => return kind,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.root_kind() == Kind::NotFound
    }

    /// Finds the first cause of type `E` in the source chain.
    pub fn find_cause<E: std::error::Error + 'static>(&self) -> Option<&E> {
        let mut current: Option<&(dyn std::error::Error + 'static)> = Some(self.source.as_ref());
        while let Some(err) = current {
            if let Some(found) = err.downcast_ref::<E>() {
                return Some(found);
            }
            current = err.source();
        }
        None
    }

    /// Emits the error once through `tracing` at a level matching its severity.
    pub fn log(&self) {
        let rid = self.request_id.as_deref().unwrap_or("-");
        match self.severity {
            Severity::Info => tracing::info!(
                kind = %self.kind, severity = %self.severity, ops = %self.ops, rid, "{}", self
            ),
            Severity::Warning => tracing::warn!(
                kind = %self.kind, severity = %self.severity, ops = %self.ops, rid, "{}", self
            ),
            Severity::Error | Severity::Critical => tracing::error!(
                kind = %self.kind, severity = %self.severity, ops = %self.ops, rid, "{}", self
            ),
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.ops.is_empty() {
            write!(f, "{}: ", self.ops)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}: ", message)?;
        }
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_marks_cut_strings() {
        assert_eq!(truncate("https://a.io", 24), "https://a.io");
        assert_eq!(truncate("abcdef", 6), "abcdef");
        assert_eq!(truncate("abcdef", 3), "abc...");
        // Cuts on character boundaries.
        assert_eq!(truncate("héllo", 2), "hé...");
    }

    #[test]
    fn new_takes_defaults_from_context() {
        let ctx = Context::with_request_id("rid-1")
            .with_operation("mem.Create")
            .with_default_kind(Kind::Store);

        let err = Error::new(&ctx, "disk on fire");

        assert_eq!(err.kind(), Kind::Store);
        assert_eq!(err.severity(), Severity::Error);
        assert_eq!(err.request_id(), Some("rid-1"));
        assert_eq!(err.to_string(), "mem.Create: disk on fire");
    }

    #[test]
    fn not_found_is_a_warning() {
        let ctx = Context::new().with_operation("redb.Get");
        let err = Error::not_found(&ctx, 7);

        assert_eq!(err.kind(), Kind::NotFound);
        assert_eq!(err.severity(), Severity::Warning);
        assert_eq!(err.to_string(), "redb.Get: link with id [7] not found");
    }

    #[test]
    fn wrap_keeps_the_cause_chain() {
        let store_ctx = Context::new().with_operation("mem.Get");
        let inner = Error::not_found(&store_ctx, 3);

        let app_ctx = Context::new().with_operation("app.Get");
        let outer = Error::wrap(&app_ctx, inner, "getting link failed");

        assert_eq!(outer.kind(), Kind::NotFound);
        assert!(outer.is_not_found());
        assert_eq!(
            outer.find_cause::<Cause>(),
            Some(&Cause::NotFound { id: 3 })
        );
        assert_eq!(
            outer.to_string(),
            "app.Get: getting link failed: mem.Get: link with id [3] not found"
        );
    }

    #[test]
    fn root_kind_looks_through_reclassified_wrappers() {
        let ctx = Context::new();
        let inner = Error::not_found(&ctx, 1);
        let outer = Error::new(&ctx, inner).with_kind(Kind::Internal);

        assert_eq!(outer.kind(), Kind::Internal);
        assert_eq!(outer.root_kind(), Kind::NotFound);
    }

    #[test]
    fn severities_are_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }
}
