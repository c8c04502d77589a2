use crate::error::{Cause, Error, Kind, Result, Severity};
use std::fmt::{self, Display};
use std::time::{Duration, Instant};

/// Ordered list of operation names a call went through, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Operations(Vec<&'static str>);

impl Operations {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn last(&self) -> Option<&'static str> {
        self.0.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.0.iter().copied()
    }
}

impl Display for Operations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("/")?;
            }
            f.write_str(op)?;
        }
        Ok(())
    }
}

/// Diagnostic context threaded explicitly through store and service calls.
///
/// It only feeds logging and error reporting: the operation path, the
/// request id and the default kind/severity of errors raised under it.
/// The optional deadline is checked before an operation is admitted.
#[derive(Debug, Clone)]
pub struct Context {
    ops: Operations,
    request_id: Option<String>,
    default_kind: Kind,
    default_severity: Severity,
    deadline: Option<Instant>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        Self {
            ops: Operations::default(),
            request_id: None,
            default_kind: Kind::Other,
            default_severity: Severity::Error,
            deadline: None,
        }
    }

    /// Creates a root context tagged with a request id.
    pub fn with_request_id(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::new()
        }
    }

    /// Returns a child context with `op` appended to the operation path.
    pub fn with_operation(&self, op: &'static str) -> Self {
        let mut child = self.clone();
        child.ops.0.push(op);
        child
    }

    pub fn with_default_kind(mut self, kind: Kind) -> Self {
        self.default_kind = kind;
        self
    }

    pub fn with_default_severity(mut self, severity: Severity) -> Self {
        self.default_severity = severity;
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a copy that never expires. Ops path, request id and defaults
    /// are kept.
    pub fn without_deadline(&self) -> Self {
        Self {
            deadline: None,
            ..self.clone()
        }
    }

    pub fn operations(&self) -> &Operations {
        &self.ops
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn default_kind(&self) -> Kind {
        self.default_kind
    }

    pub fn default_severity(&self) -> Severity {
        self.default_severity
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Fails with [`Kind::Interrupted`] once the deadline has passed.
    pub fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::new(
                self,
                Cause::DeadlineExceeded,
            )
            .with_kind(Kind::Interrupted)
            .with_severity(Severity::Warning)),
            _ => Ok(()),
        }
    }
}
