//! Issue collection and fatal errors
//!
//! Problems with user data are never raised. They are logged into an [Issues] collector so a
//! single pass reports as much as it can find. Only violations of engine contracts become an
//! [Error] and abort the pass.
use crate::document::Locator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Warning,
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssueKind {
    // structural
    RequiredFieldMissing,
    TypeCoercion,
    WrongShape,
    NotAllowed,
    UnknownField,
    DuplicateName,
    // references
    UnknownType,
    UnknownTemplate,
    UnknownRequirement,
    UnknownCapability,
    UnknownParentType,
    CircularHierarchy,
    // constraints
    TypeOverrideConflict,
    ConstraintViolation,
    RequiredPropertyNotAssigned,
    UnknownProperty,
    NoTargetFound,
    CapabilityUnderFulfilled,
    InvalidMember,
    UnknownInput,
    FunctionError,
    FunctionLoop,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    pub message: String,
    pub locator: Option<Locator>,
    pub cause: Option<String>,
}

impl Issue {
    pub fn error(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: Severity::Error,
            message: message.into(),
            locator: None,
            cause: None,
        }
    }

    pub fn warning(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(kind, message)
        }
    }

    pub fn at(mut self, locator: Option<&Locator>) -> Self {
        self.locator = locator.cloned();
        self
    }

    pub fn caused_by(mut self, cause: impl std::fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.severity, self.message)?;
        if let Some(locator) = &self.locator {
            write!(f, "\n  at {locator}")?;
        }
        if let Some(cause) = &self.cause {
            write!(f, "\n  caused by: {cause}")?;
        }
        Ok(())
    }
}

/// Append-only, order-preserving issue collector
#[derive(derive_new::new, Debug, Default, Clone)]
pub struct Issues {
    #[new(default)]
    issues: Vec<Issue>,
}

impl Issues {
    /// Records an issue. An issue identical to one already recorded is dropped.
    pub fn log(&mut self, issue: Issue) {
        if self.issues.contains(&issue) {
            return;
        }
        tracing::trace!(?issue, "issue found");
        self.issues.push(issue);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Issue> {
        self.issues.iter()
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &Issue> {
        self.issues.iter().filter(move |issue| issue.kind == kind)
    }

    pub fn has_errors(&self) -> bool {
        self.issues
            .iter()
            .any(|issue| issue.severity == Severity::Error)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn as_slice(&self) -> &[Issue] {
        &self.issues
    }
}

impl std::fmt::Display for Issues {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for issue in &self.issues {
            writeln!(f, "{issue}")?;
        }
        Ok(())
    }
}

/// Engine contract violations. These abort the pass.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("registry is not sealed: all documents must be merged before linking")]
    RegistryNotSealed,
    #[error("unknown presentation schema `{0}`")]
    UnknownPresenter(String),
    #[error("internal invariant violated: {0}")]
    Invariant(String),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identical_issues_collapse() {
        let mut issues = Issues::new();
        issues.log(Issue::error(IssueKind::CircularHierarchy, "a -> b -> a"));
        issues.log(Issue::error(IssueKind::CircularHierarchy, "a -> b -> a"));
        issues.log(Issue::warning(IssueKind::UnknownField, "x"));

        assert_eq!(issues.len(), 2);
        assert!(issues.has_errors());
        assert_eq!(issues.of_kind(IssueKind::UnknownField).count(), 1);
    }

    #[test]
    fn warnings_alone_are_not_errors() {
        let mut issues = Issues::new();
        issues.log(Issue::warning(IssueKind::CapabilityUnderFulfilled, "x"));

        assert!(!issues.has_errors());
    }
}
