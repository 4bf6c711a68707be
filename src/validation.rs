//! Conventional-commit validation.
//!
//! Rules live here in one place so the prompt generator can describe exactly
//! what will be enforced. Length limits are advisory warnings; an empty
//! subject and an unknown type are hard failures.

use std::fmt;

use crate::types::{ALLOWED_TYPES, CommitMessage};

pub const SUBJECT_MAX_LENGTH: usize = 72;
pub const BODY_MAX_LENGTH: usize = 320;
pub const SCOPE_GRAMMAR: &str = "alphanumeric characters plus '-' and '_'";

/// What a rule violation is about. The orchestrator branches on this, never
/// on message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
   UnknownType,
   EmptySubject,
   SubjectTooLong,
   BodyTooLong,
   InvalidScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
   /// Blocks the commit
   Hard,
   /// Shown as a warning, never blocks
   Advisory,
}

#[derive(Debug, Clone)]
pub struct ValidationIssue {
   pub kind:     IssueKind,
   pub severity: Severity,
   pub message:  String,
}

impl fmt::Display for ValidationIssue {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(&self.message)
   }
}

/// Result of validating one message.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
   pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
   /// A message is valid when nothing hard failed; advisory issues remain.
   pub fn is_valid(&self) -> bool {
      self.issues.iter().all(|i| i.severity != Severity::Hard)
   }

   pub fn hard_errors(&self) -> impl Iterator<Item = &ValidationIssue> {
      self.issues.iter().filter(|i| i.severity == Severity::Hard)
   }

   pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
      self.issues.iter().filter(|i| i.severity == Severity::Advisory)
   }
}

/// The rule set, exposed both as a validator and as metadata for prompt
/// generation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
   pub const fn new() -> Self {
      Self
   }

   pub fn allowed_types(&self) -> &'static [&'static str] {
      ALLOWED_TYPES
   }

   pub const fn subject_max_length(&self) -> usize {
      SUBJECT_MAX_LENGTH
   }

   pub const fn body_max_length(&self) -> usize {
      BODY_MAX_LENGTH
   }

   pub const fn scope_grammar_description(&self) -> &'static str {
      SCOPE_GRAMMAR
   }

   pub fn validate(&self, msg: &CommitMessage) -> ValidationReport {
      let mut issues = Vec::new();

      if !ALLOWED_TYPES.contains(&msg.ctype.as_str()) {
         issues.push(ValidationIssue {
            kind:     IssueKind::UnknownType,
            severity: Severity::Hard,
            message:  format!(
               "type '{}' is not one of: {}",
               msg.ctype,
               ALLOWED_TYPES.join(", ")
            ),
         });
      }

      let subject = msg.subject.trim();
      if subject.is_empty() {
         issues.push(ValidationIssue {
            kind:     IssueKind::EmptySubject,
            severity: Severity::Hard,
            message:  "subject must not be empty".to_string(),
         });
      } else if subject.chars().count() > SUBJECT_MAX_LENGTH {
         issues.push(ValidationIssue {
            kind:     IssueKind::SubjectTooLong,
            severity: Severity::Advisory,
            message:  format!(
               "subject is {} characters (recommended max {SUBJECT_MAX_LENGTH})",
               subject.chars().count()
            ),
         });
      }

      if let Some(body) = &msg.body
         && body.chars().count() > BODY_MAX_LENGTH
      {
         issues.push(ValidationIssue {
            kind:     IssueKind::BodyTooLong,
            severity: Severity::Advisory,
            message:  format!(
               "body is {} characters (recommended max {BODY_MAX_LENGTH})",
               body.chars().count()
            ),
         });
      }

      if let Some(scope) = &msg.scope
         && !scope.is_empty()
         && !is_valid_scope(scope)
      {
         issues.push(ValidationIssue {
            kind:     IssueKind::InvalidScope,
            severity: Severity::Hard,
            message:  format!("scope '{scope}' must contain only {SCOPE_GRAMMAR}"),
         });
      }

      ValidationReport { issues }
   }
}

/// Scope grammar: `[A-Za-z0-9_-]+`.
pub fn is_valid_scope(scope: &str) -> bool {
   !scope.is_empty()
      && scope
         .chars()
         .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}
