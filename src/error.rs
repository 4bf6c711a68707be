use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitcommError {
   #[error("git executable not found in PATH")]
   GitNotFound,

   #[error("git {found} is too old (need {minimum} or newer)")]
   GitVersionTooOld { found: String, minimum: String },

   #[error("not a git repository: {path}")]
   NotARepository { path: String },

   #[error("permission denied: {context}")]
   PermissionDenied { context: String },

   #[error("no such file: {path}")]
   FileNotFound { path: String },

   #[error("commit signing failed: {stderr}")]
   SigningFailed { stderr: String },

   #[error("git command failed (exit {exit_code}): {stderr}")]
   CommandFailed { exit_code: i32, stderr: String },

   #[error("invalid commit message: {0}")]
   ValidationFailed(String),

   #[error("AI provider '{provider}' unavailable: {reason}")]
   ProviderUnavailable { provider: String, reason: String },

   #[error("interrupted")]
   Cancelled,

   #[error("configuration error: {0}")]
   Config(String),

   #[error("missing environment variables referenced by config: {}", .names.join(", "))]
   ConfigMissingEnv { names: Vec<String> },

   #[error("failed to parse config {path}: {source}")]
   ConfigParse {
      path:   String,
      #[source]
      source: serde_yaml::Error,
   },

   #[error("IO error: {0}")]
   Io(#[from] std::io::Error),
}

impl GitcommError {
   /// Process exit code for this error when it reaches `main`.
   pub const fn exit_code(&self) -> i32 {
      match self {
         Self::Config(_) | Self::ConfigMissingEnv { .. } | Self::ConfigParse { .. } => 2,
         Self::ProviderUnavailable { .. } => 3,
         Self::Cancelled => 130,
         _ => 1,
      }
   }

   /// Errors that end the workflow immediately instead of offering a retry.
   pub const fn is_fatal(&self) -> bool {
      matches!(
         self,
         Self::GitNotFound
            | Self::GitVersionTooOld { .. }
            | Self::NotARepository { .. }
            | Self::Config(_)
            | Self::ConfigMissingEnv { .. }
            | Self::ConfigParse { .. }
            | Self::Cancelled
      )
   }
}

pub type Result<T> = std::result::Result<T, GitcommError>;

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_exit_codes() {
      assert_eq!(GitcommError::Config("bad".into()).exit_code(), 2);
      assert_eq!(GitcommError::ConfigMissingEnv { names: vec!["A".into()] }.exit_code(), 2);
      assert_eq!(
         GitcommError::ProviderUnavailable {
            provider: "openai".into(),
            reason:   "not configured".into(),
         }
         .exit_code(),
         3
      );
      assert_eq!(GitcommError::Cancelled.exit_code(), 130);
      assert_eq!(GitcommError::GitNotFound.exit_code(), 1);
      assert_eq!(
         GitcommError::CommandFailed { exit_code: 127, stderr: "boom".into() }.exit_code(),
         1
      );
   }

   #[test]
   fn test_fatal_classification() {
      assert!(GitcommError::GitNotFound.is_fatal());
      assert!(GitcommError::NotARepository { path: "/tmp".into() }.is_fatal());
      assert!(!GitcommError::SigningFailed { stderr: "no key".into() }.is_fatal());
      assert!(!GitcommError::CommandFailed { exit_code: 1, stderr: "hook".into() }.is_fatal());
   }

   #[test]
   fn test_missing_env_message_lists_names() {
      let err = GitcommError::ConfigMissingEnv {
         names: vec!["OPENAI_API_KEY".into(), "MISTRAL_API_KEY".into()],
      };
      let msg = err.to_string();
      assert!(msg.contains("OPENAI_API_KEY"));
      assert!(msg.contains("MISTRAL_API_KEY"));
   }
}
