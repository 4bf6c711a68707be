//! Config file loading for `~/.gitcomm/config.yaml`.
//!
//! The file is created empty (mode 0600) on first run. Raw contents go
//! through `${NAME}` environment substitution before YAML parsing; comment
//! lines are left untouched and every missing variable is reported at once.

use std::{
   io::Write,
   path::{Path, PathBuf},
   time::Duration,
};

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{GitcommError, Result};

const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;

/// Top-level config file schema.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
   #[serde(default)]
   pub ai: AiSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AiSection {
   #[serde(default)]
   pub default_provider: Option<String>,
   #[serde(default)]
   pub providers:        IndexMap<String, ProviderEntry>,
}

/// One provider block as written in the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
   #[serde(default)]
   pub api_key:    Option<String>,
   #[serde(default)]
   pub model:      Option<String>,
   /// Only used by the local provider
   #[serde(default)]
   pub endpoint:   Option<String>,
   /// Request timeout in seconds
   #[serde(default)]
   pub timeout:    Option<u64>,
   #[serde(default)]
   pub max_tokens: Option<u32>,
}

/// Resolved provider settings handed to the provider layer.
#[derive(Debug, Clone)]
pub struct AiProviderConfig {
   pub name:       String,
   pub api_key:    String,
   pub model:      Option<String>,
   pub endpoint:   Option<String>,
   pub timeout:    Duration,
   pub max_tokens: Option<u32>,
}

impl FileConfig {
   /// Load from `path` (or the default location), creating the file if absent.
   pub fn load(path_override: Option<&Path>) -> Result<Self> {
      let path = match path_override {
         Some(p) => p.to_path_buf(),
         None => default_config_path()?,
      };

      if path.is_dir() {
         return Err(GitcommError::Config(format!(
            "config path is a directory: {}",
            path.display()
         )));
      }

      if !path.exists() {
         create_empty_config(&path)?;
      }

      let raw = std::fs::read_to_string(&path)
         .map_err(|e| GitcommError::Config(format!("failed to read {}: {e}", path.display())))?;
      Self::from_str(&raw, &path.display().to_string())
   }

   /// Parse config text after environment substitution.
   pub fn from_str(raw: &str, origin: &str) -> Result<Self> {
      let substituted = substitute_env(raw)?;
      if substituted.trim().is_empty() {
         return Ok(Self::default());
      }
      serde_yaml::from_str(&substituted)
         .map_err(|source| GitcommError::ConfigParse { path: origin.to_string(), source })
   }

   /// Resolve the provider configuration for `name`.
   pub fn provider(&self, name: &str) -> Option<AiProviderConfig> {
      let entry = self.ai.providers.get(name)?;
      Some(AiProviderConfig {
         name:       name.to_string(),
         api_key:    entry.api_key.clone().unwrap_or_default(),
         model:      entry.model.clone(),
         endpoint:   entry.endpoint.clone(),
         timeout:    Duration::from_secs(
            entry.timeout.unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS),
         ),
         max_tokens: entry.max_tokens,
      })
   }

   pub fn default_provider(&self) -> Option<&str> {
      self.ai.default_provider.as_deref().filter(|s| !s.is_empty())
   }
}

/// Default config location: `~/.gitcomm/config.yaml`.
/// Tries HOME (Unix/Linux/macOS) then USERPROFILE (Windows).
pub fn default_config_path() -> Result<PathBuf> {
   if let Ok(home) = std::env::var("HOME") {
      return Ok(PathBuf::from(home).join(".gitcomm/config.yaml"));
   }
   if let Ok(home) = std::env::var("USERPROFILE") {
      return Ok(PathBuf::from(home).join(".gitcomm/config.yaml"));
   }
   Err(GitcommError::Config(
      "no home directory found (tried HOME and USERPROFILE)".to_string(),
   ))
}

/// Create the empty config file: parents 0755, file 0600, zero bytes.
fn create_empty_config(path: &Path) -> Result<()> {
   if let Some(parent) = path.parent()
      && !parent.exists()
   {
      #[cfg(unix)]
      {
         use std::os::unix::fs::DirBuilderExt;
         std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(parent)
            .map_err(|e| {
               GitcommError::Config(format!("failed to create {}: {e}", parent.display()))
            })?;
      }
      #[cfg(not(unix))]
      std::fs::create_dir_all(parent)
         .map_err(|e| GitcommError::Config(format!("failed to create {}: {e}", parent.display())))?;
   }

   let mut opts = std::fs::OpenOptions::new();
   opts.write(true).create_new(true);
   #[cfg(unix)]
   {
      use std::os::unix::fs::OpenOptionsExt;
      opts.mode(0o600);
   }
   let mut file = opts
      .open(path)
      .map_err(|e| GitcommError::Config(format!("failed to create {}: {e}", path.display())))?;
   file
      .flush()
      .map_err(|e| GitcommError::Config(format!("failed to write {}: {e}", path.display())))?;
   Ok(())
}

// === ${NAME} substitution ===

/// Substitute `${NAME}` placeholders from the process environment.
///
/// Lines whose first non-blank character is `#` or `;` pass through verbatim.
/// Nested placeholders, placeholders containing whitespace, and placeholders
/// left open at end of line are rejected with their location; every missing
/// variable across the whole file is collected into a single error.
pub fn substitute_env(raw: &str) -> Result<String> {
   let mut out = String::with_capacity(raw.len());
   let mut missing: Vec<String> = Vec::new();

   for (lineno, line) in raw.lines().enumerate() {
      let trimmed = line.trim_start();
      if trimmed.starts_with('#') || trimmed.starts_with(';') {
         out.push_str(line);
         out.push('\n');
         continue;
      }

      let mut rest = line;
      while let Some(start) = rest.find("${") {
         out.push_str(&rest[..start]);
         let after = &rest[start + 2..];

         let Some(end) = after.find('}') else {
            return Err(GitcommError::Config(format!(
               "unterminated ${{...}} placeholder at line {}",
               lineno + 1
            )));
         };
         let name = &after[..end];

         if name.contains("${") {
            return Err(GitcommError::Config(format!(
               "nested ${{...}} placeholder at line {}",
               lineno + 1
            )));
         }
         if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(GitcommError::Config(format!(
               "malformed placeholder '${{{name}}}' at line {}",
               lineno + 1
            )));
         }

         match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => {
               if !missing.contains(&name.to_string()) {
                  missing.push(name.to_string());
               }
            },
         }
         rest = &after[end + 1..];
      }
      out.push_str(rest);
      out.push('\n');
   }

   if !missing.is_empty() {
      return Err(GitcommError::ConfigMissingEnv { names: missing });
   }
   Ok(out)
}

#[cfg(test)]
mod tests {
   use super::*;

   // Env-var tests mutate process state; keep names unique per test.

   #[test]
   fn test_empty_file_yields_default() {
      let cfg = FileConfig::from_str("", "test").unwrap();
      assert!(cfg.ai.providers.is_empty());
      assert!(cfg.default_provider().is_none());
   }

   #[test]
   fn test_full_schema() {
      let yaml = r"
ai:
  default_provider: anthropic
  providers:
    anthropic:
      api_key: sk-test
      model: claude-sonnet-4-5
      timeout: 60
      max_tokens: 800
    local:
      endpoint: http://localhost:11434/v1/chat/completions
";
      let cfg = FileConfig::from_str(yaml, "test").unwrap();
      assert_eq!(cfg.default_provider(), Some("anthropic"));

      let anthropic = cfg.provider("anthropic").unwrap();
      assert_eq!(anthropic.api_key, "sk-test");
      assert_eq!(anthropic.timeout, Duration::from_secs(60));
      assert_eq!(anthropic.max_tokens, Some(800));

      let local = cfg.provider("local").unwrap();
      assert_eq!(local.api_key, "");
      assert_eq!(local.timeout, Duration::from_secs(30));
      assert_eq!(
         local.endpoint.as_deref(),
         Some("http://localhost:11434/v1/chat/completions")
      );
   }

   #[test]
   fn test_unknown_provider_is_none() {
      let cfg = FileConfig::from_str("ai:\n  providers: {}\n", "test").unwrap();
      assert!(cfg.provider("openai").is_none());
   }

   #[test]
   fn test_substitute_basic() {
      unsafe { std::env::set_var("GITCOMM_TEST_SUB_BASIC", "hello") };
      let out = substitute_env("key: ${GITCOMM_TEST_SUB_BASIC}!").unwrap();
      assert_eq!(out, "key: hello!\n");
   }

   #[test]
   fn test_substitute_empty_value_is_valid() {
      unsafe { std::env::set_var("GITCOMM_TEST_SUB_EMPTY", "") };
      let out = substitute_env("key: '${GITCOMM_TEST_SUB_EMPTY}'").unwrap();
      assert_eq!(out, "key: ''\n");
   }

   #[test]
   fn test_substitute_skips_comments() {
      let out = substitute_env("# ${NOT_SET_ANYWHERE}\n; ${ALSO_NOT_SET}\nkey: v").unwrap();
      assert!(out.contains("${NOT_SET_ANYWHERE}"));
      assert!(out.contains("${ALSO_NOT_SET}"));
   }

   #[test]
   fn test_substitute_missing_lists_all() {
      let err = substitute_env("a: ${GITCOMM_TEST_MISS_A}\nb: ${GITCOMM_TEST_MISS_B}\n")
         .unwrap_err();
      match err {
         GitcommError::ConfigMissingEnv { names } => {
            assert_eq!(names, vec!["GITCOMM_TEST_MISS_A", "GITCOMM_TEST_MISS_B"]);
         },
         other => panic!("unexpected error: {other}"),
      }
   }

   #[test]
   fn test_substitute_rejects_nested() {
      let err = substitute_env("a: ${${X}}").unwrap_err();
      assert!(err.to_string().contains("nested"));
   }

   #[test]
   fn test_substitute_rejects_whitespace() {
      let err = substitute_env("a: ${MY VAR}").unwrap_err();
      assert!(err.to_string().contains("malformed"));
   }

   #[test]
   fn test_substitute_rejects_unterminated() {
      let err = substitute_env("a: ${OPEN\nb: 1").unwrap_err();
      assert!(err.to_string().contains("unterminated"));
   }

   #[test]
   fn test_load_creates_empty_file() {
      let dir = tempfile::tempdir().unwrap();
      let path = dir.path().join("nested/config.yaml");
      let cfg = FileConfig::load(Some(&path)).unwrap();
      assert!(cfg.ai.providers.is_empty());
      let meta = std::fs::metadata(&path).unwrap();
      assert_eq!(meta.len(), 0);
      #[cfg(unix)]
      {
         use std::os::unix::fs::PermissionsExt;
         assert_eq!(meta.permissions().mode() & 0o777, 0o600);
      }
   }

   #[test]
   fn test_load_rejects_directory() {
      let dir = tempfile::tempdir().unwrap();
      let err = FileConfig::load(Some(dir.path())).unwrap_err();
      assert!(err.to_string().contains("directory"));
   }
}
