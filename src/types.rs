use std::{collections::BTreeSet, fmt, path::PathBuf, time::Instant};

use serde::{Deserialize, Serialize};

// === Commit types ===

/// The fixed set of commit types this tool accepts.
pub const ALLOWED_TYPES: &[&str] =
   &["feat", "fix", "docs", "style", "refactor", "test", "chore", "version"];

/// Check whether `s` is one of the allowed commit types.
pub fn is_allowed_type(s: &str) -> bool {
   ALLOWED_TYPES.contains(&s)
}

// === Commit message ===

/// A conventional commit message as collected from the user or an AI provider.
///
/// `ctype` is kept as a plain string so that permissively parsed AI output can
/// be represented before validation; the validator decides legality.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitMessage {
   pub ctype:   String,
   pub scope:   Option<String>,
   pub subject: String,
   pub body:    Option<String>,
   pub footer:  Option<String>,
   pub signoff: bool,
}

impl CommitMessage {
   /// First line of the commit: `type[(scope)]: subject`.
   pub fn header(&self) -> String {
      match &self.scope {
         Some(scope) if !scope.is_empty() => {
            format!("{}({}): {}", self.ctype, scope, self.subject)
         },
         _ => format!("{}: {}", self.ctype, self.subject),
      }
   }

   /// Render the full commit body handed to `git commit -m`.
   ///
   /// Blank sections are omitted along with their separating blank line. The
   /// sign-off trailer is appended only when `signoff` is set, using the
   /// identity from `identity`.
   pub fn format_body(&self, identity: &GitConfig) -> String {
      let mut sections = vec![self.header()];

      if let Some(body) = &self.body
         && !body.trim().is_empty()
      {
         sections.push(body.trim().to_string());
      }
      if let Some(footer) = &self.footer
         && !footer.trim().is_empty()
      {
         sections.push(footer.trim().to_string());
      }
      if self.signoff {
         sections.push(format!(
            "Signed-off-by: {} <{}>",
            identity.user_name, identity.user_email
         ));
      }

      sections.join("\n\n")
   }

   /// Parse a message permissively: missing fields are left empty and the
   /// validator decides whether the result is legal.
   ///
   /// Recognizes a `type(scope): subject` header, an optional body block, any
   /// further blocks as footer, and a trailing `Signed-off-by:` trailer.
   pub fn parse(text: &str) -> Self {
      let normalized = text.replace("\r\n", "\n");
      let mut blocks: Vec<String> = normalized
         .trim()
         .split("\n\n")
         .map(|b| b.trim().to_string())
         .filter(|b| !b.is_empty())
         .collect();

      let mut signoff = false;
      if let Some(last) = blocks.last()
         && last.starts_with("Signed-off-by:")
      {
         signoff = true;
         blocks.pop();
      }

      // A first block with extra lines contributes them to the body
      let (header, spill) = match blocks.first().map(String::as_str) {
         Some(block) => match block.split_once('\n') {
            Some((first, rest)) => (first, Some(rest.trim().to_string())),
            None => (block, None),
         },
         None => ("", None),
      };
      let (ctype, scope, subject) = parse_header(header);

      let body = match (spill, blocks.get(1).cloned()) {
         (Some(spill), Some(block)) => Some(format!("{spill}\n{block}")),
         (Some(spill), None) => Some(spill),
         (None, block) => block,
      };
      let footer = if blocks.len() > 2 {
         Some(blocks[2..].join("\n\n"))
      } else {
         None
      };

      Self { ctype, scope, subject, body, footer, signoff }
   }
}

/// Split a header line into (type, scope, subject).
///
/// A header without a recognizable `type[(scope)]:` prefix yields an empty
/// type and the whole line as subject.
fn parse_header(line: &str) -> (String, Option<String>, String) {
   let line = line.trim();
   let Some(colon) = line.find(':') else {
      return (String::new(), None, line.to_string());
   };

   let prefix = line[..colon].trim();
   let subject = line[colon + 1..].trim().to_string();

   // type(scope) form
   if let Some(open) = prefix.find('(') {
      if prefix.ends_with(')') {
         let ctype = prefix[..open].trim();
         let scope = prefix[open + 1..prefix.len() - 1].trim();
         if is_well_formed_prefix(ctype) {
            let scope = if scope.is_empty() {
               None
            } else {
               Some(scope.to_string())
            };
            return (ctype.to_string(), scope, subject);
         }
      }
      // Malformed prefix: treat the entire line as subject
      return (String::new(), None, line.to_string());
   }

   if is_well_formed_prefix(prefix) {
      (prefix.to_string(), None, subject)
   } else {
      (String::new(), None, line.to_string())
   }
}

/// A header prefix must look like a bare word to be treated as a type.
fn is_well_formed_prefix(s: &str) -> bool {
   !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Pre-populated defaults carried into the next round of prompts when the
/// user edits an AI message or a rejected commit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePrefill {
   pub ctype:   Option<String>,
   pub scope:   Option<String>,
   pub subject: Option<String>,
   pub body:    Option<String>,
   pub footer:  Option<String>,
}

impl From<&CommitMessage> for MessagePrefill {
   fn from(msg: &CommitMessage) -> Self {
      let keep = |s: &str| {
         if s.is_empty() {
            None
         } else {
            Some(s.to_string())
         }
      };
      Self {
         ctype:   keep(&msg.ctype),
         scope:   msg.scope.clone().filter(|s| !s.is_empty()),
         subject: keep(&msg.subject),
         body:    msg.body.clone().filter(|s| !s.is_empty()),
         footer:  msg.footer.clone().filter(|s| !s.is_empty()),
      }
   }
}

// === Repository state ===

/// Staging status of a single changed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
   Added,
   Modified,
   Deleted,
   Renamed,
   Copied,
   Unmerged,
   Untracked,
}

impl FileStatus {
   /// Map a porcelain v1 status character.
   pub const fn from_porcelain(c: char) -> Option<Self> {
      match c {
         'A' => Some(Self::Added),
         'M' | 'T' => Some(Self::Modified),
         'D' => Some(Self::Deleted),
         'R' => Some(Self::Renamed),
         'C' => Some(Self::Copied),
         'U' => Some(Self::Unmerged),
         '?' => Some(Self::Untracked),
         _ => None,
      }
   }

   pub const fn as_str(&self) -> &'static str {
      match self {
         Self::Added => "added",
         Self::Modified => "modified",
         Self::Deleted => "deleted",
         Self::Renamed => "renamed",
         Self::Copied => "copied",
         Self::Unmerged => "unmerged",
         Self::Untracked => "untracked",
      }
   }
}

impl fmt::Display for FileStatus {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

/// One changed file as shown to the user and the prompt generator.
///
/// `diff` is empty for binary and unstaged entries; oversize diffs are
/// replaced with a metadata block by the diff layer.
#[derive(Debug, Clone)]
pub struct FileChange {
   pub path:   String,
   pub status: FileStatus,
   pub diff:   String,
   pub binary: bool,
}

/// Snapshot of staged and unstaged changes, in porcelain output order.
#[derive(Debug, Clone, Default)]
pub struct RepositoryState {
   pub staged_files:   Vec<FileChange>,
   pub unstaged_files: Vec<FileChange>,
}

impl RepositoryState {
   pub fn is_empty(&self) -> bool {
      self.staged_files.is_empty() && self.unstaged_files.is_empty()
   }

   pub fn has_changes(&self) -> bool {
      !self.is_empty()
   }
}

// === Staging snapshot ===

/// The set of paths staged at workflow entry, held for the whole run and
/// consulted by the restoration path.
#[derive(Debug, Clone)]
pub struct StagingSnapshot {
   pub staged_paths: BTreeSet<String>,
   pub captured_at:  Instant,
   pub repo_path:    PathBuf,
}

impl StagingSnapshot {
   /// Paths staged now but absent from the snapshot; this is exactly the set
   /// `git reset HEAD --` must receive to restore the captured index.
   pub fn restore_delta(&self, current_staged: &BTreeSet<String>) -> Vec<String> {
      current_staged
         .iter()
         .filter(|p| !self.staged_paths.contains(*p))
         .cloned()
         .collect()
   }
}

// === Git identity and signing ===

/// Values read from git config, with the tool's fallback identity.
#[derive(Debug, Clone)]
pub struct GitConfig {
   pub user_name:        String,
   pub user_email:       String,
   pub signing_key_path: String,
   pub gpg_format:       String,
   pub commit_gpgsign:   Option<bool>,
}

impl Default for GitConfig {
   fn default() -> Self {
      Self {
         user_name:        "gitcomm".to_string(),
         user_email:       "gitcomm@local".to_string(),
         signing_key_path: String::new(),
         gpg_format:       String::new(),
         commit_gpgsign:   None,
      }
   }
}

/// SSH commit-signing configuration derived from `GitConfig`.
#[derive(Debug, Clone, Default)]
pub struct CommitSigner {
   pub public_key_path:  String,
   pub private_key_path: String,
   pub format:           String,
   pub enabled:          bool,
}

impl CommitSigner {
   /// Derive the signer from git config and the `--no-sign` flag.
   ///
   /// Signing requires `gpg.format = ssh`, a configured key, and
   /// `commit.gpgsign` not set to false. The private key path is the public
   /// key path with a `.pub` suffix stripped; an unreadable private key
   /// disables signing rather than failing the commit.
   pub fn derive(config: &GitConfig, no_sign: bool) -> Self {
      let public_key_path = config.signing_key_path.clone();
      let private_key_path = public_key_path
         .strip_suffix(".pub")
         .unwrap_or(&public_key_path)
         .to_string();

      let mut enabled = config.gpg_format == "ssh"
         && !public_key_path.is_empty()
         && config.commit_gpgsign != Some(false)
         && !no_sign;

      if enabled && std::fs::metadata(&private_key_path).is_err() {
         tracing::debug!(key = %private_key_path, "signing key unreadable, commit will be unsigned");
         enabled = false;
      }

      Self {
         public_key_path,
         private_key_path,
         format: config.gpg_format.clone(),
         enabled,
      }
   }
}

// === Interactive choices ===

/// Three-way outcome of showing an AI-generated message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiAcceptance {
   UseAndCommit,
   UseAndEdit,
   Reject,
}

/// Three-way outcome of a failed `git commit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFailureChoice {
   Retry,
   Edit,
   Cancel,
}
