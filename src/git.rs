//! Git CLI wrapper.
//!
//! Every operation shells out to `git -C <repo>` under a cancellation token:
//! a tripped token sends SIGTERM to the child and escalates to SIGKILL after
//! a short grace period. Stdout and stderr are captured separately and every
//! invocation is logged at debug level with its exit code and duration.

use std::{
   collections::BTreeSet,
   io::Read,
   path::{Path, PathBuf},
   process::{Child, Command, Stdio},
   thread,
   time::{Duration, Instant},
};

use crate::{
   diff::split_cached_diff,
   error::{GitcommError, Result},
   signals::CancelToken,
   types::{
      CommitMessage, CommitSigner, FileChange, FileStatus, GitConfig, RepositoryState,
      StagingSnapshot,
   },
};

/// Oldest git this tool supports (`--porcelain=v1` + SSH signing behavior).
pub const MIN_GIT_VERSION: (u32, u32, u32) = (2, 34, 0);

const POLL_INTERVAL: Duration = Duration::from_millis(25);
const TERM_GRACE: Duration = Duration::from_millis(800);

/// Handle to an opened repository. Holds no subprocess state across calls.
#[derive(Debug, Clone)]
pub struct Git {
   repo_path: PathBuf,
}

/// Outcome of `create_commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
   /// Commit created as requested (signed or unsigned per the signer).
   Created { hash: String },
   /// Signing failed; the commit was created unsigned on retry.
   UnsignedFallback { hash: String },
}

impl CommitOutcome {
   pub fn hash(&self) -> &str {
      match self {
         Self::Created { hash } | Self::UnsignedFallback { hash } => hash,
      }
   }
}

/// Result of a per-file staging pass.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
   pub staged:   Vec<String>,
   pub failures: Vec<(String, String)>,
}

impl Git {
   /// Open the repository containing `path`.
   ///
   /// Validates the git executable (and its version) and that `path` is
   /// inside a work tree.
   pub fn open(path: &Path, token: &CancelToken) -> Result<Self> {
      let probe = Self { repo_path: path.to_path_buf() };

      let version_out = probe.run(&["--version"], &[], token)?;
      let version = version_out.stdout.trim();
      if let Some((major, minor, patch)) = parse_git_version(version)
         && (major, minor, patch) < MIN_GIT_VERSION
      {
         return Err(GitcommError::GitVersionTooOld {
            found:   format!("{major}.{minor}.{patch}"),
            minimum: format!(
               "{}.{}.{}",
               MIN_GIT_VERSION.0, MIN_GIT_VERSION.1, MIN_GIT_VERSION.2
            ),
         });
      }

      probe.run(&["rev-parse", "--git-dir"], &[], token)?;
      let toplevel = probe.run(&["rev-parse", "--show-toplevel"], &[], token)?;
      Ok(Self { repo_path: PathBuf::from(toplevel.stdout.trim()) })
   }

   /// Wrap a path already known to be a repository root, skipping the
   /// executable and repository validation that `open` performs.
   pub const fn at(repo_path: PathBuf) -> Self {
      Self { repo_path }
   }

   pub fn repo_path(&self) -> &Path {
      &self.repo_path
   }

   // === State inspection ===

   /// Current staged/unstaged changes, with diffs attached to staged entries.
   pub fn repository_state(
      &self,
      include_untracked_in_unstaged: bool,
      token: &CancelToken,
   ) -> Result<RepositoryState> {
      let status = self.run(&["status", "--porcelain=v1"], &[], token)?;
      let entries = parse_porcelain(&status.stdout);

      let diff_out = self.run(&["diff", "--cached", "--unified=0"], &[], token)?;
      let diffs = split_cached_diff(&diff_out.stdout);

      let mut state = RepositoryState::default();
      for entry in &entries {
         if let Some(status) = entry.staged_status() {
            let diff = diffs.iter().find(|d| d.path == entry.path);
            state.staged_files.push(FileChange {
               path:   entry.path.clone(),
               status,
               diff:   diff.map(|d| d.attached_text()).unwrap_or_default(),
               binary: diff.is_some_and(|d| d.is_binary),
            });
         }
         if let Some(status) = entry.unstaged_status() {
            if status == FileStatus::Untracked && !include_untracked_in_unstaged {
               continue;
            }
            state.unstaged_files.push(FileChange {
               path: entry.path.clone(),
               status,
               diff: String::new(),
               binary: false,
            });
         }
      }
      Ok(state)
   }

   /// Capture the set of currently staged paths.
   pub fn capture_snapshot(&self, token: &CancelToken) -> Result<StagingSnapshot> {
      let status = self.run(&["status", "--porcelain=v1"], &[], token)?;
      let staged_paths: BTreeSet<String> = parse_porcelain(&status.stdout)
         .into_iter()
         .filter(|e| e.staged_status().is_some())
         .map(|e| e.path)
         .collect();

      Ok(StagingSnapshot {
         staged_paths,
         captured_at: Instant::now(),
         repo_path: self.repo_path.clone(),
      })
   }

   // === Staging ===

   pub fn stage_all(&self, token: &CancelToken) -> Result<()> {
      self.run(&["add", "-A"], &[], token).map(|_| ())
   }

   /// Stage tracked files with worktree modifications, one `add` per file.
   /// On any failure the files staged by this pass are rolled back.
   pub fn stage_modified_only(&self, token: &CancelToken) -> Result<StageReport> {
      self.stage_per_file(false, token)
   }

   /// As `stage_modified_only`, but `??` entries are staged too.
   pub fn stage_all_including_untracked(&self, token: &CancelToken) -> Result<StageReport> {
      self.stage_per_file(true, token)
   }

   fn stage_per_file(&self, include_untracked: bool, token: &CancelToken) -> Result<StageReport> {
      let status = self.run(&["status", "--porcelain=v1"], &[], token)?;
      let mut report = StageReport::default();

      for entry in parse_porcelain(&status.stdout) {
         let wants = match entry.unstaged_status() {
            Some(FileStatus::Untracked) => include_untracked,
            Some(_) => true,
            None => false,
         };
         if !wants {
            continue;
         }

         match self.run(&["add", "--", &entry.path], &[], token) {
            Ok(_) => report.staged.push(entry.path),
            Err(GitcommError::Cancelled) => return Err(GitcommError::Cancelled),
            Err(e) => report.failures.push((entry.path, e.to_string())),
         }
      }

      if !report.failures.is_empty() && !report.staged.is_empty() {
         // Roll back only what this pass staged
         self.unstage(&report.staged, token)?;
         report.staged.clear();
      }
      Ok(report)
   }

   /// `git reset HEAD -- <paths>`. No-op for an empty set.
   pub fn unstage(&self, paths: &[String], token: &CancelToken) -> Result<()> {
      if paths.is_empty() {
         return Ok(());
      }
      let mut args: Vec<&str> = vec!["reset", "HEAD", "--"];
      args.extend(paths.iter().map(String::as_str));
      self.run(&args, &[], token).map(|_| ())
   }

   /// Restore the staged set to `snapshot` by unstaging the delta.
   /// Returns the number of paths unstaged.
   pub fn restore_snapshot(
      &self,
      snapshot: &StagingSnapshot,
      token: &CancelToken,
   ) -> Result<usize> {
      let current = self.capture_snapshot(token)?;
      let delta = snapshot.restore_delta(&current.staged_paths);
      self.unstage(&delta, token)?;
      Ok(delta.len())
   }

   // === Commit creation ===

   /// Create the commit, retrying unsigned when SSH signing fails.
   pub fn create_commit(
      &self,
      msg: &CommitMessage,
      signer: &CommitSigner,
      identity: &GitConfig,
      allow_empty: bool,
      token: &CancelToken,
   ) -> Result<CommitOutcome> {
      let body = msg.format_body(identity);
      let env = [
         ("GIT_AUTHOR_NAME", identity.user_name.as_str()),
         ("GIT_AUTHOR_EMAIL", identity.user_email.as_str()),
         ("GIT_COMMITTER_NAME", identity.user_name.as_str()),
         ("GIT_COMMITTER_EMAIL", identity.user_email.as_str()),
      ];

      if signer.enabled {
         let signing_key = format!("user.signingkey={}", signer.public_key_path);
         let mut args = vec![
            "-c",
            "gpg.format=ssh",
            "-c",
            signing_key.as_str(),
            "-c",
            "commit.gpgsign=true",
            "commit",
            "-S",
         ];
         if allow_empty {
            args.push("--allow-empty");
         }
         args.extend(["-m", body.as_str()]);

         match self.run(&args, &env, token) {
            Ok(_) => {
               return Ok(CommitOutcome::Created { hash: self.head_short_hash(token)? });
            },
            Err(GitcommError::SigningFailed { stderr }) => {
               tracing::debug!(stderr = %stderr, "signing failed, retrying unsigned");
            },
            Err(e) => return Err(e),
         }

         // Unsigned retry without the -c overrides
         let mut args = vec!["commit"];
         if allow_empty {
            args.push("--allow-empty");
         }
         args.extend(["-m", body.as_str()]);
         self.run(&args, &env, token)?;
         return Ok(CommitOutcome::UnsignedFallback { hash: self.head_short_hash(token)? });
      }

      let mut args = vec!["commit"];
      if allow_empty {
         args.push("--allow-empty");
      }
      args.extend(["-m", body.as_str()]);
      self.run(&args, &env, token)?;
      Ok(CommitOutcome::Created { hash: self.head_short_hash(token)? })
   }

   fn head_short_hash(&self, token: &CancelToken) -> Result<String> {
      let out = self.run(&["rev-parse", "--short", "HEAD"], &[], token)?;
      Ok(out.stdout.trim().to_string())
   }

   // === Git config ===

   /// Read the identity and signing values this tool consumes.
   pub fn read_git_config(&self, token: &CancelToken) -> Result<GitConfig> {
      let mut config = GitConfig::default();
      if let Some(name) = self.config_value("user.name", token)? {
         config.user_name = name;
      }
      if let Some(email) = self.config_value("user.email", token)? {
         config.user_email = email;
      }
      if let Some(key) = self.config_value("user.signingkey", token)? {
         config.signing_key_path = key;
      }
      if let Some(format) = self.config_value("gpg.format", token)? {
         config.gpg_format = format;
      }
      if let Some(gpgsign) = self.config_value("commit.gpgsign", token)? {
         config.commit_gpgsign = Some(gpgsign.eq_ignore_ascii_case("true"));
      }
      Ok(config)
   }

   /// `git config --get <key>`; exit code 1 means unset.
   fn config_value(&self, key: &str, token: &CancelToken) -> Result<Option<String>> {
      match self.run(&["config", "--get", key], &[], token) {
         Ok(out) => {
            let value = out.stdout.trim().to_string();
            Ok(if value.is_empty() { None } else { Some(value) })
         },
         Err(GitcommError::CommandFailed { exit_code: 1, .. }) => Ok(None),
         Err(e) => Err(e),
      }
   }

   // === Subprocess execution ===

   /// Run `git -C <repo> <args>` under the token.
   ///
   /// Cancellation sends SIGTERM, then SIGKILL after a grace period. Output
   /// is read on background threads so large diffs cannot deadlock the pipe.
   fn run(&self, args: &[&str], env: &[(&str, &str)], token: &CancelToken) -> Result<CmdOutput> {
      let started = Instant::now();

      let mut cmd = Command::new("git");
      if args.first() != Some(&"--version") {
         cmd.arg("-C").arg(&self.repo_path);
      }
      cmd.args(args).stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());
      for (k, v) in env {
         cmd.env(k, v);
      }

      let mut child = cmd.spawn().map_err(|e| match e.kind() {
         std::io::ErrorKind::NotFound => GitcommError::GitNotFound,
         std::io::ErrorKind::PermissionDenied => {
            GitcommError::PermissionDenied { context: "spawning git".to_string() }
         },
         _ => GitcommError::Io(e),
      })?;

      let stdout_reader = spawn_pipe_reader(child.stdout.take());
      let stderr_reader = spawn_pipe_reader(child.stderr.take());

      let status = loop {
         if token.is_cancelled() {
            terminate(&mut child);
            return Err(GitcommError::Cancelled);
         }
         match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Err(GitcommError::Io(e)),
         }
      };

      let stdout = stdout_reader.join().unwrap_or_default();
      let stderr = stderr_reader.join().unwrap_or_default();
      let exit_code = status.code().unwrap_or(-1);

      tracing::debug!(
         subcommand = args.first().copied().unwrap_or(""),
         args = ?args,
         exit_code,
         duration_ms = started.elapsed().as_millis() as u64,
         "git"
      );

      if status.success() {
         Ok(CmdOutput { stdout, stderr })
      } else {
         Err(categorize_failure(exit_code, &stderr))
      }
   }
}

struct CmdOutput {
   stdout: String,
   stderr: String,
}

fn spawn_pipe_reader<R: Read + Send + 'static>(
   pipe: Option<R>,
) -> thread::JoinHandle<String> {
   thread::spawn(move || {
      let mut buf = Vec::new();
      if let Some(mut pipe) = pipe {
         let _ = pipe.read_to_end(&mut buf);
      }
      String::from_utf8_lossy(&buf).into_owned()
   })
}

/// SIGTERM, short grace, then SIGKILL.
fn terminate(child: &mut Child) {
   #[cfg(unix)]
   {
      // SAFETY: kill with a valid pid and signal has no memory effects
      unsafe {
         libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
      }
   }
   let deadline = Instant::now() + TERM_GRACE;
   while Instant::now() < deadline {
      if matches!(child.try_wait(), Ok(Some(_))) {
         return;
      }
      thread::sleep(POLL_INTERVAL);
   }
   let _ = child.kill();
   let _ = child.wait();
}

/// Categorize a failed invocation by its canonical stderr text.
fn categorize_failure(exit_code: i32, stderr: &str) -> GitcommError {
   let lower = stderr.to_lowercase();
   if lower.contains("not a git repository") {
      return GitcommError::NotARepository { path: first_line(stderr) };
   }
   if lower.contains("permission denied") {
      return GitcommError::PermissionDenied { context: first_line(stderr) };
   }
   if lower.contains("did not match any file") || lower.contains("pathspec") {
      return GitcommError::FileNotFound { path: first_line(stderr) };
   }
   if lower.contains("gpg failed to sign")
      || lower.contains("failed to write commit object")
      || lower.contains("user.signingkey")
      || lower.contains("load key")
   {
      return GitcommError::SigningFailed { stderr: first_line(stderr) };
   }
   GitcommError::CommandFailed { exit_code, stderr: stderr.trim().to_string() }
}

fn first_line(s: &str) -> String {
   s.lines().next().unwrap_or_default().trim().to_string()
}

/// Parse `git version 2.39.2` (and friends) into a triple.
pub fn parse_git_version(s: &str) -> Option<(u32, u32, u32)> {
   let rest = s.trim().strip_prefix("git version ")?;
   let numeric = rest.split_whitespace().next()?;
   let mut parts = numeric.split('.');
   let major = parts.next()?.parse().ok()?;
   let minor = parts.next()?.parse().ok()?;
   // Some builds report "2.39" or append platform suffixes ("2.39.2.windows.1")
   let patch = parts
      .next()
      .and_then(|p| p.chars().take_while(char::is_ascii_digit).collect::<String>().parse().ok())
      .unwrap_or(0);
   Some((major, minor, patch))
}

// === Porcelain v1 parsing ===

/// One line of `git status --porcelain=v1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PorcelainEntry {
   pub index:    char,
   pub worktree: char,
   pub path:     String,
}

impl PorcelainEntry {
   /// Status of the staged side, if this entry has one.
   pub fn staged_status(&self) -> Option<FileStatus> {
      if self.index == '?' || self.index == ' ' {
         return None;
      }
      FileStatus::from_porcelain(self.index)
   }

   /// Status of the worktree side, if this entry has one. `??` maps to
   /// untracked.
   pub fn unstaged_status(&self) -> Option<FileStatus> {
      if self.index == '?' && self.worktree == '?' {
         return Some(FileStatus::Untracked);
      }
      if self.worktree == ' ' {
         return None;
      }
      FileStatus::from_porcelain(self.worktree)
   }
}

/// Parse porcelain v1 output, preserving line order. Rename arrows
/// (`orig -> new`) resolve to the new path.
pub fn parse_porcelain(text: &str) -> Vec<PorcelainEntry> {
   let mut entries = Vec::new();
   for line in text.lines() {
      let mut chars = line.chars();
      let (Some(index), Some(worktree)) = (chars.next(), chars.next()) else {
         continue;
      };
      let rest = chars.as_str();
      let Some(path_part) = rest.strip_prefix(' ') else {
         continue;
      };

      let path = match path_part.split_once(" -> ") {
         Some((_, new)) => new,
         None => path_part,
      };
      entries.push(PorcelainEntry {
         index,
         worktree,
         path: path.trim_matches('"').to_string(),
      });
   }
   entries
}
