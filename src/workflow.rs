//! The commit workflow state machine.
//!
//! Drives: snapshot capture, optional auto-staging, AI or manual message
//! collection, validation, commit creation, and staging restoration. The
//! cancellation token is checked at every state boundary; every exit other
//! than a successful commit restores the captured snapshot under its own
//! bounded budget.

use crate::{
   api::{Provider, ProviderError, build_provider},
   config::{AiProviderConfig, FileConfig},
   error::{GitcommError, Result},
   git::{CommitOutcome, Git},
   normalization::normalize_ai_text,
   prompts::unified_prompt,
   signals::{CancelToken, RESTORE_BUDGET, SignalBroker},
   style,
   tokens::TokenEstimator,
   types::{
      AiAcceptance, CommitFailureChoice, CommitMessage, CommitSigner, GitConfig, MessagePrefill,
      RepositoryState, StagingSnapshot,
   },
   ui::Interact,
   validation::{ValidationReport, Validator},
};

/// Cap on "generate a new AI message" rounds after a rejection.
const MAX_AI_ATTEMPTS: u32 = 3;

/// Flag surface the orchestrator consumes.
#[derive(Debug, Clone, Default)]
pub struct WorkflowFlags {
   /// Stage unstaged files before collecting the message
   pub auto_stage:        bool,
   /// When auto-staging, include untracked (`??`) entries
   pub include_untracked: bool,
   pub skip_ai:           bool,
   pub no_signoff:        bool,
   /// Provider explicitly requested on the command line
   pub provider:          Option<String>,
}

/// Terminal states of a workflow run. Fatal errors and cancellation are
/// reported through `Err` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
   Committed { hash: String, unsigned_fallback: bool },
   AbortedNoChanges,
   AbortedByUser,
}

#[derive(Debug)]
enum State {
   Stage,
   Inspect,
   AskAi { state: RepositoryState, allow_empty: bool },
   CallAi { state: RepositoryState, attempt: u32 },
   ParseAi { state: RepositoryState, raw: String, attempt: u32 },
   ShowAi { state: RepositoryState, msg: CommitMessage, attempt: u32 },
   Rejected { state: RepositoryState, attempt: u32 },
   Manual { prefill: Option<MessagePrefill>, allow_empty: bool },
   Commit { msg: CommitMessage, allow_empty: bool },
   CommitFailed { msg: CommitMessage, allow_empty: bool, error: GitcommError },
}

/// A state entry either moves to the next state or finishes the run.
#[derive(Debug)]
enum Step {
   Next(State),
   Done(Outcome),
}

pub struct Workflow<'a, U: Interact> {
   pub git:       &'a Git,
   pub config:    &'a FileConfig,
   pub ui:        &'a U,
   pub validator: Validator,
   pub token:     CancelToken,
   pub flags:     WorkflowFlags,
   pub identity:  GitConfig,
   pub signer:    CommitSigner,
   pub broker:    Option<&'a SignalBroker>,
}

impl<U: Interact> Workflow<'_, U> {
   /// Run the workflow to a terminal state.
   ///
   /// The snapshot captured here is restored on every non-`Committed` exit,
   /// including cancellation, under the restoration budget.
   pub fn run(&self) -> Result<Outcome> {
      let snapshot = self.git.capture_snapshot(&self.token)?;
      let result = self.drive();

      match &result {
         Ok(Outcome::Committed { .. }) => {},
         _ => self.restore(&snapshot),
      }
      result
   }

   fn drive(&self) -> Result<Outcome> {
      let mut state = State::Stage;

      loop {
         self.token.checkpoint()?;
         let step = match state {
            State::Stage => self.enter_stage()?,
            State::Inspect => self.enter_inspect()?,
            State::AskAi { state, allow_empty } => self.enter_ask_ai(state, allow_empty)?,
            State::CallAi { state, attempt } => self.enter_call_ai(state, attempt)?,
            State::ParseAi { state, raw, attempt } => self.enter_parse_ai(state, raw, attempt)?,
            State::ShowAi { state, msg, attempt } => self.enter_show_ai(state, msg, attempt)?,
            State::Rejected { state, attempt } => self.enter_rejected(state, attempt)?,
            State::Manual { prefill, allow_empty } => {
               let msg = collect_manual_message(
                  self.ui,
                  &self.validator,
                  prefill,
                  !self.flags.no_signoff,
               )?;
               Step::Next(State::Commit { msg, allow_empty })
            },
            State::Commit { msg, allow_empty } => self.enter_commit(msg, allow_empty)?,
            State::CommitFailed { msg, allow_empty, error } => {
               self.enter_commit_failed(msg, allow_empty, &error)?
            },
         };

         match step {
            Step::Next(next) => state = next,
            Step::Done(outcome) => return Ok(outcome),
         }
      }
   }

   // === State entries ===

   fn enter_stage(&self) -> Result<Step> {
      if !self.flags.auto_stage {
         return Ok(Step::Next(State::Inspect));
      }

      let report = if self.flags.include_untracked {
         self.git.stage_all_including_untracked(&self.token)?
      } else {
         self.git.stage_modified_only(&self.token)?
      };

      for (path, reason) in &report.failures {
         style::warn(&format!("could not stage {path}: {reason}"));
      }
      if !report.failures.is_empty() {
         style::warn("staging rolled back for the files above");
      }
      Ok(Step::Next(State::Inspect))
   }

   fn enter_inspect(&self) -> Result<Step> {
      let state = self.git.repository_state(true, &self.token)?;
      self.display_state(&state);

      if state.is_empty() {
         if self.ui.prompt_empty_commit()? {
            return Ok(Step::Next(State::Manual { prefill: None, allow_empty: true }));
         }
         return Ok(Step::Done(Outcome::AbortedNoChanges));
      }
      Ok(Step::Next(State::AskAi { state, allow_empty: false }))
   }

   fn enter_ask_ai(&self, state: RepositoryState, allow_empty: bool) -> Result<Step> {
      if self.flags.skip_ai {
         return Ok(Step::Next(State::Manual { prefill: None, allow_empty }));
      }

      let Some(config) = self.resolve_provider_config() else {
         if self.flags.provider.is_some() {
            return self.provider_unavailable_fallback("not configured", allow_empty);
         }
         return Ok(Step::Next(State::Manual { prefill: None, allow_empty }));
      };

      // A provider entry without its key (or endpoint) cannot serve; decide
      // that before asking the user anything
      if let Ok(provider) = build_provider(config.clone())
         && !provider.configured()
      {
         eprintln!("Error: AI provider unavailable: not configured");
         if self.flags.provider.is_some() {
            return self.provider_unavailable_fallback("not configured", allow_empty);
         }
         return Ok(Step::Next(State::Manual { prefill: None, allow_empty }));
      }

      let estimator = TokenEstimator::for_model(config.model.as_deref());
      let prompt = unified_prompt(&self.validator, &state);
      let estimated = estimator.estimate(&prompt.combined());

      if self.ui.prompt_ai_usage(estimated)? {
         Ok(Step::Next(State::CallAi { state, attempt: 1 }))
      } else {
         Ok(Step::Next(State::Manual { prefill: None, allow_empty }))
      }
   }

   fn enter_call_ai(&self, state: RepositoryState, attempt: u32) -> Result<Step> {
      let provider = match self.build_configured_provider() {
         Ok(provider) => provider,
         Err(e) => {
            eprintln!("Error: {e}");
            return Ok(Step::Next(State::Manual { prefill: None, allow_empty: false }));
         },
      };

      let generated = style::with_spinner("Generating commit message...", || {
         provider.generate(&self.validator, &state, &self.token)
      });

      match generated {
         Ok(raw) => Ok(Step::Next(State::ParseAi { state, raw, attempt })),
         Err(ProviderError::Cancelled) => Err(GitcommError::Cancelled),
         Err(ProviderError::Unavailable(reason)) => {
            eprintln!("Error: AI provider unavailable: {reason}");
            if self.flags.provider.is_some() {
               return self.provider_unavailable_fallback(&reason, false);
            }
            Ok(Step::Next(State::Manual { prefill: None, allow_empty: false }))
         },
      }
   }

   fn enter_parse_ai(&self, state: RepositoryState, raw: String, attempt: u32) -> Result<Step> {
      let mut msg = CommitMessage::parse(&normalize_ai_text(&raw));
      msg.signoff = !self.flags.no_signoff;

      let report = self.validator.validate(&msg);
      if report.is_valid() {
         show_warnings(&report);
         return Ok(Step::Next(State::ShowAi { state, msg, attempt }));
      }

      if self.ui.prompt_ai_edit_or_use_as_is(&report.issues)? {
         Ok(Step::Next(State::Manual {
            prefill:     Some(MessagePrefill::from(&msg)),
            allow_empty: false,
         }))
      } else {
         style::warn("committing a message that fails validation");
         Ok(Step::Next(State::ShowAi { state, msg, attempt }))
      }
   }

   fn enter_show_ai(
      &self,
      state: RepositoryState,
      msg: CommitMessage,
      attempt: u32,
   ) -> Result<Step> {
      let rendered = msg.format_body(&self.identity);
      match self.ui.prompt_ai_acceptance(&rendered)? {
         AiAcceptance::UseAndCommit => Ok(Step::Next(State::Commit { msg, allow_empty: false })),
         AiAcceptance::UseAndEdit => Ok(Step::Next(State::Manual {
            prefill:     Some(MessagePrefill::from(&msg)),
            allow_empty: false,
         })),
         AiAcceptance::Reject => Ok(Step::Next(State::Rejected { state, attempt })),
      }
   }

   fn enter_rejected(&self, state: RepositoryState, attempt: u32) -> Result<Step> {
      if attempt >= MAX_AI_ATTEMPTS {
         println!("{}", style::dim("AI retry limit reached, switching to manual input"));
         return Ok(Step::Next(State::Manual { prefill: None, allow_empty: false }));
      }

      if self.ui.prompt_reject_choice()? {
         Ok(Step::Next(State::CallAi { state, attempt: attempt + 1 }))
      } else {
         Ok(Step::Next(State::Manual { prefill: None, allow_empty: false }))
      }
   }

   fn enter_commit(&self, msg: CommitMessage, allow_empty: bool) -> Result<Step> {
      match self
         .git
         .create_commit(&msg, &self.signer, &self.identity, allow_empty, &self.token)
      {
         Ok(CommitOutcome::Created { hash }) => {
            println!("{} commit: {}", style::success(style::icons::SUCCESS), hash);
            Ok(Step::Done(Outcome::Committed { hash, unsigned_fallback: false }))
         },
         Ok(CommitOutcome::UnsignedFallback { hash }) => {
            style::warn("signing failed; commit was created unsigned");
            println!("{} commit: {}", style::success(style::icons::SUCCESS), hash);
            Ok(Step::Done(Outcome::Committed { hash, unsigned_fallback: true }))
         },
         Err(e) if e.is_fatal() => Err(e),
         Err(error) => Ok(Step::Next(State::CommitFailed { msg, allow_empty, error })),
      }
   }

   fn enter_commit_failed(
      &self,
      msg: CommitMessage,
      allow_empty: bool,
      error: &GitcommError,
   ) -> Result<Step> {
      eprintln!("Error: {error}");
      match self.ui.prompt_commit_failure()? {
         CommitFailureChoice::Retry => Ok(Step::Next(State::Commit { msg, allow_empty })),
         CommitFailureChoice::Edit => Ok(Step::Next(State::Manual {
            prefill: Some(MessagePrefill::from(&msg)),
            allow_empty,
         })),
         CommitFailureChoice::Cancel => Ok(Step::Done(Outcome::AbortedByUser)),
      }
   }

   // === Helpers ===

   fn resolve_provider_config(&self) -> Option<AiProviderConfig> {
      let name = self
         .flags
         .provider
         .as_deref()
         .or_else(|| self.config.default_provider())?;
      self.config.provider(name)
   }

   fn build_configured_provider(&self) -> Result<Box<dyn Provider>> {
      let name = self
         .flags
         .provider
         .as_deref()
         .or_else(|| self.config.default_provider())
         .ok_or_else(|| GitcommError::Config("no AI provider configured".to_string()))?;
      let config = self
         .config
         .provider(name)
         .ok_or_else(|| GitcommError::Config(format!("provider '{name}' is not configured")))?;
      build_provider(config)
   }

   /// The user explicitly requested a provider that cannot serve. Offer the
   /// manual path; declining surfaces the provider error (exit 3).
   fn provider_unavailable_fallback(&self, reason: &str, allow_empty: bool) -> Result<Step> {
      let provider = self.flags.provider.clone().unwrap_or_default();
      let fall_back = self.ui.prompt_confirm(
         &format!("Provider '{provider}' is unavailable ({reason}). Fall back to manual input?"),
         true,
      )?;
      if fall_back {
         Ok(Step::Next(State::Manual { prefill: None, allow_empty }))
      } else {
         Err(GitcommError::ProviderUnavailable { provider, reason: reason.to_string() })
      }
   }

   fn display_state(&self, state: &RepositoryState) {
      if !state.staged_files.is_empty() {
         println!("{}", style::bold("Staged changes:"));
         for file in &state.staged_files {
            println!("  {} ({})", file.path, style::dim(file.status.as_str()));
         }
      }
      if !state.unstaged_files.is_empty() {
         println!("{}", style::bold("Unstaged changes:"));
         for file in &state.unstaged_files {
            println!("  {} ({})", file.path, style::dim(file.status.as_str()));
         }
      }
   }

   fn restore(&self, snapshot: &StagingSnapshot) {
      let deadline = CancelToken::with_deadline(RESTORE_BUDGET);
      match self.git.restore_snapshot(snapshot, &deadline) {
         Ok(0) => {},
         Ok(n) => tracing::debug!(unstaged = n, "restored staging snapshot"),
         Err(e) => {
            style::warn(&format!(
               "failed to restore staging state ({e}); inspect `git status` manually"
            ));
         },
      }
      if let Some(broker) = self.broker {
         broker.mark_restored();
      }
   }
}

/// Collect a full commit message from the prompt sequence, re-validating and
/// surfacing advisory warnings before handing it back.
pub fn collect_manual_message<U: Interact>(
   ui: &U,
   validator: &Validator,
   prefill: Option<MessagePrefill>,
   signoff: bool,
) -> Result<CommitMessage> {
   let prefill = prefill.unwrap_or_default();

   let ctype = ui.prompt_type(prefill.ctype.as_deref())?;
   let scope = ui.prompt_scope(prefill.scope.as_deref())?;
   let subject = ui.prompt_subject(prefill.subject.as_deref())?;
   let body = ui.prompt_body(prefill.body.as_deref())?;
   let footer = ui.prompt_footer(prefill.footer.as_deref())?;

   let msg = CommitMessage { ctype, scope, subject, body, footer, signoff };
   show_warnings(&validator.validate(&msg));
   Ok(msg)
}

fn show_warnings(report: &ValidationReport) {
   for warning in report.warnings() {
      style::warn(&warning.message);
   }
}

#[cfg(test)]
mod tests {
   use std::cell::RefCell;

   use super::*;
   use crate::{error::GitcommError, validation::ValidationIssue};

   /// Scripted prompt double: pops pre-programmed answers in order.
   #[derive(Default)]
   struct ScriptedUi {
      types:       RefCell<Vec<String>>,
      scopes:      RefCell<Vec<Option<String>>>,
      subjects:    RefCell<Vec<String>>,
      bodies:      RefCell<Vec<Option<String>>>,
      footers:     RefCell<Vec<Option<String>>>,
      confirms:    RefCell<Vec<bool>>,
      acceptances: RefCell<Vec<AiAcceptance>>,
      edit_picks:  RefCell<Vec<bool>>,
   }

   fn pop<T>(queue: &RefCell<Vec<T>>) -> Result<T> {
      let mut queue = queue.borrow_mut();
      if queue.is_empty() {
         // Scripts model a user walking away: treat as Ctrl-C
         return Err(GitcommError::Cancelled);
      }
      Ok(queue.remove(0))
   }

   impl Interact for ScriptedUi {
      fn prompt_type(&self, preselect: Option<&str>) -> Result<String> {
         let scripted = pop(&self.types)?;
         if scripted == "<preselect>" {
            return Ok(preselect.unwrap_or("chore").to_string());
         }
         Ok(scripted)
      }

      fn prompt_scope(&self, default: Option<&str>) -> Result<Option<String>> {
         let scripted = pop(&self.scopes)?;
         if scripted.as_deref() == Some("<default>") {
            return Ok(default.map(String::from));
         }
         Ok(scripted)
      }

      fn prompt_subject(&self, default: Option<&str>) -> Result<String> {
         let scripted = pop(&self.subjects)?;
         if scripted == "<default>" {
            return Ok(default.unwrap_or_default().to_string());
         }
         Ok(scripted)
      }

      fn prompt_body(&self, _default: Option<&str>) -> Result<Option<String>> {
         pop(&self.bodies)
      }

      fn prompt_footer(&self, _default: Option<&str>) -> Result<Option<String>> {
         pop(&self.footers)
      }

      fn prompt_confirm(&self, _message: &str, _default: bool) -> Result<bool> {
         pop(&self.confirms)
      }

      fn prompt_empty_commit(&self) -> Result<bool> {
         pop(&self.confirms)
      }

      fn prompt_ai_usage(&self, _estimated_tokens: usize) -> Result<bool> {
         pop(&self.confirms)
      }

      fn prompt_ai_acceptance(&self, _rendered: &str) -> Result<AiAcceptance> {
         pop(&self.acceptances)
      }

      fn prompt_ai_edit_or_use_as_is(&self, _errors: &[ValidationIssue]) -> Result<bool> {
         pop(&self.edit_picks)
      }

      fn prompt_reject_choice(&self) -> Result<bool> {
         pop(&self.confirms)
      }

      fn prompt_commit_failure(&self) -> Result<CommitFailureChoice> {
         unimplemented!("not used by these tests")
      }
   }

   #[test]
   fn test_manual_collection_scenario_empty_commit() {
      // Mirrors the empty-repo scenario: chore, no scope, subject "init"
      let ui = ScriptedUi {
         types: RefCell::new(vec!["chore".to_string()]),
         scopes: RefCell::new(vec![None]),
         subjects: RefCell::new(vec!["init".to_string()]),
         bodies: RefCell::new(vec![None]),
         footers: RefCell::new(vec![None]),
         ..Default::default()
      };

      let msg = collect_manual_message(&ui, &Validator::new(), None, true).unwrap();
      assert_eq!(msg.ctype, "chore");
      assert_eq!(msg.subject, "init");
      assert!(msg.signoff);

      let identity = GitConfig {
         user_name: "Ada".to_string(),
         user_email: "ada@x".to_string(),
         ..Default::default()
      };
      assert_eq!(msg.format_body(&identity), "chore: init\n\nSigned-off-by: Ada <ada@x>");
   }

   #[test]
   fn test_manual_collection_uses_prefill() {
      let ui = ScriptedUi {
         types: RefCell::new(vec!["<preselect>".to_string()]),
         scopes: RefCell::new(vec![Some("<default>".to_string())]),
         subjects: RefCell::new(vec!["<default>".to_string()]),
         bodies: RefCell::new(vec![None]),
         footers: RefCell::new(vec![None]),
         ..Default::default()
      };

      let prefill = MessagePrefill {
         ctype: Some("fix".to_string()),
         scope: Some("core".to_string()),
         subject: Some("handle empty index".to_string()),
         ..Default::default()
      };
      let msg = collect_manual_message(&ui, &Validator::new(), Some(prefill), false).unwrap();
      assert_eq!(msg.ctype, "fix");
      assert_eq!(msg.scope.as_deref(), Some("core"));
      assert_eq!(msg.subject, "handle empty index");
      assert!(!msg.signoff);
   }

   #[test]
   fn test_manual_collection_propagates_cancel() {
      // Empty script: first prompt cancels
      let ui = ScriptedUi::default();
      let err = collect_manual_message(&ui, &Validator::new(), None, true).unwrap_err();
      assert!(matches!(err, GitcommError::Cancelled));
   }

   // === State-machine transitions that never touch git ===

   fn workflow<'a>(
      git: &'a Git,
      config: &'a FileConfig,
      ui: &'a ScriptedUi,
      flags: WorkflowFlags,
   ) -> Workflow<'a, ScriptedUi> {
      Workflow {
         git,
         config,
         ui,
         validator: Validator::new(),
         token: CancelToken::new(),
         flags,
         identity: GitConfig::default(),
         signer: CommitSigner::default(),
         broker: None,
      }
   }

   fn test_git() -> Git {
      Git::at(std::path::PathBuf::from("/nonexistent"))
   }

   #[test]
   fn test_parse_ai_valid_message_goes_to_acceptance() {
      let git = test_git();
      let config = FileConfig::default();
      let ui = ScriptedUi::default();
      let wf = workflow(&git, &config, &ui, WorkflowFlags::default());

      let step = wf
         .enter_parse_ai(RepositoryState::default(), "feat(api): add NewEndpoint".to_string(), 1)
         .unwrap();
      match step {
         Step::Next(State::ShowAi { msg, .. }) => {
            assert_eq!(msg.ctype, "feat");
            assert_eq!(msg.scope.as_deref(), Some("api"));
            assert_eq!(msg.subject, "add NewEndpoint");
            assert!(msg.signoff);
         },
         _ => panic!("expected ShowAi"),
      }
   }

   #[test]
   fn test_parse_ai_invalid_message_edit_carries_prefill() {
      let git = test_git();
      let config = FileConfig::default();
      let ui = ScriptedUi {
         edit_picks: RefCell::new(vec![true]),
         ..Default::default()
      };
      let wf = workflow(&git, &config, &ui, WorkflowFlags::default());

      // Missing colon: parses with empty type, fails validation
      let step = wf
         .enter_parse_ai(RepositoryState::default(), "feat add endpoint".to_string(), 1)
         .unwrap();
      match step {
         Step::Next(State::Manual { prefill: Some(prefill), .. }) => {
            assert_eq!(prefill.ctype, None);
            assert_eq!(prefill.subject.as_deref(), Some("feat add endpoint"));
         },
         _ => panic!("expected Manual with prefill"),
      }
   }

   #[test]
   fn test_parse_ai_invalid_message_use_as_is() {
      let git = test_git();
      let config = FileConfig::default();
      let ui = ScriptedUi {
         edit_picks: RefCell::new(vec![false]),
         ..Default::default()
      };
      let wf = workflow(&git, &config, &ui, WorkflowFlags::default());

      let step = wf
         .enter_parse_ai(RepositoryState::default(), "feat add endpoint".to_string(), 1)
         .unwrap();
      assert!(matches!(step, Step::Next(State::ShowAi { .. })));
   }

   #[test]
   fn test_show_ai_three_way() {
      let git = test_git();
      let config = FileConfig::default();
      let msg = CommitMessage::parse("fix: y");

      let ui = ScriptedUi {
         acceptances: RefCell::new(vec![
            AiAcceptance::UseAndCommit,
            AiAcceptance::UseAndEdit,
            AiAcceptance::Reject,
         ]),
         ..Default::default()
      };
      let wf = workflow(&git, &config, &ui, WorkflowFlags::default());

      let step = wf.enter_show_ai(RepositoryState::default(), msg.clone(), 1).unwrap();
      assert!(matches!(step, Step::Next(State::Commit { .. })));

      let step = wf.enter_show_ai(RepositoryState::default(), msg.clone(), 1).unwrap();
      assert!(matches!(step, Step::Next(State::Manual { prefill: Some(_), .. })));

      let step = wf.enter_show_ai(RepositoryState::default(), msg, 1).unwrap();
      assert!(matches!(step, Step::Next(State::Rejected { attempt: 1, .. })));
   }

   #[test]
   fn test_rejected_cap_forces_manual_without_prompting() {
      let git = test_git();
      let config = FileConfig::default();
      // Empty script: any prompt would return Cancelled, so reaching Manual
      // proves the user was not consulted
      let ui = ScriptedUi::default();
      let wf = workflow(&git, &config, &ui, WorkflowFlags::default());

      let step = wf.enter_rejected(RepositoryState::default(), MAX_AI_ATTEMPTS).unwrap();
      assert!(matches!(step, Step::Next(State::Manual { prefill: None, .. })));
   }

   #[test]
   fn test_rejected_new_ai_increments_attempt() {
      let git = test_git();
      let config = FileConfig::default();
      let ui = ScriptedUi { confirms: RefCell::new(vec![true]), ..Default::default() };
      let wf = workflow(&git, &config, &ui, WorkflowFlags::default());

      let step = wf.enter_rejected(RepositoryState::default(), 1).unwrap();
      assert!(matches!(step, Step::Next(State::CallAi { attempt: 2, .. })));
   }

   #[test]
   fn test_skip_ai_goes_manual() {
      let git = test_git();
      let config = FileConfig::default();
      let ui = ScriptedUi::default();
      let flags = WorkflowFlags { skip_ai: true, ..Default::default() };
      let wf = workflow(&git, &config, &ui, flags);

      let step = wf.enter_ask_ai(RepositoryState::default(), false).unwrap();
      assert!(matches!(step, Step::Next(State::Manual { prefill: None, .. })));
   }

   #[test]
   fn test_explicit_provider_declined_fallback_exits_with_provider_error() {
      let git = test_git();
      let config = FileConfig::default();
      // User declines the manual fallback
      let ui = ScriptedUi { confirms: RefCell::new(vec![false]), ..Default::default() };
      let flags = WorkflowFlags { provider: Some("openai".to_string()), ..Default::default() };
      let wf = workflow(&git, &config, &ui, flags);

      let err = wf.enter_ask_ai(RepositoryState::default(), false).unwrap_err();
      match &err {
         GitcommError::ProviderUnavailable { provider, .. } => {
            assert_eq!(provider, "openai");
         },
         other => panic!("unexpected error: {other}"),
      }
      assert_eq!(err.exit_code(), 3);
   }

   #[test]
   fn test_unconfigured_default_provider_goes_manual() {
      let git = test_git();
      let config = FileConfig::default();
      let ui = ScriptedUi::default();
      let wf = workflow(&git, &config, &ui, WorkflowFlags::default());

      let step = wf.enter_ask_ai(RepositoryState::default(), false).unwrap();
      assert!(matches!(step, Step::Next(State::Manual { prefill: None, .. })));
   }
}
