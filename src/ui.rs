//! Interactive prompt layer.
//!
//! Each prompt renders one compact inline form and, on success, echoes a
//! single `✓ <title>: <value>` confirmation line. Ctrl-C and Escape abort
//! with `Cancelled` so the orchestrator can restore the staging snapshot.

use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};

use crate::{
   error::{GitcommError, Result},
   style,
   types::{AiAcceptance, CommitFailureChoice},
   validation::{ValidationIssue, Validator, is_valid_scope},
};

/// The prompt operations the orchestrator consumes. Implemented by the
/// terminal layer; tests substitute a scripted double.
pub trait Interact {
   fn prompt_type(&self, preselect: Option<&str>) -> Result<String>;
   fn prompt_scope(&self, default: Option<&str>) -> Result<Option<String>>;
   fn prompt_subject(&self, default: Option<&str>) -> Result<String>;
   fn prompt_body(&self, default: Option<&str>) -> Result<Option<String>>;
   fn prompt_footer(&self, default: Option<&str>) -> Result<Option<String>>;
   fn prompt_confirm(&self, message: &str, default: bool) -> Result<bool>;
   fn prompt_empty_commit(&self) -> Result<bool>;
   fn prompt_ai_usage(&self, estimated_tokens: usize) -> Result<bool>;
   fn prompt_ai_acceptance(&self, rendered: &str) -> Result<AiAcceptance>;
   /// When AI output fails validation: true = edit, false = use as-is.
   fn prompt_ai_edit_or_use_as_is(&self, errors: &[ValidationIssue]) -> Result<bool>;
   /// After a rejection: true = new AI message, false = manual input.
   fn prompt_reject_choice(&self) -> Result<bool>;
   fn prompt_commit_failure(&self) -> Result<CommitFailureChoice>;
}

/// Dialoguer-backed implementation.
pub struct TerminalUi {
   validator: Validator,
}

impl TerminalUi {
   pub const fn new(validator: Validator) -> Self {
      Self { validator }
   }
}

/// Echo the confirmation line for a completed prompt. Long or multi-line
/// values are elided with an ellipsis.
fn confirm_line(title: &str, value: &str) {
   let shown = elide(value, style::term_width().saturating_sub(title.len() + 4));
   println!("{} {}: {}", style::success(style::icons::SUCCESS), title, shown);
}

/// Single-line preview of a value, capped at `max` characters.
pub fn elide(value: &str, max: usize) -> String {
   let mut first_line = value.lines().next().unwrap_or_default().to_string();
   let multiline = value.lines().count() > 1;

   if first_line.chars().count() > max.saturating_sub(3) {
      first_line = first_line.chars().take(max.saturating_sub(3)).collect();
      first_line.push_str("...");
   } else if multiline {
      first_line.push_str("...");
   }
   first_line
}

fn map_dialoguer(err: dialoguer::Error) -> GitcommError {
   let dialoguer::Error::IO(io_err) = err;
   if io_err.kind() == std::io::ErrorKind::Interrupted {
      GitcommError::Cancelled
   } else {
      GitcommError::Io(io_err)
   }
}

/// A `None` from `interact_opt` means the user hit Escape.
fn require<T>(value: Option<T>) -> Result<T> {
   value.ok_or(GitcommError::Cancelled)
}

impl Interact for TerminalUi {
   fn prompt_type(&self, preselect: Option<&str>) -> Result<String> {
      let types = self.validator.allowed_types();
      let initial = preselect
         .and_then(|p| types.iter().position(|t| *t == p))
         .unwrap_or(0);

      let picked = Select::with_theme(&ColorfulTheme::default())
         .with_prompt("Commit type")
         .items(types)
         .default(initial)
         .interact_opt()
         .map_err(map_dialoguer)?;
      let index = require(picked)?;

      let value = types[index].to_string();
      confirm_line("Type", &value);
      Ok(value)
   }

   fn prompt_scope(&self, default: Option<&str>) -> Result<Option<String>> {
      let theme = ColorfulTheme::default();
      let mut input = Input::<String>::with_theme(&theme)
         .with_prompt("Scope (optional)")
         .allow_empty(true)
         .validate_with(|s: &String| {
            if s.trim().is_empty() || is_valid_scope(s.trim()) {
               Ok(())
            } else {
               Err("scope may contain only alphanumerics, '-' and '_'")
            }
         });
      if let Some(default) = default {
         input = input.default(default.to_string());
      }

      let value = input.interact_text().map_err(map_dialoguer)?;
      let value = value.trim().to_string();
      if value.is_empty() {
         confirm_line("Scope", "(none)");
         Ok(None)
      } else {
         confirm_line("Scope", &value);
         Ok(Some(value))
      }
   }

   fn prompt_subject(&self, default: Option<&str>) -> Result<String> {
      let theme = ColorfulTheme::default();
      let mut input = Input::<String>::with_theme(&theme)
         .with_prompt("Subject")
         .validate_with(|s: &String| {
            // Re-asks until non-empty; length overruns are advisory only
            if s.trim().is_empty() {
               Err("subject must not be empty")
            } else {
               Ok(())
            }
         });
      if let Some(default) = default {
         input = input.default(default.to_string());
      }

      let value = input.interact_text().map_err(map_dialoguer)?;
      let value = value.trim().to_string();
      confirm_line("Subject", &value);
      Ok(value)
   }

   fn prompt_body(&self, default: Option<&str>) -> Result<Option<String>> {
      let theme = ColorfulTheme::default();
      let mut input = Input::<String>::with_theme(&theme)
         .with_prompt("Body (optional)")
         .allow_empty(true);
      if let Some(default) = default {
         input = input.default(default.to_string());
      }

      let value = input.interact_text().map_err(map_dialoguer)?;
      let value = value.trim().to_string();
      if value.is_empty() {
         confirm_line("Body", "(none)");
         Ok(None)
      } else {
         confirm_line("Body", &value);
         Ok(Some(value))
      }
   }

   fn prompt_footer(&self, default: Option<&str>) -> Result<Option<String>> {
      let theme = ColorfulTheme::default();
      let mut input = Input::<String>::with_theme(&theme)
         .with_prompt("Footer (optional)")
         .allow_empty(true);
      if let Some(default) = default {
         input = input.default(default.to_string());
      }

      let value = input.interact_text().map_err(map_dialoguer)?;
      let value = value.trim().to_string();
      if value.is_empty() {
         confirm_line("Footer", "(none)");
         Ok(None)
      } else {
         confirm_line("Footer", &value);
         Ok(Some(value))
      }
   }

   fn prompt_confirm(&self, message: &str, default: bool) -> Result<bool> {
      let answer = Confirm::with_theme(&ColorfulTheme::default())
         .with_prompt(message)
         .default(default)
         .interact_opt()
         .map_err(map_dialoguer)?;
      let answer = require(answer)?;
      confirm_line("Confirm", if answer { "yes" } else { "no" });
      Ok(answer)
   }

   fn prompt_empty_commit(&self) -> Result<bool> {
      self.prompt_confirm("No changes detected. Create an empty commit?", false)
   }

   fn prompt_ai_usage(&self, estimated_tokens: usize) -> Result<bool> {
      self.prompt_confirm(
         &format!("Generate the message with AI? (~{estimated_tokens} tokens)"),
         true,
      )
   }

   fn prompt_ai_acceptance(&self, rendered: &str) -> Result<AiAcceptance> {
      println!("{}", style::framed_message("Proposed commit", rendered, style::term_width()));

      let picked = Select::with_theme(&ColorfulTheme::default())
         .with_prompt("Use this message?")
         .items(&["Commit as-is", "Edit before committing", "Reject"])
         .default(0)
         .interact_opt()
         .map_err(map_dialoguer)?;

      let choice = match require(picked)? {
         0 => AiAcceptance::UseAndCommit,
         1 => AiAcceptance::UseAndEdit,
         _ => AiAcceptance::Reject,
      };
      let label = match choice {
         AiAcceptance::UseAndCommit => "commit as-is",
         AiAcceptance::UseAndEdit => "edit",
         AiAcceptance::Reject => "reject",
      };
      confirm_line("AI message", label);
      Ok(choice)
   }

   fn prompt_ai_edit_or_use_as_is(&self, errors: &[ValidationIssue]) -> Result<bool> {
      println!("{}", style::warning("The generated message failed validation:"));
      for issue in errors {
         println!("  {} {}", style::warning("-"), issue);
      }

      let picked = Select::with_theme(&ColorfulTheme::default())
         .with_prompt("How should this be handled?")
         .items(&["Edit the message", "Use it as-is (with warning)"])
         .default(0)
         .interact_opt()
         .map_err(map_dialoguer)?;
      let wants_edit = require(picked)? == 0;
      confirm_line("Validation", if wants_edit { "edit" } else { "use as-is" });
      Ok(wants_edit)
   }

   fn prompt_reject_choice(&self) -> Result<bool> {
      let picked = Select::with_theme(&ColorfulTheme::default())
         .with_prompt("Message rejected")
         .items(&["Generate a new AI message", "Write the message manually"])
         .default(0)
         .interact_opt()
         .map_err(map_dialoguer)?;
      let new_ai = require(picked)? == 0;
      confirm_line("Next", if new_ai { "new AI message" } else { "manual input" });
      Ok(new_ai)
   }

   fn prompt_commit_failure(&self) -> Result<CommitFailureChoice> {
      let picked = Select::with_theme(&ColorfulTheme::default())
         .with_prompt("Commit failed")
         .items(&["Retry with the same message", "Edit the message", "Cancel"])
         .default(0)
         .interact_opt()
         .map_err(map_dialoguer)?;

      let choice = match require(picked)? {
         0 => CommitFailureChoice::Retry,
         1 => CommitFailureChoice::Edit,
         _ => CommitFailureChoice::Cancel,
      };
      let label = match choice {
         CommitFailureChoice::Retry => "retry",
         CommitFailureChoice::Edit => "edit",
         CommitFailureChoice::Cancel => "cancel",
      };
      confirm_line("Commit failure", label);
      Ok(choice)
   }
}
