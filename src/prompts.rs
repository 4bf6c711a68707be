//! Unified prompt generation.
//!
//! Every provider receives the same system and user message, rendered from
//! in-source tera templates with values taken from the validator and the
//! repository state. Output is deterministic: same inputs, identical bytes.

use std::sync::LazyLock;

use parking_lot::Mutex;
use serde::Serialize;
use tera::{Context, Tera};

use crate::{types::RepositoryState, validation::Validator};

const SYSTEM_TEMPLATE_NAME: &str = "system";
const USER_TEMPLATE_NAME: &str = "user";

const SYSTEM_TEMPLATE: &str = "\
You are generating a commit message for a git repository. The message must \
follow the Conventional Commits convention and pass this tool's validator.

Rules:
- Allowed types: {{ types }}
- Subject: required, non-empty, at most {{ subject_max }} characters
- Body: optional, at most {{ body_max }} characters
- Scope: optional; {{ scope_grammar }}

Output format:
type(scope): subject

optional body

optional footer

The scope and the parentheses are omitted when no scope applies. Respond with \
the commit message only, no surrounding prose or code fences.";

const USER_TEMPLATE: &str = "\
Generate a commit message for the following changes:
{% for file in staged %}
{{ file.header }}
{{ file.detail }}
{% endfor %}{% if staged | length == 0 %}{% for file in unstaged %}
{{ file.header }}
{% endfor %}{% endif %}";

/// The identical message pair handed to every provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
   pub system: String,
   pub user:   String,
}

impl PromptPair {
   /// Combined length, used for token estimation.
   pub fn combined(&self) -> String {
      format!("{}\n\n{}", self.system, self.user)
   }
}

#[derive(Serialize)]
struct FileSection {
   header: String,
   detail: String,
}

static TERA: LazyLock<Mutex<Tera>> = LazyLock::new(|| {
   let mut tera = Tera::default();
   tera
      .add_raw_template(SYSTEM_TEMPLATE_NAME, SYSTEM_TEMPLATE)
      .expect("system prompt template is well-formed");
   tera
      .add_raw_template(USER_TEMPLATE_NAME, USER_TEMPLATE)
      .expect("user prompt template is well-formed");
   tera.autoescape_on(vec![]);
   Mutex::new(tera)
});

/// Build the system+user pair for `state` under the validator's rules.
pub fn unified_prompt(validator: &Validator, state: &RepositoryState) -> PromptPair {
   let mut system_ctx = Context::new();
   system_ctx.insert("types", &validator.allowed_types().join(", "));
   system_ctx.insert("subject_max", &validator.subject_max_length());
   system_ctx.insert("body_max", &validator.body_max_length());
   system_ctx.insert("scope_grammar", validator.scope_grammar_description());

   let staged: Vec<FileSection> = state
      .staged_files
      .iter()
      .map(|f| FileSection {
         header: format!("{} ({})", f.path, f.status),
         detail: file_detail(f.binary, &f.diff),
      })
      .collect();
   // Unstaged files are listed (without diffs) only when nothing is staged
   let unstaged: Vec<FileSection> = state
      .unstaged_files
      .iter()
      .map(|f| FileSection {
         header: format!("{} ({})", f.path, f.status),
         detail: String::new(),
      })
      .collect();

   let mut user_ctx = Context::new();
   user_ctx.insert("staged", &staged);
   user_ctx.insert("unstaged", &unstaged);

   let tera = TERA.lock();
   let system = tera
      .render(SYSTEM_TEMPLATE_NAME, &system_ctx)
      .expect("system prompt renders from static template");
   let user = tera
      .render(USER_TEMPLATE_NAME, &user_ctx)
      .expect("user prompt renders from static template");

   PromptPair { system, user }
}

/// Diff text or a short descriptor for binary/empty entries. Oversize diffs
/// already arrive as metadata blocks from the diff layer.
fn file_detail(binary: bool, diff: &str) -> String {
   if binary {
      "(binary file)".to_string()
   } else if diff.trim().is_empty() {
      "(no diff available)".to_string()
   } else {
      diff.trim_end().to_string()
   }
}
