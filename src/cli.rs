use std::path::PathBuf;

use clap::Parser;

/// Interactive conventional-commit assistant for the current git repository.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "gitcomm", version, about)]
pub struct Args {
   /// Stage all unstaged files (including untracked) before committing
   #[arg(short = 'a', long = "add-all")]
   pub add_all: bool,

   /// Omit the Signed-off-by trailer
   #[arg(short = 's', long = "no-signoff")]
   pub no_signoff: bool,

   /// AI provider to use (must be configured)
   #[arg(long)]
   pub provider: Option<String>,

   /// Skip the AI path and go straight to manual input
   #[arg(long)]
   pub skip_ai: bool,

   /// Disable commit signing regardless of git config
   #[arg(long)]
   pub no_sign: bool,

   /// Config file path (default: ~/.gitcomm/config.yaml)
   #[arg(long)]
   pub config: Option<PathBuf>,

   /// Debug logging (raw text, no timestamps)
   #[arg(short = 'd', long)]
   pub debug: bool,

   /// Verbose output (no-op when --debug is set)
   #[arg(short = 'v', long)]
   pub verbose: bool,
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_defaults() {
      let args = Args::parse_from(["gitcomm"]);
      assert!(!args.add_all);
      assert!(!args.no_signoff);
      assert!(!args.skip_ai);
      assert!(args.provider.is_none());
      assert!(args.config.is_none());
   }

   #[test]
   fn test_short_flags() {
      let args = Args::parse_from(["gitcomm", "-a", "-s", "-d"]);
      assert!(args.add_all);
      assert!(args.no_signoff);
      assert!(args.debug);
   }

   #[test]
   fn test_provider_and_config() {
      let args =
         Args::parse_from(["gitcomm", "--provider", "anthropic", "--config", "/tmp/c.yaml"]);
      assert_eq!(args.provider.as_deref(), Some("anthropic"));
      assert_eq!(args.config.as_deref(), Some(std::path::Path::new("/tmp/c.yaml")));
   }
}
