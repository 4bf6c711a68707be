use std::panic::{AssertUnwindSafe, catch_unwind};

use clap::Parser;
use gitcomm::{
   cli::Args,
   config::FileConfig,
   error::{GitcommError, Result},
   git::Git,
   logging, style,
   signals::SignalBroker,
   types::CommitSigner,
   ui::TerminalUi,
   validation::Validator,
   workflow::{Outcome, Workflow, WorkflowFlags},
};

fn main() {
   let code = match catch_unwind(AssertUnwindSafe(run)) {
      Ok(Ok(code)) => code,
      Ok(Err(e)) => {
         eprintln!("{} {e}", style::error("Error:"));
         e.exit_code()
      },
      Err(_) => {
         eprintln!("{} internal error", style::error("Error:"));
         1
      },
   };
   std::process::exit(code);
}

fn run() -> Result<i32> {
   let args = Args::parse();
   logging::init(args.debug, args.verbose);
   dotenvy::dotenv().ok();

   let config = FileConfig::load(args.config.as_deref())?;
   if let Some(name) = &args.provider
      && config.provider(name).is_none()
   {
      return Err(GitcommError::Config(format!(
         "provider '{name}' is not present in the config file"
      )));
   }

   // The handler must exist before the first blocking operation
   let broker = SignalBroker::install()?;
   let token = broker.token();

   let cwd = std::env::current_dir()?;
   let git = Git::open(&cwd, &token)?;
   let identity = git.read_git_config(&token)?;
   let signer = CommitSigner::derive(&identity, args.no_sign);

   let validator = Validator::new();
   let ui = TerminalUi::new(validator);
   let workflow = Workflow {
      git: &git,
      config: &config,
      ui: &ui,
      validator,
      token,
      flags: WorkflowFlags {
         auto_stage:        args.add_all,
         include_untracked: args.add_all,
         skip_ai:           args.skip_ai,
         no_signoff:        args.no_signoff,
         provider:          args.provider.clone(),
      },
      identity,
      signer,
      broker: Some(&broker),
   };

   match workflow.run()? {
      Outcome::Committed { .. } => Ok(0),
      Outcome::AbortedNoChanges => {
         println!("Nothing to commit.");
         Ok(0)
      },
      Outcome::AbortedByUser => {
         println!("Commit cancelled.");
         Ok(1)
      },
   }
}
