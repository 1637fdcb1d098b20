use clap::Parser;

use run::RunArgs;

use crate::cli::user::UserArgs;

pub mod run;

pub mod user;

/// An embeddable MQTT 3.1.1 broker.
#[derive(clap::Parser, Debug)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Start the MQTT broker.
    Run(RunArgs),
    /// Manage user credentials for connecting to the broker.
    User(UserArgs),
}

#[derive(clap::ValueEnum, Debug, Copy, Clone)]
pub enum LogFormat {
    /// Emit human-readable single line logs for each event.
    Full,
    /// A variant of full, optimized for shorter line lengths.
    Compact,
    /// Format events in multi-line very "prettified" form.
    Pretty,
    /// Emit JSON-lines formatted events.
    Json,
}

impl Args {
    pub fn log_format(&self) -> LogFormat {
        match &self.command {
            Command::Run(args) => args.log,
            Command::User(args) => args.log_format(),
        }
    }
}

pub fn main() -> crate::Result<()> {
    let args = Args::parse();

    crate::bootstrap(args.log_format())?;

    tracing::debug!("Parsed arguments: {args:?}");

    match args.command {
        Command::Run(args) => run::main(args),
        Command::User(args) => user::main(args),
    }
}
