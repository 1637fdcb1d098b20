use std::fs::OpenOptions;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use color_eyre::eyre::{self, WrapErr};

use crate::cli::LogFormat;
use crate::password;

#[derive(clap::Args, Clone, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    command: UserCommand,
}

#[derive(clap::Subcommand, Clone, Debug)]
enum UserCommand {
    /// Add a user record to the credentials file, creating it if it doesn't exist.
    Add(AddUserArgs),
    /// Generate a user record and return it on stdout.
    ///
    /// If a password is not provided, it will be read from the first line piped to stdin.
    Generate {
        #[clap(short, long, default_value = "full")]
        log: LogFormat,

        /// The username of the user. Must be unique within the users file.
        username: String,

        /// The password for the user.
        ///
        /// If omitted, the password will be read from the first line on stdin.
        password: Option<String>,
    },
}

#[derive(clap::Args, Clone, Debug)]
struct AddUserArgs {
    #[clap(short, long, default_value = "full")]
    log: LogFormat,

    /// The file to write the generated user record to.
    ///
    /// If any parent directories in the path do not already exist, they will be created.
    #[clap(long, short = 'O', default_value = "users.toml")]
    output_file: PathBuf,

    /// The username of the user. Must be unique within the users file.
    username: String,

    /// The password for the user.
    ///
    /// If omitted, the password will be read from the first line on stdin.
    password: Option<String>,
}

impl UserArgs {
    pub fn log_format(&self) -> LogFormat {
        match &self.command {
            UserCommand::Add(args) => args.log,
            UserCommand::Generate { log, .. } => *log,
        }
    }
}

pub fn main(args: UserArgs) -> crate::Result<()> {
    match args.command {
        UserCommand::Generate {
            username, password, ..
        } => {
            let record = record(&username, password)?;
            println!("{record}");
            Ok(())
        }
        UserCommand::Add(args) => add(args),
    }
}

fn add(args: AddUserArgs) -> crate::Result<()> {
    let record = record(&args.username, args.password)?;

    if let Some(parent) = args.output_file.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("error creating {}", parent.display()))?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.output_file)
        .wrap_err_with(|| format!("error opening {}", args.output_file.display()))?;

    writeln!(file, "{record}")
        .wrap_err_with(|| format!("error writing to {}", args.output_file.display()))?;

    tracing::info!(
        username = args.username,
        "user record appended to {}",
        args.output_file.display()
    );

    Ok(())
}

/// Render one `[users."name"]` TOML table with a fresh argon2 hash.
fn record(username: &str, password: Option<String>) -> crate::Result<String> {
    let password = match password {
        Some(password) => password,
        None => read_password_from_stdin()?,
    };

    eyre::ensure!(!password.is_empty(), "password must not be empty");

    let hash = password::hash(password.as_bytes())?;

    Ok(format!(
        "[users.{username:?}]\npassword-hash = {hash:?}",
        hash = hash.as_str(),
    ))
}

/// NOTE: uses blocking I/O internally.
fn read_password_from_stdin() -> crate::Result<String> {
    let mut password = String::new();

    io::stdin()
        .lock()
        .read_line(&mut password)
        .wrap_err("error reading password from stdin")?;

    Ok(password.trim_end_matches(['\r', '\n']).to_owned())
}
