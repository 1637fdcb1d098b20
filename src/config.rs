use std::path::Path;
use std::{fs, io};

use color_eyre::eyre::WrapErr;
use serde::de::DeserializeOwned;

use crate::collections::HashMap;

/// User credentials accepted by the broker, keyed by username.
#[derive(serde::Deserialize, Default)]
pub struct Users {
    #[serde(default)]
    pub users: HashMap<String, User>,
}

#[derive(serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct User {
    /// PHC-format argon2 hash, as produced by `relaymq user`.
    pub password_hash: String,
}

/// NOTE: uses blocking I/O internally.
pub fn read_users(path: &Path) -> crate::Result<Users> {
    read_toml("users", path)
}

fn read_toml<T: DeserializeOwned>(name: &str, path: &Path) -> crate::Result<T> {
    let config_toml = if path == Path::new("-") {
        io::read_to_string(io::stdin().lock()).wrap_err("error reading from stdin")?
    } else {
        fs::read_to_string(path)
            .wrap_err_with(|| format!("error reading from {}", path.display()))?
    };

    toml::from_str(&config_toml)
        .wrap_err_with(|| format!("error parsing {name} from {}", path.display()))
}
