//! Fns to read variables from the environment more conveniently.

use std::env;

use lazy_static::lazy_static;
use tracing::debug;

const SECRET_LOG_BLACKLIST: [&str; 1] = ["DUNE_PASSWORD"];

lazy_static! {
    pub static ref ENV_CONFIG: EnvConfig = get_env_config();
}

/// Keeps the last four characters of a secret, enough to tell two values apart in logs.
pub fn obfuscate(value: &str) -> String {
    let last_four_start = value
        .char_indices()
        .rev()
        .nth(3)
        .map_or(0, |(index, _)| index);
    format!("****{}", &value[last_four_start..])
}

fn obfuscate_if_secret(blacklist: &[&str], key: &str, value: &str) -> String {
    if blacklist.contains(&key) {
        obfuscate(value)
    } else {
        value.to_string()
    }
}

/// Get an environment variable, encoding found or missing as Option, and panic otherwise.
pub fn get_env_var(key: &str) -> Option<String> {
    let var = match env::var(key) {
        Err(env::VarError::NotPresent) => None,
        Err(e) => panic!("{e}"),
        Ok(var) => Some(var),
    };

    if let Some(ref existing_var) = var {
        let output = obfuscate_if_secret(&SECRET_LOG_BLACKLIST, key, existing_var);
        debug!("env var {key}: {output}");
    } else {
        debug!("env var {key} requested but not found")
    };

    var
}

pub fn get_env_bool(key: &str) -> Option<bool> {
    get_env_var(key).map(|var| match var.to_lowercase().as_str() {
        "true" => true,
        "false" => false,
        "t" => true,
        "f" => false,
        "1" => true,
        "0" => false,
        str => panic!("invalid bool value {str} for {key}"),
    })
}

pub struct EnvConfig {
    pub dune_password: Option<String>,
    pub dune_user: Option<String>,
    pub log_json: bool,
    pub log_perf: bool,
    pub sql_dir: String,
}

pub fn get_env_config() -> EnvConfig {
    EnvConfig {
        dune_password: get_env_var("DUNE_PASSWORD"),
        dune_user: get_env_var("DUNE_USER"),
        log_json: get_env_bool("LOG_JSON").unwrap_or(false),
        log_perf: get_env_bool("LOG_PERF").unwrap_or(false),
        sql_dir: get_env_var("DUNE_SQL_DIR").unwrap_or_else(|| "sql".to_string()),
    }
}
