//! Shared AWS files: `~/.aws/config` and `~/.aws/credentials`.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use super::config::Credentials;
use crate::error::BackendError;

/// Settings of one named profile, merged from both shared files.
#[derive(Debug, Default)]
pub(crate) struct Profile {
    values: HashMap<String, String>,
}

impl Profile {
    /// Load `name` from whichever of the two files exist.
    ///
    /// The credentials file wins over the config file for keys set in both.
    pub(crate) fn load(
        credentials_file: Option<&Path>,
        config_file: Option<&Path>,
        name: &str,
    ) -> Result<Self, BackendError> {
        let mut values = HashMap::new();
        if let Some(text) = read_optional(config_file)? {
            values.extend(parse_section(&text, name, true));
        }
        if let Some(text) = read_optional(credentials_file)? {
            values.extend(parse_section(&text, name, false));
        }
        Ok(Self { values })
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Static keys, if the profile holds a complete pair.
    pub(crate) fn credentials(&self) -> Option<Credentials> {
        Some(Credentials::new(
            self.get("aws_access_key_id")?,
            self.get("aws_secret_access_key")?,
            self.get("aws_session_token").map(str::to_string),
        ))
    }
}

fn read_optional(path: Option<&Path>) -> Result<Option<String>, BackendError> {
    let Some(path) = path else {
        return Ok(None);
    };
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(BackendError::Config(format!("{}: {e}", path.display()))),
    }
}

/// Key/value pairs under `[profile]` in an INI-style AWS file.
///
/// In the config file every profile but `default` is written
/// `[profile name]`.
fn parse_section(text: &str, profile: &str, config_file: bool) -> HashMap<String, String> {
    let mut values = HashMap::new();
    let mut inside = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            inside = section_matches(header.trim(), profile, config_file);
            continue;
        }
        if !inside {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            values.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    values
}

fn section_matches(header: &str, profile: &str, config_file: bool) -> bool {
    if !config_file {
        return header == profile;
    }
    match header.strip_prefix("profile") {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim() == profile,
        _ => header == "default" && profile == "default",
    }
}
