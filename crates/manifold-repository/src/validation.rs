//! Name and argument checks shared by the transformers.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{RepoResult, RepositoryError};

/// Longest accepted application name.
pub const MAX_APPLICATION_NAME_LEN: usize = 39;

static NAME_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$"));

fn matches_name(name: &str) -> RepoResult<bool> {
    match &*NAME_PATTERN {
        Ok(re) => Ok(re.is_match(name)),
        Err(e) => Err(RepositoryError::validation(format!("invalid name pattern: {e}"))),
    }
}

/// Environment names: lowercase alphanumerics separated by single dashes.
pub fn environment_name(name: &str) -> RepoResult<()> {
    if !matches_name(name)? {
        return Err(RepositoryError::validation(format!(
            "invalid environment name {name:?}: must match [a-z0-9]+(-[a-z0-9]+)*"
        )));
    }
    Ok(())
}

/// Application names: same pattern as environments, at most 39 characters.
pub fn application_name(name: &str) -> RepoResult<()> {
    if !matches_name(name)? {
        return Err(RepositoryError::validation(format!(
            "invalid application name {name:?}: must match [a-z0-9]+(-[a-z0-9]+)*"
        )));
    }
    if name.len() > MAX_APPLICATION_NAME_LEN {
        return Err(RepositoryError::validation(format!(
            "invalid application name {name:?}: longer than {MAX_APPLICATION_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// Lock ids are the last key segment, so any non-empty string works.
pub fn lock_id(value: &str) -> RepoResult<()> {
    if value.is_empty() {
        return Err(RepositoryError::validation("lock id must not be empty"));
    }
    Ok(())
}

/// Team and group names end up inside composite keys.
pub fn key_segment(kind: &str, value: &str) -> RepoResult<()> {
    if value.is_empty() {
        return Err(RepositoryError::validation(format!("{kind} must not be empty")));
    }
    if value.contains('/') {
        return Err(RepositoryError::validation(format!(
            "{kind} {value:?} must not contain '/'"
        )));
    }
    Ok(())
}
