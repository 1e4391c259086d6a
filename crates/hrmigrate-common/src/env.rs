//! Environment variable helpers
//!
//! Every configuration struct in the workspace is populated from the
//! process environment. A variable that is unset falls back to its default;
//! a variable that is set but unparsable is an error rather than a silent
//! fallback.

use std::str::FromStr;

use crate::error::{HrError, Result};

/// Read a string variable, or `default` when unset.
pub fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

/// Read an optional string variable. Empty values count as unset.
pub fn var_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a variable into `T`, or `default` when unset.
pub fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T> {
    match var_opt(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| HrError::InvalidEnv {
            name: name.to_string(),
            value: raw,
        }),
    }
}

/// Parse a variable into `T`, failing when it is missing.
pub fn parse_required<T: FromStr>(name: &str) -> Result<T> {
    let raw = var_opt(name).ok_or_else(|| HrError::config(format!("{name} is not set")))?;
    raw.trim().parse().map_err(|_| HrError::InvalidEnv {
        name: name.to_string(),
        value: raw,
    })
}
