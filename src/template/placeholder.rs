// src/template/placeholder.rs

use std::collections::BTreeSet;
use std::sync::LazyLock;

use anyhow::anyhow;
use regex::Regex;

use crate::errors::Result;

/// `{identifier}` where identifier is alphanumeric, `_` or `~`.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z0-9_~]+)\}").expect("placeholder regex is valid")
});

/// Replace every `{name}` in `template` for which `lookup` returns a value.
///
/// Placeholders with no value are left verbatim; unresolved names are normal
/// while a batch is still scheduling. Substituted text is never re-scanned,
/// so a value that itself contains `{...}` is inserted as-is.
pub fn substitute<F>(template: &str, mut lookup: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Every placeholder identifier appearing in `template`, deduplicated.
pub fn referenced_names(template: &str) -> BTreeSet<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Try to read a placeholder starting at the beginning of `s`.
///
/// Returns the identifier and the byte length of the whole `{identifier}`.
pub(crate) fn placeholder_at(s: &str) -> Option<(&str, usize)> {
    let caps = PLACEHOLDER.captures(s)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 {
        return None;
    }
    let name = caps.get(1)?.as_str();
    Some((name, whole.end()))
}

/// Quote `value` as a single POSIX shell word.
///
/// Used when a value is spliced into a `sh -c` command line so that its
/// content can never be split into extra words or read as operators.
pub fn quote(value: &str) -> Result<String> {
    shlex::try_quote(value)
        .map(|q| q.into_owned())
        .map_err(|e| anyhow!("cannot quote value for shell: {e}").into())
}
