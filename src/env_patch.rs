//! Rewriting dotenv files for a slot.
//!
//! [`patch_env_content`] walks the file line by line. Lines that are not a
//! `UPPER_SNAKE=value` assignment, or whose variable has no rule, are copied
//! byte for byte (including their line ending). Patched values keep the
//! quote character they were written with.
//!
//! Only single-line values are understood. A patched value that opens a
//! quote it never closes, or ends in a backslash continuation, is rejected
//! rather than guessed at.

use crate::atomic::atomic_write;
use crate::config::{EnvFileConfig, PatchConfig, PatchKind};
use crate::error::{Error, Result};
use regex::{NoExpand, Regex};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

static ASSIGNMENT_REGEX: OnceLock<Regex> = OnceLock::new();
static REDIS_INDEX_REGEX: OnceLock<Regex> = OnceLock::new();
static URL_PORT_REGEX: OnceLock<Regex> = OnceLock::new();

fn assignment_regex() -> &'static Regex {
    ASSIGNMENT_REGEX.get_or_init(|| {
        Regex::new(r"^([A-Z_][A-Z0-9_]*)=(.*)$").expect("static regex pattern is valid")
    })
}

fn redis_index_regex() -> &'static Regex {
    REDIS_INDEX_REGEX
        .get_or_init(|| Regex::new(r"/\d+$").expect("static regex pattern is valid"))
}

fn url_port_regex() -> &'static Regex {
    URL_PORT_REGEX.get_or_init(|| Regex::new(r":\d+").expect("static regex pattern is valid"))
}

/// Values resolved for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchContext {
    pub db_name: String,
    pub redis_db: u32,
    pub ports: BTreeMap<String, u16>,
}

/// Whether `name` is an `UPPER_SNAKE_CASE` variable name the patcher recognizes.
pub fn is_env_var_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_uppercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Apply `patches` to dotenv `content`.
///
/// `port` rules whose variable is absent from the input are appended at the
/// end; the other rule types need an existing value and are skipped when
/// their variable is missing.
pub fn patch_env_content(
    content: &str,
    patches: &[PatchConfig],
    context: &PatchContext,
) -> Result<String> {
    let rules: HashMap<&str, &PatchConfig> = patches
        .iter()
        .map(|patch| (patch.var.as_str(), patch))
        .collect();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut output = String::with_capacity(content.len());

    for line in content.split_inclusive('\n') {
        let (body, ending) = split_line_ending(line);

        let patched = assignment_regex().captures(body).and_then(|caps| {
            let name = caps.get(1)?.as_str();
            let raw_value = caps.get(2)?.as_str();
            rules.get(name).map(|rule| (name, raw_value, *rule))
        });

        match patched {
            Some((name, raw_value, rule)) => {
                seen.insert(name);
                output.push_str(name);
                output.push('=');
                output.push_str(&patch_value(rule, raw_value, context)?);
            }
            None => output.push_str(body),
        }
        output.push_str(ending);
    }

    let missing_ports: Vec<&PatchConfig> = patches
        .iter()
        .filter(|patch| matches!(patch.kind, PatchKind::Port { .. }))
        .filter(|patch| !seen.contains(patch.var.as_str()))
        .collect();

    if !missing_ports.is_empty() {
        let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
        if !output.is_empty() && !output.ends_with('\n') {
            output.push_str(newline);
        }
        for patch in missing_ports {
            let port = lookup_port(patch, context)?;
            let _ = write!(output, "{}={}{}", patch.var, port, newline);
        }
    }

    Ok(output)
}

/// Unquoted value of the first assignment to `name`, if any.
pub fn read_env_value(content: &str, name: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let caps = assignment_regex().captures(line.trim_end_matches('\r'))?;
        if caps.get(1)?.as_str() != name {
            return None;
        }
        let (_, value) = unquote(caps.get(2)?.as_str());
        Some(value.to_string())
    })
}

/// Copy each configured env file from `source_root` to the same relative
/// path under `dest_root`, patched for `context`.
///
/// Sources that do not exist are skipped. Returns the files written.
pub fn copy_and_patch_all_env_files(
    files: &[EnvFileConfig],
    source_root: &Path,
    dest_root: &Path,
    context: &PatchContext,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    for file in files {
        let source = source_root.join(&file.source);

        // Directly try to read the file - avoid TOCTOU race
        let content = match fs::read_to_string(&source) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("Skipping {}: not present", source.display());
                continue;
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let patched = patch_env_content(&content, &file.patches, context)?;

        let dest = dest_root.join(&file.source);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        atomic_write(&dest, &patched)?;

        tracing::debug!(
            "Patched {} -> {} ({} rule(s))",
            source.display(),
            dest.display(),
            file.patches.len()
        );
        written.push(dest);
    }

    Ok(written)
}

fn split_line_ending(line: &str) -> (&str, &str) {
    if let Some(body) = line.strip_suffix("\r\n") {
        (body, "\r\n")
    } else if let Some(body) = line.strip_suffix('\n') {
        (body, "\n")
    } else {
        (line, "")
    }
}

/// Strip one layer of matching `"` or `'` quotes.
fn unquote(raw: &str) -> (Option<char>, &str) {
    for quote in ['"', '\''] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return (Some(quote), &raw[1..raw.len() - 1]);
        }
    }
    (None, raw)
}

fn patch_value(rule: &PatchConfig, raw: &str, context: &PatchContext) -> Result<String> {
    let (quote, value) = unquote(raw);

    if quote.is_none() {
        if let Some(open) = raw.chars().next().filter(|c| *c == '"' || *c == '\'') {
            if !raw[1..].contains(open) {
                return Err(Error::patch(
                    &rule.var,
                    "value opens a quote that is not closed on the same line; multi-line values are not supported",
                ));
            }
        }
    }
    if value.ends_with('\\') {
        return Err(Error::patch(
            &rule.var,
            "value ends with a line continuation; multi-line values are not supported",
        ));
    }

    let patched = match &rule.kind {
        PatchKind::Database => replace_database_name(value, &context.db_name),
        PatchKind::Redis => replace_redis_index(value, context.redis_db),
        PatchKind::Port { .. } => lookup_port(rule, context)?.to_string(),
        PatchKind::Url { .. } => {
            let port = lookup_port(rule, context)?;
            url_port_regex()
                .replace(value, NoExpand(&format!(":{}", port)))
                .into_owned()
        }
    };

    Ok(match quote {
        Some(q) => format!("{q}{patched}{q}"),
        None => patched,
    })
}

fn lookup_port(rule: &PatchConfig, context: &PatchContext) -> Result<u16> {
    let service = rule
        .service()
        .ok_or_else(|| Error::patch(&rule.var, "rule does not name a service"))?;
    context.ports.get(service).copied().ok_or_else(|| {
        Error::patch(
            &rule.var,
            format!("service '{}' has no port in this slot", service),
        )
    })
}

/// Swap the last path segment (before any `?query`) for `db_name`.
fn replace_database_name(value: &str, db_name: &str) -> String {
    let (base, query) = match value.find('?') {
        Some(index) => value.split_at(index),
        None => (value, ""),
    };
    let path_start = base.find("://").map_or(0, |index| index + 3);

    match base[path_start..].rfind('/') {
        Some(slash) => format!("{}{}{}", &base[..path_start + slash + 1], db_name, query),
        // `scheme://host:port` with no path yet
        None if path_start > 0 => format!("{}/{}{}", base, db_name, query),
        None => value.to_string(),
    }
}

/// Point a redis URL at logical database `index`.
///
/// A trailing `/<digits>` is replaced and a bare URL gets `/<index>`
/// appended. A URL already ending in `/` (`redis://h:6379/`) gets only the
/// digits, giving `redis://h:6379/3` rather than `redis://h:6379//3`.
fn replace_redis_index(value: &str, index: u32) -> String {
    if let Some(found) = redis_index_regex().find(value) {
        format!("{}/{}", &value[..found.start()], index)
    } else if value.ends_with('/') {
        format!("{}{}", value, index)
    } else {
        format!("{}/{}", value, index)
    }
}
