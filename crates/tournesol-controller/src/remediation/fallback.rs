/*
 * Copyright (c) 2025 Dylan Storey
 * Licensed under the Elastic License 2.0.
 * See LICENSE file in the project root for full license text.
 */

//! # Local Memory-Limit Heuristic
//!
//! Deterministic remediation used when the inference endpoint cannot help.
//! It only understands out-of-memory problems and only touches one key path,
//! `resources.limits.memory`, inside YAML files declaring `kind: Deployment`.
//!
//! The edit is a line-oriented text transform that follows indentation to
//! stay inside the right block. It does not parse YAML, so anything it does
//! not recognise (flow mappings, anchors, multi-document files with several
//! Deployments sharing a file) is either left alone or patched uniformly.

use crate::models::{FileUpdate, SourceFiles};
use tournesol_utils::logging::prelude::*;

/// Limit written when the current one is missing, unreadable or tiny.
pub const SAFE_DEFAULT_LIMIT: &str = "256Mi";
/// Values below this number (whatever the unit) are replaced outright.
pub const MIN_LIMIT: u64 = 64;
const SCALE_FACTOR: f64 = 1.5;

/// Whether the solution text describes an out-of-memory kill.
pub fn is_oom(solution: &str) -> bool {
    let lower = solution.to_lowercase();
    lower.contains("oomkilled") || lower.contains("out of memory")
}

/// Proposes raised memory limits for every Deployment manifest in `files`.
/// Returns nothing unless `solution` mentions an out-of-memory condition.
pub fn propose(files: &SourceFiles, solution: &str) -> Vec<FileUpdate> {
    if !is_oom(solution) {
        info!("Fallback: solution does not describe an OOM condition, no updates");
        return Vec::new();
    }

    let mut updates = Vec::new();
    for (path, content) in files {
        if !is_yaml(path) || !is_deployment(content) {
            continue;
        }

        let current = current_memory_limit(content);
        let target = compute_target(current.as_deref());
        let patched = set_memory_limit(content, &target);

        if patched == *content {
            debug!("Fallback: {} has no memory limit to raise", path);
            continue;
        }
        info!(
            "Fallback: raising memory limit in {} from {} to {}",
            path,
            current.as_deref().unwrap_or("<unset>"),
            target
        );
        updates.push(FileUpdate::new(path.clone(), patched));
    }

    info!("Fallback produced {} file updates", updates.len());
    updates
}

/// New limit for a current `resources.limits.memory` value.
///
/// Missing, unparsable or below [`MIN_LIMIT`] gives [`SAFE_DEFAULT_LIMIT`];
/// anything else is scaled by 1.5 keeping its unit (`128Mi` -> `192Mi`).
pub fn compute_target(current: Option<&str>) -> String {
    let Some(value) = current else {
        return SAFE_DEFAULT_LIMIT.to_string();
    };

    let digits_end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    let (number, unit) = value.split_at(digits_end);

    match number.parse::<u64>() {
        Ok(n) if n >= MIN_LIMIT => {
            format!("{}{}", (n as f64 * SCALE_FACTOR) as u64, unit)
        }
        _ => SAFE_DEFAULT_LIMIT.to_string(),
    }
}

/// First `resources.limits.memory` value in `content`, unquoted.
pub fn current_memory_limit(content: &str) -> Option<String> {
    let lines: Vec<&str> = content.split('\n').collect();
    memory_limit_lines(&lines)
        .first()
        .map(|&idx| memory_value(lines[idx]))
}

/// Rewrites every `resources.limits.memory` line to `target`, keeping its
/// indentation. Content without such a line is returned unchanged.
pub fn set_memory_limit(content: &str, target: &str) -> String {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    let borrowed: Vec<&str> = lines.iter().map(String::as_str).collect();
    let targets = memory_limit_lines(&borrowed);

    for idx in targets {
        let line = &lines[idx];
        let indent = &line[..line.len() - line.trim_start().len()];
        let eol = if line.ends_with('\r') { "\r" } else { "" };
        let replacement = format!("{}memory: {}{}", indent, target, eol);
        lines[idx] = replacement;
    }
    lines.join("\n")
}

fn is_yaml(path: &str) -> bool {
    path.ends_with(".yaml") || path.ends_with(".yml")
}

fn is_deployment(content: &str) -> bool {
    content.lines().any(|line| {
        line.trim_start()
            .strip_prefix("kind:")
            .map(|rest| scalar(rest) == "Deployment")
            .unwrap_or(false)
    })
}

/// Indices of the `memory:` lines nested under `resources:` then `limits:`.
fn memory_limit_lines(lines: &[&str]) -> Vec<usize> {
    let mut found = Vec::new();
    let mut resources: Option<usize> = None;
    let mut limits: Option<usize> = None;

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim_start();
        let body = trimmed.trim_end();
        if body.is_empty() || body.starts_with('#') {
            continue;
        }
        let indent = line.len() - trimmed.len();

        // A line at or above a block's own indentation closes it.
        if limits.is_some_and(|l| indent <= l) {
            limits = None;
        }
        if resources.is_some_and(|r| indent <= r) {
            resources = None;
            limits = None;
        }

        if is_block_key(body, "resources") {
            resources = Some(indent);
        } else if resources.is_some() && limits.is_none() && is_block_key(body, "limits") {
            limits = Some(indent);
        } else if limits.is_some() && body.starts_with("memory:") {
            found.push(idx);
        }
    }
    found
}

fn is_block_key(body: &str, key: &str) -> bool {
    body.strip_prefix(key)
        .and_then(|rest| rest.strip_prefix(':'))
        .map(|rest| {
            let rest = rest.trim();
            rest.is_empty() || rest.starts_with('#')
        })
        .unwrap_or(false)
}

fn memory_value(line: &str) -> String {
    scalar(line.trim().trim_start_matches("memory:")).to_string()
}

/// Plain scalar after a `key:`, without trailing comment or quotes.
fn scalar(rest: &str) -> &str {
    let value = match rest.find(" #") {
        Some(pos) => &rest[..pos],
        None => rest,
    };
    value.trim().trim_matches(|c| c == '"' || c == '\'')
}
