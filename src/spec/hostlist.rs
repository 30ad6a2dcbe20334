//! Slurm-style host list expansion.
//!
//! "node-[1-3]"        => node-1, node-2, node-3
//! "n[01-02]-[a,b]"    => n01-a, n01-b, n02-a, n02-b
//! "login,c[7-8]"      => login, c7, c8
//!
//! Order follows the pattern (left-most bracket group varies slowest); names are
//! never sorted. Repeated names are dropped, keeping the first occurrence.

use crate::Result;
use crate::error::invalid;
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Upper bound on a single numeric range, mirroring the usual hostlist limit.
const MAX_RANGE: u64 = 100_000;

fn range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([0-9]+)-([0-9]+)$").expect("static regex"))
}

/// Expand one pattern string into its ordered list of names.
pub fn expand(pattern: &str) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for part in split_top_level(pattern)? {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        for name in expand_part(part, pattern)? {
            if seen.insert(name.clone()) {
                out.push(name);
            }
        }
    }
    Ok(out)
}

/// Split on commas that are not inside a bracket group.
pub(crate) fn split_top_level(pattern: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in pattern.char_indices() {
        match c {
            '[' => {
                if depth > 0 {
                    invalid!("nested '[' in host list pattern {:?}", pattern);
                }
                depth += 1;
            }
            ']' => {
                if depth == 0 {
                    invalid!("unbalanced ']' in host list pattern {:?}", pattern);
                }
                depth -= 1;
            }
            ',' if depth == 0 => {
                parts.push(&pattern[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        invalid!("missing ']' in host list pattern {:?}", pattern);
    }
    parts.push(&pattern[start..]);
    Ok(parts)
}

fn expand_part(part: &str, pattern: &str) -> Result<Vec<String>> {
    let Some(open) = part.find('[') else {
        return Ok(vec![part.to_string()]);
    };
    let close = match part[open..].find(']') {
        Some(off) => open + off,
        None => invalid!("missing ']' in host list pattern {:?}", pattern),
    };

    let prefix = &part[..open];
    let choices = expand_brackets(&part[open + 1..close], pattern)?;
    let suffixes = expand_part(&part[close + 1..], pattern)?;

    let mut out = Vec::with_capacity(choices.len() * suffixes.len());
    for choice in &choices {
        for suffix in &suffixes {
            out.push(format!("{}{}{}", prefix, choice, suffix));
        }
    }
    Ok(out)
}

/// Expand the body of one bracket group: "1-3,7,09-10".
fn expand_brackets(body: &str, pattern: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for item in body.split(',') {
        let item = item.trim();
        if item.is_empty() {
            invalid!("empty range element in host list pattern {:?}", pattern);
        }
        if let Some(caps) = range_re().captures(item) {
            let lo_str = &caps[1];
            let lo: u64 = lo_str.parse().map_err(|_| {
                crate::CompileError::validation(format!("bad range {:?} in {:?}", item, pattern))
            })?;
            let hi: u64 = caps[2].parse().map_err(|_| {
                crate::CompileError::validation(format!("bad range {:?} in {:?}", item, pattern))
            })?;
            if hi < lo {
                invalid!("descending range {:?} in host list pattern {:?}", item, pattern);
            }
            if hi - lo >= MAX_RANGE {
                invalid!("range {:?} in {:?} is too large", item, pattern);
            }
            let width = lo_str.len();
            out.extend((lo..=hi).map(|n| format!("{:0width$}", n, width = width)));
        } else if item.contains('-') {
            invalid!("bad range {:?} in host list pattern {:?}", item, pattern);
        } else {
            out.push(item.to_string());
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(p: &str) -> Vec<String> {
        expand(p).unwrap()
    }

    #[test]
    fn plain_name_is_kept() {
        assert_eq!(names("login"), vec!["login"]);
    }

    #[test]
    fn numeric_range_in_declared_order() {
        assert_eq!(names("node-[1-3]"), vec!["node-1", "node-2", "node-3"]);
        assert_eq!(names("[10002]"), vec!["10002"]);
    }

    #[test]
    fn padded_range_keeps_width() {
        assert_eq!(names("n[08-10]"), vec!["n08", "n09", "n10"]);
    }

    #[test]
    fn multiple_groups_left_most_slowest() {
        assert_eq!(
            names("n[1-2]-[a,b]"),
            vec!["n1-a", "n1-b", "n2-a", "n2-b"]
        );
    }

    #[test]
    fn top_level_commas_and_duplicates() {
        assert_eq!(names("c[2,1],login,c1"), vec!["c2", "c1", "login"]);
    }

    #[test]
    fn expansion_is_deterministic() {
        assert_eq!(names("s-[1-4]-[10001-10002]"), names("s-[1-4]-[10001-10002]"));
    }

    #[test]
    fn malformed_brackets_are_rejected() {
        assert!(expand("node-[1-3").is_err());
        assert!(expand("node-1]").is_err());
        assert!(expand("node-[[1]]").is_err());
        assert!(expand("node-[3-1]").is_err());
        assert!(expand("node-[a-b]").is_err());
        assert!(expand("node-[]").is_err());
    }
}
