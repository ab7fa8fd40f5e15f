//! Port and device name patterns
//!
//! Autoconnect picks devices and ports by name using shell-style wildcards:
//! `*` matches any run of characters, `?` matches exactly one. A server port
//! (`client:port`) matches when either its full name or its short name does.

use crate::error::{Error, Result};

/// True if `name` matches `pattern` in full
pub fn matches_pattern(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    let (mut pi, mut ni) = (0, 0);
    // Last `*` seen and the name position it was tried at
    let mut backtrack: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ni));
            pi += 1;
        } else if let Some((star, mark)) = backtrack {
            pi = star + 1;
            ni = mark + 1;
            backtrack = Some((star, mark + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

/// True if `pattern` matches the server port `full_name` or its short name
pub fn matches_port(pattern: &str, full_name: &str) -> bool {
    let short = full_name.rsplit_once(':').map_or(full_name, |(_, port)| port);
    matches_pattern(pattern, full_name) || matches_pattern(pattern, short)
}

/// Pair each of our ports with the next server port matching `pattern`.
///
/// Returns `(ours, theirs)` pairs in port order. Every one of our ports must
/// find a partner.
pub fn pair_ports(pattern: &str, ours: &[String], available: &[String]) -> Result<Vec<(String, String)>> {
    let matching: Vec<&String> = available.iter().filter(|name| matches_port(pattern, name)).collect();
    if matching.len() < ours.len() {
        return Err(Error::AudioHost(format!(
            "pattern '{}' matches {} port(s), need {}",
            pattern,
            matching.len(),
            ours.len()
        )));
    }
    Ok(ours
        .iter()
        .zip(matching)
        .map(|(own, other)| (own.clone(), other.clone()))
        .collect())
}
