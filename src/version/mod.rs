// src/version/mod.rs

//! Recipe version handling
//!
//! Recipe versions are free-form dot-separated strings ("3.50.4",
//! "1.1.1w", "2.0.0rc1"). Comparison is lexically aware: each
//! dot-separated segment is split into runs of digits and non-digits,
//! digit runs compare numerically and other runs compare as strings.

use std::cmp::Ordering;
use std::fmt;

/// One run inside a version segment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Run {
    Number(u64),
    Text(String),
}

impl Run {
    fn compare(&self, other: &Run) -> Ordering {
        match (self, other) {
            (Run::Number(a), Run::Number(b)) => a.cmp(b),
            (Run::Text(a), Run::Text(b)) => a.cmp(b),
            // A numeric run is considered newer than a textual one, so
            // "1.0.1" > "1.0.rc1"
            (Run::Number(_), Run::Text(_)) => Ordering::Greater,
            (Run::Text(_), Run::Number(_)) => Ordering::Less,
        }
    }
}

/// A parsed recipe version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecipeVersion {
    raw: String,
    segments: Vec<Vec<Run>>,
}

impl RecipeVersion {
    /// Parse a version string. Parsing never fails; an empty string is a
    /// version with no segments that sorts before everything else.
    pub fn parse(s: &str) -> Self {
        let raw = s.trim().to_string();
        let segments = if raw.is_empty() {
            Vec::new()
        } else {
            raw.split('.').map(split_runs).collect()
        };
        Self { raw, segments }
    }

    /// The version string as written in the recipe
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Major component (everything before the first dot)
    pub fn major(&self) -> &str {
        self.raw.split('.').next().unwrap_or("")
    }

    /// Check whether `prefix` matches the leading dot-separated segments
    /// of this version
    ///
    /// "1.15.2" starts with "1.15" and "1", but not with "1.1" or "1.14".
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = prefix.trim().trim_end_matches('.');
        if prefix.is_empty() {
            return true;
        }
        let ours: Vec<&str> = self.raw.split('.').collect();
        let theirs: Vec<&str> = prefix.split('.').collect();
        theirs.len() <= ours.len() && ours.iter().zip(theirs.iter()).all(|(a, b)| a == b)
    }

    /// Compare two versions segment by segment
    pub fn compare(&self, other: &RecipeVersion) -> Ordering {
        for (ours, theirs) in self.segments.iter().zip(other.segments.iter()) {
            for (a, b) in ours.iter().zip(theirs.iter()) {
                match a.compare(b) {
                    Ordering::Equal => {}
                    ord => return ord,
                }
            }
            match ours.len().cmp(&theirs.len()) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        self.segments.len().cmp(&other.segments.len())
    }
}

fn split_runs(segment: &str) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut current = String::new();
    let mut numeric = false;

    for c in segment.chars() {
        let is_digit = c.is_ascii_digit();
        if !current.is_empty() && is_digit != numeric {
            runs.push(finish_run(&current, numeric));
            current.clear();
        }
        numeric = is_digit;
        current.push(c);
    }
    if !current.is_empty() {
        runs.push(finish_run(&current, numeric));
    }
    runs
}

fn finish_run(run: &str, numeric: bool) -> Run {
    if numeric {
        // Digit runs too large for u64 fall back to textual comparison
        match run.parse::<u64>() {
            Ok(n) => Run::Number(n),
            Err(_) => Run::Text(run.to_string()),
        }
    } else {
        Run::Text(run.to_string())
    }
}

impl fmt::Display for RecipeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl Ord for RecipeVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl PartialOrd for RecipeVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<&str> for RecipeVersion {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}
