//! Maven version ordering and version-range matching.
//!
//! This is a pragmatic subset of Maven's `ComparableVersion` rules: numeric
//! segments compare numerically, well-known qualifiers follow Maven's order
//! (`alpha < beta < milestone < rc < snapshot < "" < sp`), and unknown
//! qualifiers compare lexically after the release.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Item {
    Number(u64),
    Qualifier(String),
}

fn qualifier_rank(qualifier: &str) -> (u8, &str) {
    match qualifier {
        "alpha" | "a" => (0, ""),
        "beta" | "b" => (1, ""),
        "milestone" | "m" => (2, ""),
        "rc" | "cr" => (3, ""),
        "snapshot" => (4, ""),
        "" | "ga" | "final" | "release" => (5, ""),
        "sp" => (6, ""),
        other => (7, other),
    }
}

fn items(version: &str) -> Vec<Item> {
    let mut out = Vec::new();
    let lower = version.trim().to_ascii_lowercase();
    for part in lower.split(['.', '-', '_']) {
        if part.is_empty() {
            continue;
        }
        // Split digit/letter transitions (`1rc2` → 1, rc, 2).
        let mut current = String::new();
        let mut digits = None;
        for ch in part.chars() {
            let is_digit = ch.is_ascii_digit();
            if digits.is_some_and(|d| d != is_digit) {
                out.push(item(&current));
                current.clear();
            }
            digits = Some(is_digit);
            current.push(ch);
        }
        if !current.is_empty() {
            out.push(item(&current));
        }
    }
    while matches!(out.last(), Some(Item::Number(0))) {
        out.pop();
    }
    out
}

fn item(text: &str) -> Item {
    match text.parse::<u64>() {
        Ok(n) => Item::Number(n),
        Err(_) => Item::Qualifier(text.to_string()),
    }
}

fn compare_item(a: Option<&Item>, b: Option<&Item>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(Item::Number(a)), Some(Item::Number(b))) => a.cmp(b),
        (Some(Item::Number(n)), None) => n.cmp(&0),
        (None, Some(Item::Number(n))) => 0.cmp(n),
        (Some(Item::Number(_)), Some(Item::Qualifier(_))) => Ordering::Greater,
        (Some(Item::Qualifier(_)), Some(Item::Number(_))) => Ordering::Less,
        (Some(Item::Qualifier(a)), Some(Item::Qualifier(b))) => {
            qualifier_rank(a).cmp(&qualifier_rank(b))
        }
        (Some(Item::Qualifier(q)), None) => qualifier_rank(q).cmp(&qualifier_rank("")),
        (None, Some(Item::Qualifier(q))) => qualifier_rank("").cmp(&qualifier_rank(q)),
    }
}

/// Compare two Maven versions.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let a = items(a);
    let b = items(b);
    let len = a.len().max(b.len());
    for idx in 0..len {
        let ord = compare_item(a.get(idx), b.get(idx));
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Bound {
    version: String,
    inclusive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Restriction {
    lower: Option<Bound>,
    upper: Option<Bound>,
}

impl Restriction {
    fn contains(&self, version: &str) -> bool {
        if let Some(lower) = &self.lower {
            match compare_versions(version, &lower.version) {
                Ordering::Less => return false,
                Ordering::Equal if !lower.inclusive => return false,
                _ => {}
            }
        }
        if let Some(upper) = &self.upper {
            match compare_versions(version, &upper.version) {
                Ordering::Greater => return false,
                Ordering::Equal if !upper.inclusive => return false,
                _ => {}
            }
        }
        true
    }
}

/// A parsed version requirement.
///
/// A plain version (`1.0`) only matches an equal version; bracketed specs are
/// Maven ranges, possibly a comma-separated union (`[1.0,2.0),[3.0,)`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Exact(String),
    Ranges(Vec<RangeRestriction>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRestriction(Restriction);

impl VersionSpec {
    /// Parse a version spec. Returns `None` for malformed ranges.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if !spec.starts_with(['[', '(']) {
            return Some(Self::Exact(spec.to_string()));
        }

        let mut restrictions = Vec::new();
        let mut rest = spec;
        while !rest.is_empty() {
            let open = rest.chars().next()?;
            if !matches!(open, '[' | '(') {
                return None;
            }
            let close_idx = rest.find([']', ')'])?;
            let close = rest[close_idx..].chars().next()?;
            let body = &rest[1..close_idx];
            restrictions.push(RangeRestriction(parse_restriction(open, body, close)?));

            rest = rest[close_idx + 1..].trim_start();
            if let Some(next) = rest.strip_prefix(',') {
                rest = next.trim_start();
            }
        }

        if restrictions.is_empty() {
            return None;
        }
        Some(Self::Ranges(restrictions))
    }

    pub fn contains(&self, version: &str) -> bool {
        match self {
            VersionSpec::Exact(expected) => compare_versions(expected, version) == Ordering::Equal,
            VersionSpec::Ranges(restrictions) => {
                restrictions.iter().any(|r| r.0.contains(version))
            }
        }
    }
}

fn parse_restriction(open: char, body: &str, close: char) -> Option<Restriction> {
    let lower_inclusive = open == '[';
    let upper_inclusive = close == ']';
    match body.split_once(',') {
        None => {
            // `[1.0]` pins a single version.
            let version = body.trim();
            if version.is_empty() || !lower_inclusive || !upper_inclusive {
                return None;
            }
            let bound = Bound {
                version: version.to_string(),
                inclusive: true,
            };
            Some(Restriction {
                lower: Some(bound.clone()),
                upper: Some(bound),
            })
        }
        Some((lower, upper)) => {
            let lower = lower.trim();
            let upper = upper.trim();
            Some(Restriction {
                lower: (!lower.is_empty()).then(|| Bound {
                    version: lower.to_string(),
                    inclusive: lower_inclusive,
                }),
                upper: (!upper.is_empty()).then(|| Bound {
                    version: upper.to_string(),
                    inclusive: upper_inclusive,
                }),
            })
        }
    }
}
