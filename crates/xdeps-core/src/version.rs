//! Cross-ecosystem version parsing, comparison, and constraint matching.
//!
//! Every ecosystem's version strings are mapped onto semantic versions:
//! - Up to three numeric components; missing trailing components are zero
//! - An unseparated or `-`-separated suffix becomes the pre-release
//! - Extra numeric components (`1.2.3.4`) are folded into build metadata
//! - Epoch prefixes (`1:2.31`) and a leading `v` are stripped by [`Version::coerce`]
//!
//! Constraints use a permissive range language covering the operators seen
//! across registries and OS package databases (`*`, `=`, `==`, `!=`, `>`,
//! `>=`, `<`, `<=`, `~`, `~=`, `^`, `<<`, `>>`), comma- or whitespace-separated
//! conjunctions, `||` disjunctions, wildcards (`1.2.*`), and hyphen ranges.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease};
use serde::{Serialize, Serializer};
use xdeps_util::errors::DependsError;

/// A concrete, totally ordered package version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Version(semver::Version);

impl Version {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Strictly parse a version with one to three numeric components.
    pub fn parse(raw: &str) -> Result<Self, DependsError> {
        let s = raw.trim();
        let err = |message: &str| DependsError::VersionParse {
            input: raw.to_string(),
            message: message.to_string(),
        };

        let split = s.find(['-', '+']).unwrap_or(s.len());
        let (core, suffix) = s.split_at(split);
        let components: Vec<&str> = core.split('.').collect();
        if components.len() > 3 {
            return Err(err("more than three numeric components"));
        }
        let mut numbers = [0u64; 3];
        for (slot, component) in numbers.iter_mut().zip(&components) {
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err("expected numeric version components"));
            }
            *slot = component
                .parse()
                .map_err(|_| err("numeric component out of range"))?;
        }

        let text = format!("{}.{}.{}{suffix}", numbers[0], numbers[1], numbers[2]);
        semver::Version::parse(&text)
            .map(Self)
            .map_err(|e| err(&e.to_string()))
    }

    /// Best-effort parse that never fails.
    ///
    /// Used for version strings reported by backends, which are exact but
    /// not necessarily semantic (`1:2.31`, `2.0rc1`, `1.2.3.4`, `v3`).
    pub fn coerce(raw: &str) -> Self {
        match Operand::scan(raw) {
            Some(operand) => operand.floor(),
            None => Self::new(0, 0, 0),
        }
    }

    pub fn major(&self) -> u64 {
        self.0.major
    }

    pub fn minor(&self) -> u64 {
        self.0.minor
    }

    pub fn patch(&self) -> u64 {
        self.0.patch
    }

    pub fn is_prerelease(&self) -> bool {
        !self.0.pre.is_empty()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Version {
    type Err = DependsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Strip prefixes that carry no ordering information for our purposes.
fn strip_non_semantic_prefix(raw: &str) -> &str {
    let mut s = raw.trim();
    if let Some((epoch, rest)) = s.split_once(':') {
        if !epoch.is_empty() && epoch.bytes().all(|b| b.is_ascii_digit()) {
            s = rest;
        }
    }
    match s.strip_prefix(['v', 'V']) {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => s,
    }
}

/// Turn free text into dot-separated semver identifiers.
fn sanitize_identifiers(text: &str, numeric_leading_zeros_ok: bool) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '.' })
        .collect();
    cleaned
        .split('.')
        .filter(|id| !id.is_empty())
        .map(|id| {
            if !numeric_leading_zeros_ok && id.len() > 1 && id.bytes().all(|b| b.is_ascii_digit()) {
                let trimmed = id.trim_start_matches('0');
                if trimmed.is_empty() { "0" } else { trimmed }
            } else {
                id
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

/// A version operand as written inside a constraint: possibly partial
/// (`1.2`) or wildcarded (`1.2.*`).
#[derive(Debug, Clone)]
struct Operand {
    numbers: Vec<u64>,
    pre: String,
    build: String,
}

impl Operand {
    /// Scan a version-like string. Returns `None` when it has no leading digit.
    fn scan(raw: &str) -> Option<Self> {
        let s = strip_non_semantic_prefix(raw);
        if !s.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }

        let mut numbers = Vec::new();
        let mut rest = s;
        loop {
            let end = rest
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(rest.len());
            if end == 0 {
                break;
            }
            numbers.push(rest[..end].parse().unwrap_or(u64::MAX));
            rest = &rest[end..];
            match rest.strip_prefix('.') {
                Some(next) if next.starts_with(|c: char| c.is_ascii_digit()) => rest = next,
                _ => break,
            }
        }

        let rest = rest.trim_start_matches('.');
        let (pre, build) = match rest.split_once('+') {
            Some((pre, build)) => (pre, build),
            None => (rest, ""),
        };
        let pre = pre.trim_start_matches(['-', '_', '.']);

        let mut build = sanitize_identifiers(build, true);
        if numbers.len() > 3 {
            let extra: Vec<String> = numbers[3..].iter().map(u64::to_string).collect();
            let extra = extra.join(".");
            build = if build.is_empty() { extra } else { format!("{extra}.{build}") };
            numbers.truncate(3);
        }

        Some(Self {
            numbers,
            pre: sanitize_identifiers(pre, false),
            build,
        })
    }

    fn precision(&self) -> usize {
        self.numbers.len()
    }

    fn component(&self, i: usize) -> u64 {
        self.numbers.get(i).copied().unwrap_or(0)
    }

    /// The smallest version this operand denotes.
    fn floor(&self) -> Version {
        let mut v = semver::Version::new(self.component(0), self.component(1), self.component(2));
        v.pre = Prerelease::new(&self.pre).unwrap_or(Prerelease::EMPTY);
        v.build = BuildMetadata::new(&self.build).unwrap_or(BuildMetadata::EMPTY);
        Version(v)
    }

    /// The first version past this operand when it is truncated to `precision` components.
    fn bump(&self, precision: usize) -> Version {
        let (major, minor, patch) = (self.component(0), self.component(1), self.component(2));
        match precision {
            0 | 1 => Version::new(major.saturating_add(1), 0, 0),
            2 => Version::new(major, minor.saturating_add(1), 0),
            _ => Version::new(major, minor, patch.saturating_add(1)),
        }
    }
}

/// A primitive bound produced by lowering a comparator.
#[derive(Debug, Clone)]
enum Bound {
    Exact(Version),
    Not(Version),
    Outside(Version, Version),
    AtLeast(Version),
    Above(Version),
    AtMost(Version),
    Below(Version),
}

impl Bound {
    fn admits(&self, v: &Version) -> bool {
        match self {
            Bound::Exact(x) => v == x,
            Bound::Not(x) => v != x,
            Bound::Outside(lo, hi) => v < lo || v >= hi,
            Bound::AtLeast(x) => v >= x,
            Bound::Above(x) => v > x,
            Bound::AtMost(x) => v <= x,
            Bound::Below(x) => v < x,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Exact,
    Not,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Tilde,
    Compatible,
    Caret,
}

impl Op {
    fn parse(token: &str) -> Option<Self> {
        Some(match token {
            "" | "=" | "==" => Op::Exact,
            "!=" => Op::Not,
            ">" | ">>" => Op::Greater,
            ">=" => Op::GreaterEq,
            "<" | "<<" => Op::Less,
            "<=" => Op::LessEq,
            "~" => Op::Tilde,
            "~=" => Op::Compatible,
            "^" => Op::Caret,
            _ => return None,
        })
    }
}

/// A predicate over [`Version`] built from a range expression.
///
/// Equality, hashing, and ordering follow the canonical text form, so
/// `Constraint::parse(&c.to_string()) == Ok(c)` for every constraint.
#[derive(Debug, Clone)]
pub struct Constraint {
    canonical: String,
    /// Disjunction of conjunctions. An empty conjunction admits everything.
    alternatives: Vec<Vec<Bound>>,
}

impl Constraint {
    /// The constraint that matches every version, including pre-releases.
    pub fn any() -> Self {
        Self {
            canonical: "*".to_string(),
            alternatives: vec![Vec::new()],
        }
    }

    /// A constraint matching exactly `version`.
    pub fn exact(version: &Version) -> Self {
        Self {
            canonical: format!("={version}"),
            alternatives: vec![vec![Bound::Exact(version.clone())]],
        }
    }

    pub fn parse(raw: &str) -> Result<Self, DependsError> {
        let input = raw.trim();
        if is_wildcard(input) {
            return Ok(Self::any());
        }

        let mut canonical_alts = Vec::new();
        let mut alternatives = Vec::new();
        for alt in input.split("||") {
            let alt = alt.trim();
            if is_wildcard(alt) {
                canonical_alts.push("*".to_string());
                alternatives.push(Vec::new());
                continue;
            }
            let comparators = tokenize(raw, alt)?;
            let mut bounds = Vec::new();
            let mut texts = Vec::new();
            for (op_text, operand_text) in comparators {
                bounds.extend(lower(raw, &op_text, &operand_text)?);
                texts.push(format!("{op_text}{operand_text}"));
            }
            canonical_alts.push(texts.join(","));
            alternatives.push(bounds);
        }

        Ok(Self {
            canonical: canonical_alts.join("||"),
            alternatives,
        })
    }

    /// Whether `version` satisfies this constraint.
    pub fn matches(&self, version: &Version) -> bool {
        self.alternatives
            .iter()
            .any(|conj| conj.iter().all(|b| b.admits(version)))
    }

    /// Whether this constraint admits every version.
    pub fn is_any(&self) -> bool {
        self.alternatives.iter().any(Vec::is_empty)
    }

    pub fn as_str(&self) -> &str {
        &self.canonical
    }
}

impl Default for Constraint {
    fn default() -> Self {
        Self::any()
    }
}

fn is_wildcard(s: &str) -> bool {
    matches!(s, "" | "*" | "x" | "X") || s.eq_ignore_ascii_case("latest")
}

/// Split one alternative into `(operator, operand)` pairs.
fn tokenize(raw: &str, alt: &str) -> Result<Vec<(String, String)>, DependsError> {
    let err = |message: String| DependsError::ConstraintParse {
        input: raw.to_string(),
        message,
    };

    // Hyphen range: `1.2 - 2.0`
    if let Some((lo, hi)) = alt.split_once(" - ") {
        let (lo, hi) = (lo.trim(), hi.trim());
        if lo.is_empty() || hi.is_empty() {
            return Err(err("incomplete hyphen range".to_string()));
        }
        // A partial upper end covers every version it prefixes.
        let hi = if hi.split('.').count() < 3 && !hi.ends_with('*') {
            format!("{hi}.*")
        } else {
            hi.to_string()
        };
        return Ok(vec![(">=".to_string(), lo.to_string()), ("<=".to_string(), hi)]);
    }

    let is_op = |c: char| matches!(c, '<' | '>' | '=' | '!' | '~' | '^');
    let is_sep = |c: char| c.is_whitespace() || c == ',';

    let mut out = Vec::new();
    let mut rest = alt;
    loop {
        rest = rest.trim_start_matches(is_sep);
        if rest.is_empty() {
            break;
        }
        let op_end = rest.find(|c: char| !is_op(c)).unwrap_or(rest.len());
        let op_text = &rest[..op_end];
        if Op::parse(op_text).is_none() {
            return Err(err(format!("unknown operator `{op_text}`")));
        }
        rest = rest[op_end..].trim_start();
        // `~` and `-` occur inside Debian versions, so only the other operator
        // characters terminate an operand.
        let operand_end = rest
            .find(|c: char| is_sep(c) || matches!(c, '<' | '>' | '=' | '!' | '^'))
            .unwrap_or(rest.len());
        let operand = &rest[..operand_end];
        if operand.is_empty() {
            return Err(err(format!("expected a version after `{op_text}`")));
        }
        out.push((op_text.to_string(), operand.to_string()));
        rest = &rest[operand_end..];
    }

    if out.is_empty() {
        return Err(err("empty constraint".to_string()));
    }
    Ok(out)
}

/// Lower a comparator into primitive bounds.
fn lower(raw: &str, op_text: &str, operand_text: &str) -> Result<Vec<Bound>, DependsError> {
    let err = |message: String| DependsError::ConstraintParse {
        input: raw.to_string(),
        message,
    };

    let op = Op::parse(op_text).ok_or_else(|| err(format!("unknown operator `{op_text}`")))?;
    if is_wildcard(operand_text) {
        return Ok(Vec::new());
    }

    // Wildcard components truncate the operand: `1.2.*` behaves like `1.2`.
    let truncated = operand_text
        .split('.')
        .take_while(|part| !is_wildcard(part))
        .collect::<Vec<_>>()
        .join(".");
    let operand = Operand::scan(&truncated)
        .ok_or_else(|| err(format!("`{operand_text}` is not a version")))?;
    let precision = operand.precision();
    let exact = precision == 3;
    let wildcarded = truncated.len() != operand_text.len();
    let floor = operand.floor();

    let bounds = match op {
        Op::Exact if exact => vec![Bound::Exact(floor)],
        Op::Exact => vec![Bound::AtLeast(floor), Bound::Below(operand.bump(precision))],
        Op::Not if exact => vec![Bound::Not(floor)],
        Op::Not => vec![Bound::Outside(floor, operand.bump(precision))],
        // Missing components are zero (`>2.29` is `>2.29.0`); only an
        // explicit wildcard widens the operand to a prefix.
        Op::Greater if wildcarded => vec![Bound::AtLeast(operand.bump(precision))],
        Op::Greater => vec![Bound::Above(floor)],
        Op::GreaterEq => vec![Bound::AtLeast(floor)],
        Op::Less => vec![Bound::Below(floor)],
        Op::LessEq if wildcarded => vec![Bound::Below(operand.bump(precision))],
        Op::LessEq => vec![Bound::AtMost(floor)],
        Op::Tilde => {
            let upper = operand.bump(if precision == 1 { 1 } else { 2 });
            vec![Bound::AtLeast(floor), Bound::Below(upper)]
        }
        Op::Compatible => {
            if precision < 2 {
                return Err(err("`~=` needs at least two version components".to_string()));
            }
            vec![Bound::AtLeast(floor), Bound::Below(operand.bump(precision - 1))]
        }
        Op::Caret => {
            let upper = if operand.component(0) > 0 || precision == 1 {
                operand.bump(1)
            } else if operand.component(1) > 0 || precision == 2 {
                operand.bump(2)
            } else {
                operand.bump(3)
            };
            vec![Bound::AtLeast(floor), Bound::Below(upper)]
        }
    };
    Ok(bounds)
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

impl FromStr for Constraint {
    type Err = DependsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for Constraint {}

impl Hash for Constraint {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl Ord for Constraint {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical.cmp(&other.canonical)
    }
}

impl PartialOrd for Constraint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.canonical)
    }
}
