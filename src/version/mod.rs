//! The version model: ordered identifiers parsed into components, plus the
//! set algebra and the constraint surface syntax.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod parser;
mod set;

pub use parser::{
    ParseError, ParseErrorKind, parse_maven_version_set, parse_requirement, parse_version,
    parse_version_set,
};
pub use set::VersionSet;

/// Rank used for plain releases in the qualifier ordering. Qualifiers with a
/// lower rank sort before the release, higher ranks after.
const RELEASE_RANK: u8 = 4;

/// Well-known pre/post-release tokens and their fixed ordering.
fn qualifier_rank(token: &str) -> Option<u8> {
    match token {
        "alpha" | "a" => Some(0),
        "beta" | "b" => Some(1),
        "milestone" | "m" => Some(2),
        "rc" | "cr" | "c" => Some(3),
        "" => Some(RELEASE_RANK),
        "snapshot" | "dev" => Some(5),
        "final" | "ga" => Some(6),
        "post" | "sp" => Some(7),
        _ => None,
    }
}

/// One dash-or-transition separated part of a version string.
/// `1.7-7-rc.1` has components `[1, 7]`, `[7]`, `rc`, `[1]`.
#[derive(Debug, Clone)]
pub(crate) enum Component {
    Numeric(Vec<u64>),
    Alpha(String),
}

impl Component {
    // Ordering relative to a missing component on the other side
    fn cmp_null(&self) -> Ordering {
        match self {
            Component::Numeric(_) => Ordering::Greater,
            Component::Alpha(token) => match qualifier_rank(&token.to_lowercase()) {
                Some(rank) => rank.cmp(&RELEASE_RANK),
                // Unknown tokens sort before the release
                None => Ordering::Less,
            },
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Numeric(items) => {
                let repr: Vec<_> = items.iter().map(u64::to_string).collect();
                write!(f, "{}", repr.join("."))
            }
            Component::Alpha(token) => write!(f, "{token}"),
        }
    }
}

// Components are compared left-to-right; a missing component on either side
// counts as a null component.
fn compare_components(a: Option<&Component>, b: Option<&Component>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (Some(a), None) => a.cmp_null(),
        (None, Some(b)) => b.cmp_null().reverse(),
        (Some(Component::Numeric(_)), Some(Component::Alpha(_))) => Ordering::Greater,
        (Some(Component::Alpha(_)), Some(Component::Numeric(_))) => Ordering::Less,
        (Some(Component::Numeric(a)), Some(Component::Numeric(b))) => {
            // Element-wise, zero-padded to equal length
            for i in 0..a.len().max(b.len()) {
                let x = a.get(i).copied().unwrap_or(0);
                let y = b.get(i).copied().unwrap_or(0);
                match x.cmp(&y) {
                    Ordering::Equal => continue,
                    ordering => return ordering,
                }
            }
            Ordering::Equal
        }
        (Some(Component::Alpha(a)), Some(Component::Alpha(b))) => {
            let a = a.to_lowercase();
            let b = b.to_lowercase();
            match (qualifier_rank(&a), qualifier_rank(&b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                // A ranked token always wins over an unranked one
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => a.cmp(&b),
            }
        }
    }
}

/// An ordered version identifier.
///
/// The original spelling is kept around for display; comparisons, equality
/// and hashing all go through the parsed components so `1.0`, `1` and
/// `v1.0` are the same version.
#[derive(Debug, Clone)]
pub struct Version {
    components: Vec<Component>,
    original: String,
}

impl Version {
    pub(crate) fn new(components: Vec<Component>, original: String) -> Self {
        Self {
            components,
            original,
        }
    }

    /// The string this version was parsed from, unmodified.
    pub fn original(&self) -> &str {
        &self.original
    }
}

impl FromStr for Version {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_version(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        for i in 0..self.components.len().max(other.components.len()) {
            match compare_components(self.components.get(i), other.components.get(i)) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // The normalized form must collapse everything the comparison treats
        // as equal: trailing zero elements of numeric components and the
        // spelling of ranked qualifier tokens ("alpha" vs "a")
        for component in &self.components {
            match component {
                Component::Numeric(items) => {
                    let trailing_zeros = items.iter().rev().take_while(|i| **i == 0).count();
                    state.write_u8(0);
                    items[..items.len() - trailing_zeros].hash(state);
                }
                Component::Alpha(token) => {
                    let token = token.to_lowercase();
                    state.write_u8(1);
                    match qualifier_rank(&token) {
                        Some(rank) => rank.hash(state),
                        None => token.hash(state),
                    }
                }
            }
        }
    }
}

impl Serialize for Version {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.original)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        Version::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// An empty or structurally unparseable version string.
#[derive(Debug, thiserror::Error)]
#[error("invalid version `{input}`")]
#[non_exhaustive]
pub struct InvalidVersion {
    /// The rejected input.
    pub input: String,
}
