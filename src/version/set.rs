use std::fmt;

use crate::version::Version;

/// A set of allowed versions: a boolean combination of comparison
/// predicates. Sets are plain ASTs, nothing is normalized on construction;
/// equality and hashing are structural, so `(a & b)` and `(b & a)` are
/// different sets even though they contain the same versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSet {
    /// Every version.
    Any,
    /// No version.
    Empty,
    /// Exactly this version.
    Eq(Version),
    /// Everything but this version.
    NotEq(Version),
    /// Strictly greater.
    Gt(Version),
    /// Strictly lower.
    Lt(Version),
    /// Greater or equal.
    GtEq(Version),
    /// Lower or equal.
    LtEq(Version),
    /// Intersection of the children.
    And(Vec<VersionSet>),
    /// Union of the children.
    Or(Vec<VersionSet>),
    /// Complement of the child.
    Not(Box<VersionSet>),
}

impl VersionSet {
    /// Intersection of all given sets. An empty list means no constraint.
    pub fn all(sets: Vec<VersionSet>) -> VersionSet {
        match sets.len() {
            0 => VersionSet::Any,
            1 => sets.into_iter().next().expect("one element"),
            _ => VersionSet::And(sets),
        }
    }

    /// Union of all given sets. An empty list means no constraint.
    pub fn any_of(sets: Vec<VersionSet>) -> VersionSet {
        match sets.len() {
            0 => VersionSet::Any,
            1 => sets.into_iter().next().expect("one element"),
            _ => VersionSet::Or(sets),
        }
    }

    /// Whether the given version is a member of this set.
    pub fn contains(&self, version: &Version) -> bool {
        match self {
            VersionSet::Any => true,
            VersionSet::Empty => false,
            VersionSet::Eq(v) => version == v,
            VersionSet::NotEq(v) => version != v,
            VersionSet::Gt(v) => version > v,
            VersionSet::Lt(v) => version < v,
            VersionSet::GtEq(v) => version >= v,
            VersionSet::LtEq(v) => version <= v,
            VersionSet::And(sets) => sets.iter().all(|s| s.contains(version)),
            VersionSet::Or(sets) => sets.iter().any(|s| s.contains(version)),
            VersionSet::Not(set) => !set.contains(version),
        }
    }

    /// The set of versions in either `self` or `other`.
    pub fn union(self, other: VersionSet) -> VersionSet {
        VersionSet::Or(vec![self, other])
    }

    /// The set of versions in both `self` and `other`.
    pub fn intersection(self, other: VersionSet) -> VersionSet {
        VersionSet::And(vec![self, other])
    }

    /// The set of versions not in `self`.
    pub fn complement(self) -> VersionSet {
        VersionSet::Not(Box::new(self))
    }

    /// The set of versions in `self` but not in `other`.
    pub fn difference(self, other: VersionSet) -> VersionSet {
        self.intersection(other.complement())
    }

    /// Keeps only the members of this set, preserving order.
    pub fn filter_allowed<I>(&self, versions: I) -> Vec<Version>
    where
        I: IntoIterator<Item = Version>,
    {
        versions.into_iter().filter(|v| self.contains(v)).collect()
    }
}

impl fmt::Display for VersionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSet::Any => write!(f, "any"),
            VersionSet::Empty => write!(f, "none"),
            // A bare version means equality in the surface syntax
            VersionSet::Eq(v) => write!(f, "{v}"),
            VersionSet::NotEq(v) => write!(f, "!={v}"),
            VersionSet::Gt(v) => write!(f, ">{v}"),
            VersionSet::Lt(v) => write!(f, "<{v}"),
            VersionSet::GtEq(v) => write!(f, ">={v}"),
            VersionSet::LtEq(v) => write!(f, "<={v}"),
            VersionSet::And(sets) => {
                let parts: Vec<_> = sets.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(" & "))
            }
            VersionSet::Or(sets) => {
                let parts: Vec<_> = sets.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(" | "))
            }
            VersionSet::Not(set) => write!(f, "!{set}"),
        }
    }
}
