use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::consts::FLAG_SEPARATOR;
use crate::version::{ParseError, VersionSet, parse_requirement};

/// A package name together with the set of versions that satisfy it.
///
/// Flags are opaque extras carried along for adapters; the solver itself
/// never interprets them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    /// The required package.
    pub package_name: String,
    /// The versions allowed for it.
    pub version_set: VersionSet,
    /// Optional requirement groups ("extras") requested from the package.
    pub flags: BTreeSet<String>,
}

impl Requirement {
    /// A requirement without flags.
    pub fn new(package_name: impl Into<String>, version_set: VersionSet) -> Self {
        Self {
            package_name: package_name.into(),
            version_set,
            flags: BTreeSet::new(),
        }
    }

    /// A requirement carrying flags.
    pub fn with_flags(
        package_name: impl Into<String>,
        version_set: VersionSet,
        flags: BTreeSet<String>,
    ) -> Self {
        Self {
            package_name: package_name.into(),
            version_set,
            flags,
        }
    }

    /// Rewrites a flagged requirement into flag-free ones using synthetic
    /// package names: `pkg[a] >=1.0` becomes `pkg >=1.0` plus
    /// `pkg$$a >=1.0`. Adapters that resolve extras decode the synthetic
    /// names on lookup; the solver needs no special handling.
    pub fn expand_flags(&self) -> Vec<Requirement> {
        if self.flags.is_empty() {
            return vec![self.clone()];
        }
        let mut expanded = vec![Requirement::new(
            self.package_name.clone(),
            self.version_set.clone(),
        )];
        for flag in &self.flags {
            expanded.push(Requirement::new(
                format!("{}{}{}", self.package_name, FLAG_SEPARATOR, flag),
                self.version_set.clone(),
            ));
        }
        expanded
    }
}

impl FromStr for Requirement {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_requirement(s)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.package_name)?;
        if !self.flags.is_empty() {
            let flags: Vec<_> = self.flags.iter().map(String::as_str).collect();
            write!(f, "[{}]", flags.join(","))?;
        }
        if self.version_set != VersionSet::Any {
            write!(f, " {}", self.version_set)?;
        }
        Ok(())
    }
}
