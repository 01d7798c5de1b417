//! The clause logic the solver searches over: assignments, terms and the
//! three clause kinds (plain, dependency, learned incompatibility).

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::consts::{ROOT_PACKAGE_NAME, ROOT_VERSION};
use crate::requirement::Requirement;
use crate::version::{Version, VersionSet, parse_version};

/// A committed pairing of a package with exactly one version, or with the
/// explicit "not chosen" sentinel (`version == None`).
#[derive(Debug, Clone)]
pub struct Assignment {
    pub(crate) package_name: String,
    pub(crate) version: Option<Version>,
    // Set by the nearest-wins strategy: commit even if other clauses object
    pub(crate) force: bool,
}

impl Assignment {
    /// Assigns a concrete version to a package.
    pub fn new(package_name: impl Into<String>, version: Version) -> Self {
        Self {
            package_name: package_name.into(),
            version: Some(version),
            force: false,
        }
    }

    /// Marks a package as explicitly not chosen.
    pub fn none(package_name: impl Into<String>) -> Self {
        Self {
            package_name: package_name.into(),
            version: None,
            force: false,
        }
    }

    pub(crate) fn forced(package_name: impl Into<String>, version: Version) -> Self {
        Self {
            package_name: package_name.into(),
            version: Some(version),
            force: true,
        }
    }

    /// The virtual assignment anchoring the search. It is created before
    /// anything else and never removed.
    pub(crate) fn root() -> Self {
        Self::new(
            ROOT_PACKAGE_NAME,
            parse_version(ROOT_VERSION).expect("valid root version"),
        )
    }

    /// The assigned package.
    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// The chosen version, `None` for the "not chosen" sentinel.
    pub fn version(&self) -> Option<&Version> {
        self.version.as_ref()
    }

    /// Whether this is the anchoring root assignment.
    pub fn is_root(&self) -> bool {
        self.package_name == ROOT_PACKAGE_NAME
    }

    // The requirement this assignment satisfies: exactly its version, or
    // nothing at all for the sentinel
    pub(crate) fn as_requirement(&self) -> Requirement {
        let version_set = match &self.version {
            Some(version) => VersionSet::Eq(version.clone()),
            None => VersionSet::Empty,
        };
        Requirement::new(self.package_name.clone(), version_set)
    }
}

impl PartialEq for Assignment {
    // The force marker is advisory, identity is (package, version)
    fn eq(&self, other: &Self) -> bool {
        self.package_name == other.package_name && self.version == other.version
    }
}

impl Eq for Assignment {}

impl Hash for Assignment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.package_name.hash(state);
        self.version.hash(state);
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{} {}", self.package_name, version),
            None => write!(f, "{} none", self.package_name),
        }
    }
}

/// A literal: a requirement with a polarity.
#[derive(Debug, Clone)]
pub(crate) struct Term {
    pub(crate) requirement: Requirement,
    pub(crate) positive: bool,
}

impl Term {
    pub(crate) fn positive(requirement: Requirement) -> Self {
        Self {
            requirement,
            positive: true,
        }
    }

    pub(crate) fn negative(requirement: Requirement) -> Self {
        Self {
            requirement,
            positive: false,
        }
    }

    pub(crate) fn package_name(&self) -> &str {
        &self.requirement.package_name
    }

    /// Three-valued truth under the given assignments: `None` while the
    /// package is unassigned. The "not chosen" sentinel falsifies a
    /// positive term and satisfies a negative one.
    pub(crate) fn truth_value(&self, assignments: &[Assignment]) -> Option<bool> {
        let assignment = assignments
            .iter()
            .find(|a| a.package_name == self.requirement.package_name)?;
        let satisfied = match &assignment.version {
            Some(version) => self.requirement.version_set.contains(version),
            None => false,
        };
        Some(if self.positive { satisfied } else { !satisfied })
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.positive {
            write!(f, "{}", self.requirement)
        } else {
            write!(f, "!({})", self.requirement)
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) enum ClauseKind {
    /// An unconditional assertion (only used to pin the root).
    Plain,
    /// `¬dependant ∨ requirement`: choosing the dependant implies the
    /// requirement. Provenance kept for diagnostics.
    Dependency {
        dependant: Assignment,
        requirement: Requirement,
    },
    /// Learned from a failed candidate probe for `package_name`;
    /// `causes` are the indices of the violated clauses it was
    /// synthesized from.
    Learned {
        package_name: String,
        causes: Vec<usize>,
    },
}

/// A disjunction of terms. Clauses are monotone: once added to the search
/// state they are never removed.
#[derive(Debug, Clone)]
pub(crate) struct Clause {
    pub(crate) terms: Vec<Term>,
    pub(crate) kind: ClauseKind,
}

impl Clause {
    pub(crate) fn plain(terms: Vec<Term>) -> Self {
        Self {
            terms,
            kind: ClauseKind::Plain,
        }
    }

    pub(crate) fn dependency(dependant: Assignment, requirement: Requirement) -> Self {
        let terms = vec![
            Term::negative(dependant.as_requirement()),
            Term::positive(requirement.clone()),
        ];
        Self {
            terms,
            kind: ClauseKind::Dependency {
                dependant,
                requirement,
            },
        }
    }

    /// Synthesizes an incompatibility from the clauses violated while
    /// probing candidates for `package_name`: all their terms except the
    /// ones about the probed package, merged per package. Positive terms
    /// merge by union; negative terms by intersection, which is the
    /// polarity-adjusted union (`¬(a∈S1) ∨ ¬(a∈S2) ≡ ¬(a∈S1∩S2)`).
    pub(crate) fn learned(package_name: &str, causes: Vec<usize>, violated: &[&Clause]) -> Self {
        let mut merged: Vec<(String, bool, VersionSet)> = Vec::new();
        for clause in violated {
            for term in &clause.terms {
                if term.package_name() == package_name {
                    continue;
                }
                let set = term.requirement.version_set.clone();
                if let Some((_, positive, existing)) = merged
                    .iter_mut()
                    .find(|(name, positive, _)| name == term.package_name() && *positive == term.positive)
                {
                    if *existing == set {
                        continue;
                    }
                    let current = std::mem::replace(existing, VersionSet::Any);
                    *existing = if *positive {
                        current.union(set)
                    } else {
                        current.intersection(set)
                    };
                } else {
                    merged.push((term.package_name().to_string(), term.positive, set));
                }
            }
        }

        let terms = merged
            .into_iter()
            .map(|(name, positive, set)| Term {
                requirement: Requirement::new(name, set),
                positive,
            })
            .collect();

        Self {
            terms,
            kind: ClauseKind::Learned {
                package_name: package_name.to_string(),
                causes,
            },
        }
    }

    /// True if any term is true, false if all are false, unknown otherwise.
    pub(crate) fn truth_value(&self, assignments: &[Assignment]) -> Option<bool> {
        let mut unknown = false;
        for term in &self.terms {
            match term.truth_value(assignments) {
                Some(true) => return Some(true),
                Some(false) => {}
                None => unknown = true,
            }
        }
        if unknown { None } else { Some(false) }
    }

    pub(crate) fn mentions(&self, package_name: &str) -> bool {
        self.terms.iter().any(|t| t.package_name() == package_name)
    }

    /// The packages referenced by this clause, first mention first.
    pub(crate) fn package_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for term in &self.terms {
            if !names.contains(&term.package_name()) {
                names.push(term.package_name());
            }
        }
        names
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<_> = self.terms.iter().map(ToString::to_string).collect();
        write!(f, "{}", terms.join(" or "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn v(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    fn req(s: &str) -> Requirement {
        s.parse().unwrap()
    }

    #[test]
    fn assignment_identity_is_name_and_version() {
        assert_eq!(
            Assignment::new("foo", v("1.0")),
            Assignment::new("foo", v("1")),
        );
        assert_ne!(
            Assignment::new("foo", v("1.0")),
            Assignment::new("foo", v("1.1")),
        );
        assert_ne!(Assignment::new("foo", v("1.0")), Assignment::none("foo"));
        assert_eq!(
            Assignment::new("foo", v("2.0")),
            Assignment::forced("foo", v("2.0")),
        );
    }

    #[test]
    fn term_truth_values() {
        let term = Term::positive(req("foo >=1.0"));
        assert_eq!(term.truth_value(&[]), None);
        assert_eq!(
            term.truth_value(&[Assignment::new("foo", v("1.5"))]),
            Some(true)
        );
        assert_eq!(
            term.truth_value(&[Assignment::new("foo", v("0.5"))]),
            Some(false)
        );
        // The sentinel falsifies positive terms and satisfies negative ones
        assert_eq!(term.truth_value(&[Assignment::none("foo")]), Some(false));

        let negated = Term::negative(req("foo >=1.0"));
        assert_eq!(
            negated.truth_value(&[Assignment::new("foo", v("1.5"))]),
            Some(false)
        );
        assert_eq!(
            negated.truth_value(&[Assignment::new("foo", v("0.5"))]),
            Some(true)
        );
        assert_eq!(negated.truth_value(&[Assignment::none("foo")]), Some(true));
    }

    #[test]
    fn clause_truth_short_circuits() {
        let clause = Clause::plain(vec![
            Term::positive(req("foo >=2.0")),
            Term::positive(req("bar >=1.0")),
        ]);

        // One true term is enough, even with the other package unassigned
        let assignments = vec![Assignment::new("foo", v("2.0"))];
        assert_eq!(clause.truth_value(&assignments), Some(true));

        // A false term plus an unassigned one is unknown
        let assignments = vec![Assignment::new("foo", v("1.0"))];
        assert_eq!(clause.truth_value(&assignments), None);

        // All terms false is false
        let assignments = vec![
            Assignment::new("foo", v("1.0")),
            Assignment::new("bar", v("0.1")),
        ];
        assert_eq!(clause.truth_value(&assignments), Some(false));
    }

    #[test]
    fn dependency_clause_reads_as_implication() {
        let dependant = Assignment::new("foo", v("1.0"));
        let clause = Clause::dependency(dependant.clone(), req("bar >=1.0"));

        // Dependant chosen, requirement satisfied
        let assignments = vec![dependant.clone(), Assignment::new("bar", v("1.0"))];
        assert_eq!(clause.truth_value(&assignments), Some(true));

        // Dependant chosen, requirement violated
        let assignments = vec![dependant.clone(), Assignment::new("bar", v("0.5"))];
        assert_eq!(clause.truth_value(&assignments), Some(false));

        // Dependant assigned a different version: vacuously true
        let assignments = vec![
            Assignment::new("foo", v("2.0")),
            Assignment::new("bar", v("0.5")),
        ];
        assert_eq!(clause.truth_value(&assignments), Some(true));

        // Dependant explicitly not chosen: vacuously true
        let assignments = vec![Assignment::none("foo"), Assignment::new("bar", v("0.5"))];
        assert_eq!(clause.truth_value(&assignments), Some(true));
    }

    #[test]
    fn learned_clause_drops_focus_terms_and_merges() {
        let a = Clause::dependency(Assignment::new("a", v("1.0")), req("x >=2.0"));
        let b = Clause::dependency(Assignment::new("a", v("1.0")), req("x <1.0"));
        let c = Clause::dependency(Assignment::new("b", v("3.0")), req("x 1.5"));

        let learned = Clause::learned("x", vec![0, 1, 2], &[&a, &b, &c]);
        // One negative term per dependant, no terms about x
        assert_eq!(learned.package_names(), vec!["a", "b"]);
        assert_eq!(learned.terms.len(), 2);
        assert!(learned.terms.iter().all(|t| !t.positive));

        // It is false exactly when both dependants keep their versions
        let assignments = vec![
            Assignment::new("a", v("1.0")),
            Assignment::new("b", v("3.0")),
        ];
        assert_eq!(learned.truth_value(&assignments), Some(false));
        let assignments = vec![
            Assignment::new("a", v("2.0")),
            Assignment::new("b", v("3.0")),
        ];
        assert_eq!(learned.truth_value(&assignments), Some(true));
    }

    #[test]
    fn learned_clause_keeps_positive_terms_by_union() {
        let a = Clause::dependency(Assignment::new("a", v("1.0")), req("x 1.0"));
        let b = Clause::dependency(Assignment::new("b", v("1.0")), req("x 2.0"));

        // Learning about `a` keeps the positive x terms of both clauses
        let learned = Clause::learned("a", vec![0, 1], &[&a, &b]);
        assert!(learned.mentions("x"));
        assert!(learned.mentions("b"));
        let positive_x = learned
            .terms
            .iter()
            .find(|t| t.package_name() == "x" && t.positive)
            .unwrap();
        assert!(positive_x.requirement.version_set.contains(&v("1.0")));
        assert!(positive_x.requirement.version_set.contains(&v("2.0")));
        assert!(!positive_x.requirement.version_set.contains(&v("3.0")));
    }
}
