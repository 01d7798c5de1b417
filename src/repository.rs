use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::requirement::Requirement;
use crate::version::{ParseError, Version, parse_requirement, parse_version};

/// The contract the solver needs from a package source.
///
/// Both calls must be deterministic for the duration of a resolve; the
/// solver memoizes them but relies on stable answers. The order of
/// `get_versions` does not matter, candidates are re-ordered by the
/// selection strategy.
pub trait Repository {
    /// All versions known for the package. Unknown packages yield an empty
    /// list; the solver turns that into a conflict if anything requires
    /// the package.
    fn get_versions(&self, package_name: &str) -> Result<Vec<Version>, RepositoryError>;

    /// The requirements attached to one `(package, version)`. `flags`
    /// select optional requirement groups; adapters that do not model
    /// extras ignore them.
    fn get_dependencies(
        &self,
        package_name: &str,
        version: &Version,
        flags: &BTreeSet<String>,
    ) -> Result<Vec<Requirement>, RepositoryError>;
}

/// An adapter failure, surfaced through the solver untouched.
#[derive(Debug, thiserror::Error)]
#[error("repository lookup failed")]
#[non_exhaustive]
pub struct RepositoryError {
    /// What went wrong.
    pub source: RepositoryErrorKind,
}

/// The failure modes of repository adapters.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryErrorKind {
    #[error(transparent)]
    /// Package metadata did not parse.
    Parse(#[from] ParseError),
    #[error(transparent)]
    /// Reading or decoding a payload failed.
    Io(#[from] std::io::Error),
    #[error(transparent)]
    /// Transport-level HTTP failure.
    Http(#[from] Box<ureq::Error>),
    /// The server answered with a non-success status.
    #[error("HTTP error code: {0}")]
    Status(u16),
}

impl From<ParseError> for RepositoryError {
    fn from(error: ParseError) -> Self {
        Self {
            source: RepositoryErrorKind::Parse(error),
        }
    }
}

impl From<std::io::Error> for RepositoryError {
    fn from(error: std::io::Error) -> Self {
        Self {
            source: RepositoryErrorKind::Io(error),
        }
    }
}

impl From<Box<ureq::Error>> for RepositoryError {
    fn from(error: Box<ureq::Error>) -> Self {
        Self {
            source: RepositoryErrorKind::Http(error),
        }
    }
}

/// A repository held entirely in memory, mainly for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRepository {
    packages: HashMap<String, BTreeMap<Version, Vec<Requirement>>>,
}

impl InMemoryRepository {
    /// An empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one `(package, version)` with its requirements given in
    /// the native constraint syntax.
    pub fn add(
        &mut self,
        package_name: &str,
        version: &str,
        requirements: &[&str],
    ) -> Result<(), ParseError> {
        let version = parse_version(version)?;
        let requirements = requirements
            .iter()
            .map(|r| parse_requirement(r))
            .collect::<Result<Vec<_>, _>>()?;
        self.packages
            .entry(package_name.to_string())
            .or_default()
            .insert(version, requirements);
        Ok(())
    }

    /// Builds a repository from `(package, version, requirements)` rows.
    pub fn from_entries(entries: &[(&str, &str, &[&str])]) -> Result<Self, ParseError> {
        let mut repo = Self::new();
        for (package_name, version, requirements) in entries {
            repo.add(package_name, version, requirements)?;
        }
        Ok(repo)
    }
}

impl Repository for InMemoryRepository {
    // Highest version first, like a registry advertising latest releases
    fn get_versions(&self, package_name: &str) -> Result<Vec<Version>, RepositoryError> {
        Ok(self
            .packages
            .get(package_name)
            .map(|versions| versions.keys().rev().cloned().collect())
            .unwrap_or_default())
    }

    fn get_dependencies(
        &self,
        package_name: &str,
        version: &Version,
        _flags: &BTreeSet<String>,
    ) -> Result<Vec<Requirement>, RepositoryError> {
        Ok(self
            .packages
            .get(package_name)
            .and_then(|versions| versions.get(version))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn serves_versions_highest_first() {
        let repo = InMemoryRepository::from_entries(&[
            ("foo", "1.0", &[]),
            ("foo", "2.0-alpha", &[]),
            ("foo", "2.0", &[]),
            ("foo", "0.9", &[]),
        ])
        .unwrap();

        let versions = repo.get_versions("foo").unwrap();
        let rendered: Vec<_> = versions.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["2.0", "2.0-alpha", "1.0", "0.9"]);
    }

    #[test]
    fn unknown_package_has_no_versions() {
        let repo = InMemoryRepository::new();
        assert!(repo.get_versions("ghost").unwrap().is_empty());
        let version = Version::from_str("1.0").unwrap();
        assert!(
            repo.get_dependencies("ghost", &version, &BTreeSet::new())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn dependencies_are_parsed() {
        let repo =
            InMemoryRepository::from_entries(&[("foo", "1.0", &["bar >=1.0 & <2.0", "baz"])])
                .unwrap();
        let version = Version::from_str("1.0").unwrap();
        let deps = repo
            .get_dependencies("foo", &version, &BTreeSet::new())
            .unwrap();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0].package_name, "bar");
        assert_eq!(deps[1].package_name, "baz");
    }

    #[test]
    fn rejects_bad_specs() {
        let mut repo = InMemoryRepository::new();
        assert!(repo.add("foo", "not a version!", &[]).is_err());
        assert!(repo.add("foo", "1.0", &["bar >="]).is_err());
    }
}
