//! A version-constraint dependency resolver.
//!
//! Given a set of root requirements and a [`Repository`] that can list a
//! package's versions and the requirements attached to each version, the
//! solver produces one consistent version per required package, or
//! explains why none exists.
//!
//! ```
//! use versolve::{InMemoryRepository, solve_dependencies};
//!
//! let repo = InMemoryRepository::from_entries(&[
//!     ("foo", "1.0", &["bar >=1.0 & <2.0"]),
//!     ("bar", "1.0", &[]),
//!     ("bar", "2.0", &[]),
//! ])
//! .unwrap();
//!
//! let solution = solve_dependencies(vec!["foo >=1.0".parse().unwrap()], &repo).unwrap();
//! assert_eq!(solution["foo"], "1.0");
//! assert_eq!(solution["bar"], "1.0");
//! ```
#![warn(missing_docs)]
mod registry;
mod repository;
mod requirement;
mod solver;
mod version;

/// Reserved names used by the solver and adapters
pub mod consts;

pub use registry::{RegistryClient, normalize_package_name};
pub use repository::{InMemoryRepository, Repository, RepositoryError, RepositoryErrorKind};
pub use requirement::Requirement;
pub use solver::{
    Assignment, Conflict, SolverError, SolverErrorKind, VersionSelectionStrategy,
    solve_dependencies, solve_dependencies_with_strategy,
};
pub use version::{
    InvalidVersion, ParseError, ParseErrorKind, Version, VersionSet, parse_maven_version_set,
    parse_requirement, parse_version, parse_version_set,
};
