//! The backtracking, clause-driven search engine.
//!
//! Resolution maintains a growing clause set: one Dependency clause per
//! requirement discovered, plus learned incompatibilities that record why
//! a subtree was pruned. The loop picks an unassigned package, probes the
//! "not chosen" sentinel and the strategy's candidates against every
//! clause about the package, and either commits an assignment or learns
//! an incompatibility and backtracks. It ends when every clause holds.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;

use crate::repository::{Repository, RepositoryError};
use crate::requirement::Requirement;

mod clause;
mod state;

use state::SearchState;

pub use clause::Assignment;
use clause::{Clause, ClauseKind};

/// Policy deciding which candidate versions to try for a package, and in
/// which order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VersionSelectionStrategy {
    /// Every repository version, highest first. Complete: any resolvable
    /// input resolves.
    #[default]
    LatestFirst,
    /// Maven-style: the dependant closest to the root decides, and its
    /// pick overrides farther constraints. Not complete, by design.
    NearestWins,
}

impl VersionSelectionStrategy {
    fn prioritized<R: Repository>(
        &self,
        state: &mut SearchState<'_, R>,
        package_name: &str,
    ) -> Result<Vec<Assignment>, RepositoryError> {
        match self {
            VersionSelectionStrategy::LatestFirst => Ok(state
                .available_versions(package_name)?
                .into_iter()
                .map(|version| Assignment::new(package_name, version))
                .collect()),
            VersionSelectionStrategy::NearestWins => {
                // The nearest dependant's requirement decides
                let depths = state.assignment_depths();
                let mut nearest: Option<(usize, Requirement)> = None;
                for clause in &state.clauses {
                    let ClauseKind::Dependency {
                        dependant,
                        requirement,
                    } = &clause.kind
                    else {
                        continue;
                    };
                    if requirement.package_name != package_name
                        || !state.assignments.contains(dependant)
                    {
                        continue;
                    }
                    let Some(&depth) = depths.get(dependant.package_name()) else {
                        continue;
                    };
                    match &nearest {
                        Some((best, _)) if *best <= depth => {}
                        _ => nearest = Some((depth, requirement.clone())),
                    }
                }

                let Some((_, requirement)) = nearest else {
                    return Ok(Vec::new());
                };
                // Versions come highest first, the first hit is the pick
                Ok(state
                    .available_versions(package_name)?
                    .into_iter()
                    .find(|version| requirement.version_set.contains(version))
                    .map(|version| vec![Assignment::forced(package_name, version)])
                    .unwrap_or_default())
            }
        }
    }
}

/// One requirement participating in an unresolvable conflict, with the
/// assignment that introduced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    /// The requirement that could not be satisfied together with the rest.
    pub requirement: Requirement,
    /// The assignment whose dependencies introduced it.
    pub required_by: Assignment,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [required by {}]", self.requirement, self.required_by)
    }
}

/// Resolution failed.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
#[non_exhaustive]
pub struct SolverError {
    /// What went wrong.
    pub source: SolverErrorKind,
}

/// The failure modes of a resolve.
#[derive(Debug, thiserror::Error)]
pub enum SolverErrorKind {
    /// The learned clauses prove no version of the package can satisfy
    /// every requirement reachable from the roots.
    #[error("no version of `{package_name}` satisfies all requirements")]
    NoAllowedVersions {
        /// The package the conflict centers on.
        package_name: String,
        /// The irreconcilable requirements, with provenance.
        conflicts: Vec<Conflict>,
        /// The root requirements that transitively produced the conflict.
        root_requirements: Vec<Requirement>,
    },
    /// The strategy produced no candidate and the package cannot be left
    /// unchosen.
    #[error("no candidate versions for package `{package_name}`")]
    EmptyCandidateSet {
        /// The package no candidate exists for.
        package_name: String,
    },
    /// The repository adapter failed; surfaced untouched.
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<RepositoryError> for SolverError {
    fn from(error: RepositoryError) -> Self {
        Self {
            source: SolverErrorKind::Repository(error),
        }
    }
}

impl SolverError {
    /// A multi-line, human-readable account of the failure.
    pub fn report(&self) -> String {
        match &self.source {
            SolverErrorKind::NoAllowedVersions {
                package_name,
                conflicts,
                root_requirements,
            } => {
                let mut lines =
                    vec![format!("no version of `{package_name}` satisfies all requirements")];
                for conflict in conflicts {
                    lines.push(format!("  {conflict}"));
                }
                if !root_requirements.is_empty() {
                    let roots: Vec<_> =
                        root_requirements.iter().map(ToString::to_string).collect();
                    lines.push(format!("root requirements involved: {}", roots.join(", ")));
                }
                lines.join("\n")
            }
            other => other.to_string(),
        }
    }
}

/// Resolves the given root requirements against a repository with the
/// default (latest-first) strategy.
///
/// Returns a map from package name to the chosen version's string, with
/// the root and explicitly-unchosen packages left out.
pub fn solve_dependencies<R: Repository>(
    root_requirements: Vec<Requirement>,
    repository: &R,
) -> Result<BTreeMap<String, String>, SolverError> {
    solve_dependencies_with_strategy(
        root_requirements,
        repository,
        VersionSelectionStrategy::default(),
    )
}

/// Resolves with an explicit version selection strategy.
pub fn solve_dependencies_with_strategy<R: Repository>(
    root_requirements: Vec<Requirement>,
    repository: &R,
    strategy: VersionSelectionStrategy,
) -> Result<BTreeMap<String, String>, SolverError> {
    let mut state = SearchState::new(repository);
    state.add_root_requirements(root_requirements);

    loop {
        if state.has_failed() {
            return Err(build_error(&state));
        }
        if state.is_solution_complete() {
            break;
        }
        let Some(package_name) = state.first_unassigned_package() else {
            // Everything referenced is assigned. Only a forced
            // (nearest-wins) commit can leave a clause unsatisfied here.
            break;
        };
        log::debug!("Looking at package {package_name}");

        // The sentinel goes first: if nothing positively demands the
        // package it is simply dropped
        let mut candidates = vec![Assignment::none(&package_name)];
        let from_strategy = strategy.prioritized(&mut state, &package_name)?;
        let strategy_was_empty = from_strategy.is_empty();
        candidates.extend(from_strategy);

        let mut chosen = None;
        let mut violations: Vec<usize> = Vec::new();
        for candidate in candidates {
            let violated = state.try_assignment(&candidate)?;
            if violated.is_empty() || candidate.force {
                chosen = Some(candidate);
                break;
            }
            log::debug!(
                "Candidate {candidate} violates {} clause(s)",
                violated.len()
            );
            for index in violated {
                if !violations.contains(&index) {
                    violations.push(index);
                }
            }
        }

        match chosen {
            Some(assignment) => {
                log::debug!("Assigning {assignment}");
                state.add_assignment(assignment)?;
            }
            None => {
                if strategy_was_empty && strategy == VersionSelectionStrategy::NearestWins {
                    return Err(SolverError {
                        source: SolverErrorKind::EmptyCandidateSet { package_name },
                    });
                }

                let learned = {
                    let violated: Vec<&Clause> =
                        violations.iter().map(|&i| &state.clauses[i]).collect();
                    Clause::learned(&package_name, violations.clone(), &violated)
                };
                log::debug!("No allowed versions for {package_name}, learned: {learned}");

                let involved: Vec<String> = learned
                    .package_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                state.clauses.push(learned);

                if let Some(deepest) = state.deepest_assignment_involving(&involved) {
                    state.backtrack(&deepest);
                }
            }
        }
    }

    Ok(state.solution())
}

// Extracts the root-visible cause of the failure: the focus package of the
// learned clause that is false at root, the conflicting requirements on
// it, and the root requirements the conflict traces back to.
fn build_error<R: Repository>(state: &SearchState<'_, R>) -> SolverError {
    let Some(index) = state.failed_clause_at_root() else {
        // Callers only get here after has_failed()
        return SolverError {
            source: SolverErrorKind::EmptyCandidateSet {
                package_name: crate::consts::ROOT_PACKAGE_NAME.to_string(),
            },
        };
    };

    let (package_name, causes) = match &state.clauses[index].kind {
        ClauseKind::Learned {
            package_name,
            causes,
        } => (package_name.clone(), causes.clone()),
        // A dependency or plain clause false at root names its own package
        _ => {
            let names = state.clauses[index].package_names();
            let package_name = names.last().map(|n| n.to_string()).unwrap_or_default();
            (package_name, Vec::new())
        }
    };

    let mut conflicts: Vec<Conflict> = Vec::new();
    let mut root_requirements: Vec<Requirement> = Vec::new();
    let mut queue: VecDeque<usize> = causes.into();
    let mut seen: HashSet<usize> = HashSet::new();

    while let Some(clause_index) = queue.pop_front() {
        if !seen.insert(clause_index) {
            continue;
        }
        match &state.clauses[clause_index].kind {
            ClauseKind::Learned { causes, .. } => queue.extend(causes.iter().copied()),
            ClauseKind::Dependency {
                dependant,
                requirement,
            } => {
                if dependant.is_root() && !root_requirements.contains(requirement) {
                    root_requirements.push(requirement.clone());
                }
                if requirement.package_name == package_name {
                    let conflict = Conflict {
                        requirement: requirement.clone(),
                        required_by: dependant.clone(),
                    };
                    if !conflicts.contains(&conflict) {
                        conflicts.push(conflict);
                    }
                }
            }
            ClauseKind::Plain => {}
        }
    }

    SolverError {
        source: SolverErrorKind::NoAllowedVersions {
            package_name,
            conflicts,
            root_requirements,
        },
    }
}
