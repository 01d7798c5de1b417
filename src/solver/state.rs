//! The mutable state of one solver invocation.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::repository::{Repository, RepositoryError};
use crate::requirement::Requirement;
use crate::solver::clause::{Assignment, Clause, ClauseKind, Term};
use crate::version::Version;

/// Holds everything the solver accumulates while searching: the ordered
/// assignments (root first), the monotone clause list, and the two memo
/// caches (loaded dependencies and repository version listings).
pub(crate) struct SearchState<'a, R> {
    repo: &'a R,
    pub(crate) assignments: Vec<Assignment>,
    pub(crate) clauses: Vec<Clause>,
    // (package, version) pairs whose requirements are already expanded into
    // Dependency clauses. Re-probing after a backtrack must not duplicate
    // clauses, the clause list only ever grows.
    loaded: HashSet<(String, Version)>,
    version_cache: HashMap<String, Vec<Version>>,
}

impl<'a, R: Repository> SearchState<'a, R> {
    pub(crate) fn new(repo: &'a R) -> Self {
        Self {
            repo,
            assignments: Vec::new(),
            clauses: Vec::new(),
            loaded: HashSet::new(),
            version_cache: HashMap::new(),
        }
    }

    /// Installs the root assignment and one Dependency clause per root
    /// requirement. Must be called exactly once, before anything else.
    pub(crate) fn add_root_requirements(&mut self, requirements: Vec<Requirement>) {
        let root = Assignment::root();
        // Pins the root so the solver cannot satisfy everything by
        // leaving it unchosen
        self.clauses
            .push(Clause::plain(vec![Term::positive(root.as_requirement())]));
        for requirement in requirements {
            self.clauses
                .push(Clause::dependency(root.clone(), requirement));
        }
        self.assignments.push(root);
    }

    pub(crate) fn assignment_for(&self, package_name: &str) -> Option<&Assignment> {
        self.assignments
            .iter()
            .find(|a| a.package_name == package_name)
    }

    pub(crate) fn has_assignment(&self, package_name: &str) -> bool {
        self.assignment_for(package_name).is_some()
    }

    /// Commits an assignment and expands its requirements into clauses.
    /// The package must not have a live assignment.
    pub(crate) fn add_assignment(&mut self, assignment: Assignment) -> Result<(), RepositoryError> {
        debug_assert!(!self.has_assignment(&assignment.package_name));
        self.assignments.push(assignment.clone());
        self.load_dependencies(&assignment)
    }

    /// Expands the requirements of `(package, version)` into Dependency
    /// clauses, once per pair for the lifetime of the search.
    pub(crate) fn load_dependencies(
        &mut self,
        assignment: &Assignment,
    ) -> Result<(), RepositoryError> {
        let Some(version) = &assignment.version else {
            return Ok(());
        };
        let key = (assignment.package_name.clone(), version.clone());
        if self.loaded.contains(&key) {
            return Ok(());
        }
        self.loaded.insert(key);

        let flags = self.flags_for(&assignment.package_name);
        let requirements =
            self.repo
                .get_dependencies(&assignment.package_name, version, &flags)?;
        for requirement in requirements {
            log::debug!("New dependency clause: {assignment} -> {requirement}");
            self.clauses
                .push(Clause::dependency(assignment.clone(), requirement));
        }
        Ok(())
    }

    // The union of the flags of every requirement naming this package
    fn flags_for(&self, package_name: &str) -> BTreeSet<String> {
        let mut flags = BTreeSet::new();
        for clause in &self.clauses {
            if let ClauseKind::Dependency { requirement, .. } = &clause.kind {
                if requirement.package_name == package_name {
                    flags.extend(requirement.flags.iter().cloned());
                }
            }
        }
        flags
    }

    /// Repository versions for a package, fetched once and kept sorted
    /// highest first.
    pub(crate) fn available_versions(
        &mut self,
        package_name: &str,
    ) -> Result<Vec<Version>, RepositoryError> {
        if let Some(versions) = self.version_cache.get(package_name) {
            return Ok(versions.clone());
        }
        let mut versions = self.repo.get_versions(package_name)?;
        versions.sort_unstable_by(|a, b| b.cmp(a));
        self.version_cache
            .insert(package_name.to_string(), versions.clone());
        Ok(versions)
    }

    /// Probes a candidate without committing it: loads its dependencies,
    /// swaps it in for the package's current assignment and returns the
    /// indices of all clauses about the package that become false.
    pub(crate) fn try_assignment(
        &mut self,
        candidate: &Assignment,
    ) -> Result<Vec<usize>, RepositoryError> {
        self.load_dependencies(candidate)?;

        let mut trial = Vec::with_capacity(self.assignments.len() + 1);
        trial.push(candidate.clone());
        trial.extend(
            self.assignments
                .iter()
                .filter(|a| a.package_name != candidate.package_name)
                .cloned(),
        );

        Ok(self
            .clauses
            .iter()
            .enumerate()
            .filter(|(_, clause)| {
                clause.mentions(&candidate.package_name)
                    && clause.truth_value(&trial) == Some(false)
            })
            .map(|(index, _)| index)
            .collect())
    }

    /// Undoes an assignment and, first, every assignment that was pulled
    /// in by one of its dependency clauses and still satisfies it. The
    /// root survives backtracking; its dependents do not.
    pub(crate) fn backtrack(&mut self, assignment: &Assignment) {
        let mut queue = vec![assignment.clone()];
        while let Some(current) = queue.pop() {
            for clause in &self.clauses {
                let ClauseKind::Dependency {
                    dependant,
                    requirement,
                } = &clause.kind
                else {
                    continue;
                };
                if dependant != &current {
                    continue;
                }
                let Some(child) = self.assignment_for(&requirement.package_name) else {
                    continue;
                };
                let satisfied = match &child.version {
                    Some(version) => requirement.version_set.contains(version),
                    None => false,
                };
                if satisfied && !child.is_root() && child != &current && !queue.contains(child) {
                    queue.push(child.clone());
                }
            }
            if !current.is_root() {
                log::debug!("Backtracking {current}");
                self.assignments.retain(|a| a != &current);
            }
        }
    }

    /// Shortest dependant-distance from the root for every assigned
    /// package, walking only live dependency edges (both endpoints
    /// currently assigned). Cycle-safe.
    pub(crate) fn assignment_depths(&self) -> HashMap<String, usize> {
        let mut depths: HashMap<String, usize> = HashMap::new();
        if let Some(root) = self.assignments.first() {
            depths.insert(root.package_name.clone(), 0);
        }
        loop {
            let mut changed = false;
            for clause in &self.clauses {
                let ClauseKind::Dependency {
                    dependant,
                    requirement,
                } = &clause.kind
                else {
                    continue;
                };
                if !self.assignments.contains(dependant)
                    || !self.has_assignment(&requirement.package_name)
                {
                    continue;
                }
                let Some(&parent_depth) = depths.get(&dependant.package_name) else {
                    continue;
                };
                let candidate = parent_depth + 1;
                match depths.get(&requirement.package_name) {
                    Some(&existing) if existing <= candidate => {}
                    _ => {
                        depths.insert(requirement.package_name.clone(), candidate);
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
        depths
    }

    /// The deepest assignment whose package is in the given list; the
    /// last one in assignment order wins ties.
    pub(crate) fn deepest_assignment_involving(
        &self,
        package_names: &[String],
    ) -> Option<Assignment> {
        let depths = self.assignment_depths();
        let mut deepest: Option<(usize, &Assignment)> = None;
        for assignment in &self.assignments {
            if !package_names.contains(&assignment.package_name) {
                continue;
            }
            let Some(&depth) = depths.get(&assignment.package_name) else {
                continue;
            };
            match deepest {
                Some((best, _)) if depth < best => {}
                _ => deepest = Some((depth, assignment)),
            }
        }
        deepest.map(|(_, assignment)| assignment.clone())
    }

    /// True once the learned clauses rule out every extension of the root:
    /// some clause is false against the root assignment alone.
    pub(crate) fn has_failed(&self) -> bool {
        self.failed_clause_at_root().is_some()
    }

    pub(crate) fn failed_clause_at_root(&self) -> Option<usize> {
        let root_only = &self.assignments[..1];
        self.clauses
            .iter()
            .position(|clause| clause.truth_value(root_only) == Some(false))
    }

    /// The first package referenced by any clause that has no assignment,
    /// in clause order.
    pub(crate) fn first_unassigned_package(&self) -> Option<String> {
        for clause in &self.clauses {
            for name in clause.package_names() {
                if !self.has_assignment(name) {
                    return Some(name.to_string());
                }
            }
        }
        None
    }

    /// Every clause evaluates to true under the current assignments.
    pub(crate) fn is_solution_complete(&self) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.truth_value(&self.assignments) == Some(true))
    }

    /// The solution map: every real assignment except the root, keyed by
    /// package, valued with the version's original spelling.
    pub(crate) fn solution(&self) -> BTreeMap<String, String> {
        self.assignments
            .iter()
            .filter(|a| !a.is_root())
            .filter_map(|a| {
                a.version
                    .as_ref()
                    .map(|v| (a.package_name.clone(), v.to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRepository;
    use std::str::FromStr;

    fn v(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    fn req(s: &str) -> Requirement {
        s.parse().unwrap()
    }

    fn basic_repo() -> InMemoryRepository {
        InMemoryRepository::from_entries(&[
            ("foo", "1.0", &["bar >=1.0"]),
            ("bar", "1.0", &["baz 1.0"]),
            ("baz", "1.0", &[]),
        ])
        .unwrap()
    }

    #[test]
    fn root_is_installed_first_and_pinned() {
        let repo = basic_repo();
        let mut state = SearchState::new(&repo);
        state.add_root_requirements(vec![req("foo >=1.0")]);

        assert_eq!(state.assignments.len(), 1);
        assert!(state.assignments[0].is_root());
        // The pin clause plus one dependency clause
        assert_eq!(state.clauses.len(), 2);
        assert!(!state.is_solution_complete());
        assert!(!state.has_failed());
    }

    #[test]
    fn loading_dependencies_is_memoized() {
        let repo = basic_repo();
        let mut state = SearchState::new(&repo);
        state.add_root_requirements(vec![req("foo >=1.0")]);

        let foo = Assignment::new("foo", v("1.0"));
        state.add_assignment(foo.clone()).unwrap();
        let clauses_after_first = state.clauses.len();
        assert_eq!(clauses_after_first, 3);

        state.backtrack(&foo);
        assert_eq!(state.assignments.len(), 1);
        // Clauses survive the backtrack and are not re-added on re-assignment
        assert_eq!(state.clauses.len(), clauses_after_first);
        state.add_assignment(foo).unwrap();
        assert_eq!(state.clauses.len(), clauses_after_first);
    }

    #[test]
    fn at_most_one_assignment_per_package() {
        let repo = basic_repo();
        let mut state = SearchState::new(&repo);
        state.add_root_requirements(vec![req("foo >=1.0")]);
        state.add_assignment(Assignment::new("foo", v("1.0"))).unwrap();

        let mut seen = HashSet::new();
        for assignment in &state.assignments {
            assert!(seen.insert(assignment.package_name.clone()));
        }
        assert!(state.has_assignment("foo"));
        assert!(state.assignment_for("bar").is_none());
    }

    #[test]
    fn backtrack_cascades_through_satisfied_dependencies() {
        let repo = basic_repo();
        let mut state = SearchState::new(&repo);
        state.add_root_requirements(vec![req("foo >=1.0")]);

        let foo = Assignment::new("foo", v("1.0"));
        state.add_assignment(foo.clone()).unwrap();
        state.add_assignment(Assignment::new("bar", v("1.0"))).unwrap();
        state.add_assignment(Assignment::new("baz", v("1.0"))).unwrap();
        assert_eq!(state.assignments.len(), 4);
        assert!(state.is_solution_complete());

        state.backtrack(&foo);
        // foo pulled in bar which pulled in baz; all three go, root stays
        assert_eq!(state.assignments.len(), 1);
        assert!(state.assignments[0].is_root());
    }

    #[test]
    fn backtrack_never_removes_the_root() {
        let repo = basic_repo();
        let mut state = SearchState::new(&repo);
        state.add_root_requirements(vec![req("foo >=1.0")]);
        state.add_assignment(Assignment::new("foo", v("1.0"))).unwrap();

        let root = state.assignments[0].clone();
        state.backtrack(&root);
        assert_eq!(state.assignments.len(), 1);
        assert!(state.assignments[0].is_root());
    }

    #[test]
    fn backtrack_spares_packages_assigned_for_other_reasons() {
        // foo and bar both need baz; undoing foo must not drag baz away
        // only because foo referenced it with a different version
        let repo = InMemoryRepository::from_entries(&[
            ("foo", "1.0", &["baz 2.0"]),
            ("baz", "1.0", &[]),
            ("baz", "2.0", &[]),
        ])
        .unwrap();
        let mut state = SearchState::new(&repo);
        state.add_root_requirements(vec![req("foo >=1.0"), req("baz 1.0")]);

        let foo = Assignment::new("foo", v("1.0"));
        state.add_assignment(foo.clone()).unwrap();
        state.add_assignment(Assignment::new("baz", v("1.0"))).unwrap();

        // baz 1.0 does not satisfy foo's `baz 2.0`, so it was not enabled
        // by foo and survives foo's backtrack
        state.backtrack(&foo);
        assert!(state.has_assignment("baz"));
        assert!(!state.has_assignment("foo"));
    }

    #[test]
    fn depths_follow_live_dependency_edges() {
        let repo = basic_repo();
        let mut state = SearchState::new(&repo);
        state.add_root_requirements(vec![req("foo >=1.0")]);
        state.add_assignment(Assignment::new("foo", v("1.0"))).unwrap();
        state.add_assignment(Assignment::new("bar", v("1.0"))).unwrap();
        state.add_assignment(Assignment::new("baz", v("1.0"))).unwrap();

        let depths = state.assignment_depths();
        assert_eq!(depths["__root__"], 0);
        assert_eq!(depths["foo"], 1);
        assert_eq!(depths["bar"], 2);
        assert_eq!(depths["baz"], 3);

        let deepest = state
            .deepest_assignment_involving(&["foo".to_string(), "baz".to_string()])
            .unwrap();
        assert_eq!(deepest.package_name(), "baz");
    }

    #[test]
    fn depths_are_finite_on_cycles() {
        let repo = InMemoryRepository::from_entries(&[
            ("ping", "1.0", &["pong 1.0"]),
            ("pong", "1.0", &["ping 1.0"]),
        ])
        .unwrap();
        let mut state = SearchState::new(&repo);
        state.add_root_requirements(vec![req("ping 1.0")]);
        state.add_assignment(Assignment::new("ping", v("1.0"))).unwrap();
        state.add_assignment(Assignment::new("pong", v("1.0"))).unwrap();

        let depths = state.assignment_depths();
        assert_eq!(depths["ping"], 1);
        assert_eq!(depths["pong"], 2);
    }

    #[test]
    fn first_unassigned_follows_clause_order() {
        let repo = basic_repo();
        let mut state = SearchState::new(&repo);
        state.add_root_requirements(vec![req("foo >=1.0"), req("baz 1.0")]);

        assert_eq!(state.first_unassigned_package().as_deref(), Some("foo"));
        state.add_assignment(Assignment::new("foo", v("1.0"))).unwrap();
        assert_eq!(state.first_unassigned_package().as_deref(), Some("baz"));
    }

    #[test]
    fn solution_skips_root_and_unchosen_packages() {
        let repo = basic_repo();
        let mut state = SearchState::new(&repo);
        state.add_root_requirements(vec![req("bar >=1.0")]);
        state.add_assignment(Assignment::new("bar", v("1.0"))).unwrap();
        state.add_assignment(Assignment::new("baz", v("1.0"))).unwrap();
        state.add_assignment(Assignment::none("quux")).unwrap();

        let solution = state.solution();
        assert_eq!(solution.len(), 2);
        assert_eq!(solution["bar"], "1.0");
        assert_eq!(solution["baz"], "1.0");
    }
}
