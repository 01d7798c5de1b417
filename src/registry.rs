//! A repository adapter speaking a pypi-style JSON registry API.
//!
//! Two endpoints are used: `{base}/{name}/json` lists the releases of a
//! package, `{base}/{name}/{version}/json` carries the requirements of
//! one release. Responses are memoized per client so a resolve sees a
//! stable view of the registry.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use url::Url;

use crate::consts::split_flagged_name;
use crate::repository::{Repository, RepositoryError, RepositoryErrorKind};
use crate::requirement::Requirement;
use crate::version::{Version, parse_requirement, parse_version};

fn name_separators() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-_.]+").expect("valid regex"))
}

/// Folds a registry package name to its canonical form: lower case, with
/// runs of `-`, `_` and `.` collapsed into a single `-`.
pub fn normalize_package_name(name: &str) -> String {
    name_separators()
        .replace_all(&name.to_lowercase(), "-")
        .into_owned()
}

#[derive(Debug, Deserialize)]
struct ReleaseIndex {
    releases: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ReleaseMetadata {
    info: ReleaseInfo,
}

#[derive(Debug, Default, Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
    // Optional requirement groups, selected by flags
    #[serde(default)]
    requires_flagged: HashMap<String, Vec<String>>,
}

/// An HTTP client for a pypi-style registry, usable as a solver
/// [`Repository`].
///
/// Flagged requirements coming back from the registry are rewritten into
/// synthetic `pkg$$flag` names, and synthetic names are decoded again on
/// lookup, so extras resolve without any solver support: `pkg$$flag` has
/// the same versions as `pkg`, pins `pkg` to its own version and adds the
/// flag's requirement group.
pub struct RegistryClient {
    base_url: Url,
    agent: ureq::Agent,
    versions_cache: RefCell<HashMap<String, Vec<Version>>>,
    dependencies_cache: RefCell<HashMap<(String, String, String), Vec<Requirement>>>,
}

impl RegistryClient {
    /// A client for the registry rooted at `base_url`.
    pub fn new(base_url: Url) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .build();
        Self {
            base_url,
            agent,
            versions_cache: RefCell::new(HashMap::new()),
            dependencies_cache: RefCell::new(HashMap::new()),
        }
    }

    fn endpoint(&self, parts: &[&str]) -> String {
        let mut url = self.base_url.as_str().trim_end_matches('/').to_string();
        for part in parts {
            url.push('/');
            url.push_str(part);
        }
        url
    }

    // GET + JSON decode; a 404 becomes None so callers can treat unknown
    // packages as having no versions
    fn fetch<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> Result<Option<T>, RepositoryError> {
        log::trace!("Fetching {url}");
        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(ureq::Error::Status(code, _)) => {
                return Err(RepositoryError {
                    source: RepositoryErrorKind::Status(code),
                });
            }
            Err(e) => return Err(Box::new(e).into()),
        };
        Ok(Some(response.into_json::<T>()?))
    }

    fn release_requirements(
        &self,
        info: &ReleaseInfo,
        flags: &BTreeSet<String>,
    ) -> Result<Vec<Requirement>, RepositoryError> {
        let mut requirements = Vec::new();
        for spec in info.requires_dist.as_deref().unwrap_or_default() {
            let requirement = parse_requirement(spec)?;
            requirements.extend(requirement.expand_flags());
        }
        for flag in flags {
            for spec in info.requires_flagged.get(flag).into_iter().flatten() {
                let requirement = parse_requirement(spec)?;
                requirements.extend(requirement.expand_flags());
            }
        }
        Ok(requirements)
    }
}

impl Repository for RegistryClient {
    fn get_versions(&self, package_name: &str) -> Result<Vec<Version>, RepositoryError> {
        // A synthetic `pkg$$flag` has exactly the versions of `pkg`
        let (base_name, _) = split_flagged_name(package_name);
        let normalized = normalize_package_name(base_name);

        if let Some(versions) = self.versions_cache.borrow().get(&normalized) {
            return Ok(versions.clone());
        }

        let url = self.endpoint(&[&normalized, "json"]);
        let mut versions = Vec::new();
        if let Some(index) = self.fetch::<ReleaseIndex>(&url)? {
            for release in index.releases.keys() {
                match parse_version(release) {
                    Ok(version) => versions.push(version),
                    Err(_) => {
                        log::warn!("Ignoring unparseable version `{release}` of `{normalized}`");
                    }
                }
            }
        }
        versions.sort_unstable_by(|a, b| b.cmp(a));

        self.versions_cache
            .borrow_mut()
            .insert(normalized, versions.clone());
        Ok(versions)
    }

    fn get_dependencies(
        &self,
        package_name: &str,
        version: &Version,
        flags: &BTreeSet<String>,
    ) -> Result<Vec<Requirement>, RepositoryError> {
        let (base_name, flag) = split_flagged_name(package_name);
        let normalized = normalize_package_name(base_name);

        let mut effective_flags = flags.clone();
        if let Some(flag) = flag {
            effective_flags.insert(flag.to_string());
        }
        let flags_key = effective_flags
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join(",");
        let cache_key = (normalized.clone(), version.to_string(), flags_key);
        if let Some(requirements) = self.dependencies_cache.borrow().get(&cache_key) {
            return Ok(requirements.clone());
        }

        let url = self.endpoint(&[&normalized, &version.to_string(), "json"]);
        let mut requirements = match self.fetch::<ReleaseMetadata>(&url)? {
            Some(metadata) => self.release_requirements(&metadata.info, &effective_flags)?,
            None => Vec::new(),
        };

        // The synthetic package rides along with the base package at the
        // exact same version
        if flag.is_some() {
            requirements.insert(
                0,
                Requirement::new(
                    normalized.clone(),
                    crate::version::VersionSet::Eq(version.clone()),
                ),
            );
        }

        self.dependencies_cache
            .borrow_mut()
            .insert(cache_key, requirements.clone());
        Ok(requirements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn client(server: &mockito::Server) -> RegistryClient {
        RegistryClient::new(Url::parse(&server.url()).unwrap())
    }

    fn v(s: &str) -> Version {
        Version::from_str(s).unwrap()
    }

    #[test]
    fn normalizes_names() {
        assert_eq!(normalize_package_name("Requests"), "requests");
        assert_eq!(normalize_package_name("zope.interface"), "zope-interface");
        assert_eq!(normalize_package_name("foo__bar.-baz"), "foo-bar-baz");
    }

    #[test]
    fn lists_versions_highest_first_and_skips_junk() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("GET", "/requests/json")
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"releases": {"1.0": [], "2.0": [], "1.5": [], "oops!": []}}"#)
            .create();

        let client = client(&server);
        let versions = client.get_versions("Requests").unwrap();
        mock.assert();
        let rendered: Vec<_> = versions.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["2.0", "1.5", "1.0"]);

        // Memoized: a second call does not hit the server again
        let versions = client.get_versions("requests").unwrap();
        assert_eq!(versions.len(), 3);
    }

    #[test]
    fn unknown_package_has_no_versions() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/ghost/json")
            .with_status(404)
            .create();

        let client = client(&server);
        assert!(client.get_versions("ghost").unwrap().is_empty());
    }

    #[test]
    fn server_errors_are_surfaced() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/flaky/json")
            .with_status(500)
            .create();

        let client = client(&server);
        let err = client.get_versions("flaky").unwrap_err();
        assert!(matches!(err.source, RepositoryErrorKind::Status(500)));
    }

    #[test]
    fn fetches_and_expands_dependencies() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/requests/2.0/json")
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body(
                r#"{"info": {"requires_dist": ["urllib3 >=1.21 & <3", "chardet[speed] >=3.0"]}}"#,
            )
            .create();

        let client = client(&server);
        let deps = client
            .get_dependencies("requests", &v("2.0"), &BTreeSet::new())
            .unwrap();
        let names: Vec<_> = deps.iter().map(|d| d.package_name.as_str()).collect();
        assert_eq!(names, vec!["urllib3", "chardet", "chardet$$speed"]);
        assert!(deps.iter().all(|d| d.flags.is_empty()));
    }

    #[test]
    fn flags_select_requirement_groups() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/requests/2.0/json")
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body(
                r#"{"info": {"requires_dist": ["urllib3 >=1.21"],
                            "requires_flagged": {"socks": ["pysocks >=1.5"]}}}"#,
            )
            .create();

        let client = client(&server);

        let plain = client
            .get_dependencies("requests", &v("2.0"), &BTreeSet::new())
            .unwrap();
        assert_eq!(plain.len(), 1);

        let flags: BTreeSet<String> = ["socks".to_string()].into();
        let flagged = client
            .get_dependencies("requests", &v("2.0"), &flags)
            .unwrap();
        let names: Vec<_> = flagged.iter().map(|d| d.package_name.as_str()).collect();
        assert_eq!(names, vec!["urllib3", "pysocks"]);
    }

    #[test]
    fn synthetic_names_pin_the_base_package() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/requests/json")
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"releases": {"2.0": []}}"#)
            .expect_at_most(1)
            .create();
        server
            .mock("GET", "/requests/2.0/json")
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body(
                r#"{"info": {"requires_dist": [],
                            "requires_flagged": {"socks": ["pysocks >=1.5"]}}}"#,
            )
            .create();

        let client = client(&server);

        // The synthetic package lists the base package's versions
        let versions = client.get_versions("requests$$socks").unwrap();
        assert_eq!(versions, vec![v("2.0")]);

        // And depends on the base at the same version plus the flag group
        let deps = client
            .get_dependencies("requests$$socks", &v("2.0"), &BTreeSet::new())
            .unwrap();
        let rendered: Vec<_> = deps.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["requests 2.0", "pysocks >=1.5"]);
    }

    #[test]
    fn bad_metadata_is_a_parse_error() {
        let mut server = mockito::Server::new();
        server
            .mock("GET", "/broken/1.0/json")
            .with_status(200)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"info": {"requires_dist": ["not a requirement >= ??"]}}"#)
            .create();

        let client = client(&server);
        let err = client
            .get_dependencies("broken", &v("1.0"), &BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err.source, RepositoryErrorKind::Parse(_)));
    }
}
