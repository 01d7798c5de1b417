/// Reserved package name anchoring the search. It can never appear in a
/// repository and is excluded from reported solutions.
pub const ROOT_PACKAGE_NAME: &str = "__root__";

/// Version string given to the root assignment.
pub(crate) const ROOT_VERSION: &str = "1.0";

/// Separator used when an adapter encodes `pkg[flag]` as a synthetic
/// package name. `$` cannot appear in a real package name so the encoding
/// is unambiguous.
pub const FLAG_SEPARATOR: &str = "$$";

/// Splits a possibly-synthetic package name into its base name and flag.
pub fn split_flagged_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once(FLAG_SEPARATOR) {
        Some((base, flag)) => (base, Some(flag)),
        None => (name, None),
    }
}
