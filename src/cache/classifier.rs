//! Maps module-cache entries onto dependency units.
//!
//! A dependency unit is one version of one module: the directory the
//! toolchain extracted it into. Every file under the module cache belongs
//! to at most one unit, and the unit root is the granularity for both
//! watching and deletion.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Manifest file present at the root of every extracted module.
pub const MANIFEST_FILENAME: &str = "go.mod";

/// Version suffix for major versions >= 2 of modules without a manifest.
pub const INCOMPATIBLE_SUFFIX: &str = "+incompatible";

static PSEUDO_VERSION: OnceLock<Regex> = OnceLock::new();

fn pseudo_version_re() -> &'static Regex {
    PSEUDO_VERSION.get_or_init(|| {
        Regex::new(
            r"^v[0-9]+\.(0\.0-|\d+\.\d+-([^+]*\.)?0\.)\d{14}-[A-Za-z0-9]+(\+[0-9A-Za-z-]+(\.[0-9A-Za-z-]+)*)?$",
        )
        .expect("pseudo-version pattern compiles")
    })
}

/// Classify one filesystem entry.
///
/// Returns the root of the unit the entry identifies, or `None` when the
/// entry on its own says nothing about unit membership. Rules, in order:
///
/// 1. A manifest file, or any entry sitting next to one, belongs to the
///    unit rooted at its parent directory.
/// 2. A directory named `<module>@<version>` is a unit root when the
///    version is `+incompatible`, a valid semantic version, or a
///    pseudo-version.
///
/// Anything else is not a unit. Unrecognised shapes are never treated as
/// units so they are never deleted.
pub fn classify(
    path: &Path,
    is_dir: bool,
    name: &OsStr,
    has_manifest_sibling: bool,
) -> Option<PathBuf> {
    if (!is_dir && name == MANIFEST_FILENAME) || has_manifest_sibling {
        return path.parent().map(Path::to_path_buf);
    }

    if is_dir && is_versioned_dir_name(name) {
        return Some(path.to_path_buf());
    }

    None
}

/// Whether a directory name has the `<module>@<version>` shape of a unit.
pub fn is_versioned_dir_name(name: &OsStr) -> bool {
    let Some(name) = name.to_str() else {
        return false;
    };
    let mut parts = name.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(module), Some(version), None) if !module.is_empty() => is_unit_version(version),
        _ => false,
    }
}

/// Whether a version token names an extracted module version.
pub fn is_unit_version(version: &str) -> bool {
    version.ends_with(INCOMPATIBLE_SUFFIX) || is_semver(version) || is_pseudo_version(version)
}

/// Canonical module versions carry a leading `v`.
fn is_semver(version: &str) -> bool {
    version
        .strip_prefix('v')
        .is_some_and(|v| semver::Version::parse(v).is_ok())
}

/// Whether `version` has the shape of a toolchain-synthesised
/// pseudo-version (`vX.Y.Z-yyyymmddhhmmss-abcdef123456`).
pub fn is_pseudo_version(version: &str) -> bool {
    version.matches('-').count() >= 2 && is_semver(version) && pseudo_version_re().is_match(version)
}

/// Whether `dir` contains a manifest file.
pub fn has_manifest(dir: &Path) -> bool {
    dir.join(MANIFEST_FILENAME).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify_dir(path: &str) -> Option<PathBuf> {
        let path = Path::new(path);
        classify(path, true, path.file_name().unwrap(), false)
    }

    #[test]
    fn test_semver_dir_is_unit() {
        assert_eq!(
            classify_dir("/mod/example.com/pkg@v1.2.3"),
            Some(PathBuf::from("/mod/example.com/pkg@v1.2.3"))
        );
        assert!(classify_dir("/mod/pkg@v1.2.3-rc.1").is_some());
    }

    #[test]
    fn test_pseudo_version_dir_is_unit() {
        assert!(classify_dir("/mod/pkg@v0.0.0-20210101000000-abcdef123456").is_some());
        assert!(is_pseudo_version("v0.0.0-20210101000000-abcdef123456"));
        assert!(is_pseudo_version("v1.2.4-0.20210101000000-abcdef123456"));
        assert!(is_pseudo_version("v1.3.0-pre.0.20210101000000-abcdef123456"));
        assert!(!is_pseudo_version("v1.2.3"));
        assert!(!is_pseudo_version("v0.0.0-2021-abcdef"));
    }

    #[test]
    fn test_incompatible_dir_is_unit() {
        assert!(classify_dir("/mod/pkg@1.0+incompatible").is_some());
        assert!(classify_dir("/mod/pkg@v2.0.0+incompatible").is_some());
    }

    #[test]
    fn test_unrecognised_versions_are_not_units() {
        assert_eq!(classify_dir("/mod/pkg@notaversion"), None);
        assert_eq!(classify_dir("/mod/pkg@v1.2.3.tmp-4821"), None);
        assert_eq!(classify_dir("/mod/cache/download/pkg/@v"), None);
        assert_eq!(classify_dir("/mod/a@v1.0.0@v2.0.0"), None);
        assert_eq!(classify_dir("/mod/github.com"), None);
    }

    #[test]
    fn test_versioned_file_is_not_unit() {
        let path = Path::new("/mod/pkg@v1.2.3");
        assert_eq!(classify(path, false, path.file_name().unwrap(), false), None);
    }

    #[test]
    fn test_manifest_marks_parent() {
        let path = Path::new("/mod/vendor/tree/go.mod");
        assert_eq!(
            classify(path, false, OsStr::new("go.mod"), false),
            Some(PathBuf::from("/mod/vendor/tree"))
        );
    }

    #[test]
    fn test_manifest_sibling_marks_parent() {
        let path = Path::new("/mod/vendor/tree/LICENSE");
        assert_eq!(
            classify(path, false, OsStr::new("LICENSE"), true),
            Some(PathBuf::from("/mod/vendor/tree"))
        );
    }

    #[test]
    fn test_manifest_rule_takes_precedence() {
        let path = Path::new("/mod/tree/inner@v1.0.0");
        assert_eq!(
            classify(path, true, OsStr::new("inner@v1.0.0"), true),
            Some(PathBuf::from("/mod/tree"))
        );
    }

    #[test]
    fn test_classification_is_idempotent() {
        let inputs = [
            "/mod/pkg@v1.2.3",
            "/mod/pkg@v0.0.0-20210101000000-abcdef123456",
            "/mod/pkg@notaversion",
        ];
        for input in inputs {
            let first = classify_dir(input);
            let second = classify_dir(input);
            assert_eq!(first, second, "{input}");

            if let Some(unit) = first {
                let again = classify(&unit, true, unit.file_name().unwrap(), false);
                assert_eq!(again, Some(unit));
            }
        }
    }
}
