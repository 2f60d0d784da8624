use std::path::{Path, PathBuf};

/// Source text of an imported module plus the specifier it is known by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub source: String,
    pub specifier: String,
}

/// Supplies the source of imported modules.
///
/// `referrer` is the specifier of the importing module and `specifier` the
/// string written in the import declaration. `None` means the module cannot
/// be found.
pub trait SourceResolver {
    fn resolve(&self, referrer: &str, specifier: &str) -> Option<ResolvedSource>;
}

impl<F> SourceResolver for F
where
    F: Fn(&str, &str) -> Option<ResolvedSource>,
{
    fn resolve(&self, referrer: &str, specifier: &str) -> Option<ResolvedSource> {
        self(referrer, specifier)
    }
}

/// Resolves imports against the filesystem, relative to the importing file.
///
/// Referrers that are not paths (e.g. `(anonymous)`) resolve against `root`.
#[derive(Debug, Clone)]
pub struct FsResolver {
    root: PathBuf,
}

impl FsResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn base_dir(&self, referrer: &str) -> PathBuf {
        let path = Path::new(referrer);
        if path.is_file() {
            if let Some(parent) = path.parent() {
                return parent.to_path_buf();
            }
        }
        self.root.clone()
    }
}

impl SourceResolver for FsResolver {
    fn resolve(&self, referrer: &str, specifier: &str) -> Option<ResolvedSource> {
        let path = self.base_dir(referrer).join(specifier);
        match std::fs::read_to_string(&path) {
            Ok(source) => Some(ResolvedSource {
                source,
                specifier: path.display().to_string(),
            }),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "import not readable");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("rnp-resolve-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn closures_are_resolvers() {
        let resolver = |_: &str, spec: &str| {
            (spec == "lib").then(|| ResolvedSource {
                source: "export macro m() { 1 }".into(),
                specifier: "lib.rnp".into(),
            })
        };
        assert_eq!(resolver.resolve("main", "lib").unwrap().specifier, "lib.rnp");
        assert!(resolver.resolve("main", "other").is_none());
    }

    #[test]
    fn fs_resolver_is_relative_to_referrer() {
        let dir = scratch_dir("relative");
        std::fs::create_dir_all(dir.join("sub")).unwrap();
        std::fs::write(dir.join("sub/main.rnp"), "import { m } from 'lib.rnp';").unwrap();
        std::fs::write(dir.join("sub/lib.rnp"), "export macro m() { 1 }").unwrap();

        let resolver = FsResolver::new("/nonexistent");
        let referrer = dir.join("sub/main.rnp").display().to_string();
        let resolved = resolver.resolve(&referrer, "lib.rnp").unwrap();
        assert_eq!(resolved.source, "export macro m() { 1 }");
        assert!(resolved.specifier.ends_with("lib.rnp"));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn fs_resolver_falls_back_to_root() {
        let dir = scratch_dir("root");
        std::fs::write(dir.join("lib.rnp"), "1;").unwrap();
        let resolver = FsResolver::new(&dir);
        assert_eq!(resolver.resolve("(anonymous)", "lib.rnp").unwrap().source, "1;");
        assert!(resolver.resolve("(anonymous)", "missing.rnp").is_none());
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
