//! Resolution of pretrained tokenizer names to local definition files.
//!
//! Downloading is not done here: a name resolves only when its definition
//! already sits in the cache directory.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const CACHE_ENV: &str = "CTOKENIZERS_CACHE";
pub const DEFINITION_FILE: &str = "tokenizer.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromPretrainedParameters {
    pub revision: String,
    /// Access token for remote hubs. The local resolver ignores it.
    pub token: Option<String>,
}

impl Default for FromPretrainedParameters {
    fn default() -> Self {
        Self {
            revision: "main".to_owned(),
            token: None,
        }
    }
}

/// Maps a pretrained identifier to a tokenizer definition file.
pub trait Resolver: Send + Sync {
    fn resolve(&self, name: &str, params: &FromPretrainedParameters) -> Result<PathBuf>;
}

/// Looks names up in `<root>/<name with "/" as "--">/<revision>/tokenizer.json`.
#[derive(Debug, Clone)]
pub struct CacheResolver {
    root: PathBuf,
}

impl CacheResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `$CTOKENIZERS_CACHE`, else the user cache directory.
    pub fn from_env() -> Self {
        let root = env::var_os(CACHE_ENV)
            .map(PathBuf::from)
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("ctokenizers")))
            .unwrap_or_else(|| PathBuf::from(".ctokenizers"));
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('/').count() <= 2
        && name.split('/').all(|part| {
            !part.is_empty()
                && part != "."
                && part != ".."
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        })
}

impl Resolver for CacheResolver {
    fn resolve(&self, name: &str, params: &FromPretrainedParameters) -> Result<PathBuf> {
        if params.token.is_some() {
            log::debug!("access token ignored for cached lookup of {name}");
        }
        let local = Path::new(name).join(DEFINITION_FILE);
        if local.is_file() {
            return Ok(local);
        }
        if !is_valid_name(name) || !is_valid_name(&params.revision) {
            return Err(Error::NotFound(name.to_owned()));
        }
        let path = self
            .root
            .join(name.replace('/', "--"))
            .join(&params.revision)
            .join(DEFINITION_FILE);
        log::trace!("looking for {name}@{} at {}", params.revision, path.display());
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::NotFound(format!("{name}@{}", params.revision)))
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    pub fn check_cache_layout() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("org--model").join("main");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join(DEFINITION_FILE), "{}").unwrap();

        let resolver = CacheResolver::new(dir.path());
        let found = resolver
            .resolve("org/model", &FromPretrainedParameters::default())
            .unwrap();
        assert_eq!(found, target.join(DEFINITION_FILE));
    }

    #[test]
    pub fn check_unknown_names() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = CacheResolver::new(dir.path());
        let params = FromPretrainedParameters::default();
        for name in ["missing-model", "", "../etc", "a/b/c"] {
            assert!(
                matches!(resolver.resolve(name, &params), Err(Error::NotFound(_))),
                "{name:?} should not resolve"
            );
        }
    }

    #[test]
    pub fn check_revision_is_part_of_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("bert").join("v2");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join(DEFINITION_FILE), "{}").unwrap();

        let resolver = CacheResolver::new(dir.path());
        assert!(resolver
            .resolve("bert", &FromPretrainedParameters::default())
            .is_err());
        let params = FromPretrainedParameters {
            revision: "v2".into(),
            token: Some("secret".into()),
        };
        assert!(resolver.resolve("bert", &params).is_ok());
    }
}
