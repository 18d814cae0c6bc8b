use crate::errors::StoreError;
use anyhow::Context;
use std::path::{Component, Path, PathBuf};

/// Key-addressed text storage for datasets, secrets and exported artifacts.
pub trait BlobStore: Send + Sync {
    fn get_text(&self, key: &str) -> anyhow::Result<String>;
    fn put_text(&self, key: &str, content: &str) -> anyhow::Result<()>;
    /// API key for `provider`, scoped to `owner`.
    fn get_secret(&self, owner: &str, provider: &str) -> anyhow::Result<String>;
}

pub fn dataset_key(name: &str) -> String {
    format!("datasets/{}.jsonl", name)
}

pub fn secret_key(owner: &str, provider: &str) -> String {
    format!("secrets/{}/{}", owner, provider)
}

/// Name of the environment variable consulted when no secret blob exists.
pub fn secret_env_var(provider: &str) -> String {
    let mut name: String = provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    name.push_str("_API_KEY");
    name
}

/// Blob store rooted at a local directory. Keys are relative paths.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
    env_secrets: bool,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            env_secrets: true,
        }
    }

    /// Disable the `<PROVIDER>_API_KEY` fallback.
    pub fn without_env_secrets(mut self) -> Self {
        self.env_secrets = false;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> anyhow::Result<PathBuf> {
        let rel = Path::new(key);
        if key.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            anyhow::bail!("invalid blob key {:?}", key);
        }
        Ok(self.root.join(rel))
    }
}

impl BlobStore for FsBlobStore {
    fn get_text(&self, key: &str) -> anyhow::Result<String> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::not_found("blob", key).into())
            }
            Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn put_text(&self, key: &str, content: &str) -> anyhow::Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(&path, content)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    fn get_secret(&self, owner: &str, provider: &str) -> anyhow::Result<String> {
        match self.get_text(&secret_key(owner, provider)) {
            Ok(s) => return Ok(s.trim().to_string()),
            Err(e) if e.downcast_ref::<StoreError>().is_none() => return Err(e),
            Err(_) => {}
        }
        if self.env_secrets {
            if let Ok(v) = std::env::var(secret_env_var(provider)) {
                if !v.trim().is_empty() {
                    return Ok(v.trim().to_string());
                }
            }
        }
        Err(StoreError::not_found("secret", format!("{}/{}", owner, provider)).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        store.put_text("details/m/d/run.jsonl", "{}\n").unwrap();
        assert_eq!(store.get_text("details/m/d/run.jsonl").unwrap(), "{}\n");
    }

    #[test]
    fn missing_blob_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = FsBlobStore::new(dir.path())
            .get_text(&dataset_key("nope"))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NotFound { kind: "blob", .. })
        ));
    }

    #[test]
    fn keys_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for key in ["../x", "/etc/passwd", "a/../../b", ""] {
            assert!(store.get_text(key).is_err(), "{}", key);
            assert!(store.put_text(key, "x").is_err(), "{}", key);
        }
    }

    #[test]
    fn secrets_are_scoped_by_owner_and_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path()).without_env_secrets();
        store
            .put_text(&secret_key("alice", "openai"), "sk-test\n")
            .unwrap();
        assert_eq!(store.get_secret("alice", "openai").unwrap(), "sk-test");
        assert!(store.get_secret("bob", "openai").is_err());
    }

    #[test]
    fn env_var_name_from_provider() {
        assert_eq!(secret_env_var("openai"), "OPENAI_API_KEY");
        assert_eq!(secret_env_var("together-ai"), "TOGETHER_AI_API_KEY");
    }
}
