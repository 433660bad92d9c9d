use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::RelayError;

/// Max characters of the prompt slug in a run directory name.
pub const SLUG_MAX: usize = 40;

/// One build's output directory.
///
/// Every artifact write goes through [`BuildRun::write_text`], which refuses
/// paths that would land outside the directory and records a SHA-256 digest
/// of what was written.
#[derive(Debug)]
pub struct BuildRun {
    id: String,
    dir: PathBuf,
    digests: BTreeMap<String, String>,
}

impl BuildRun {
    /// Create `<runs_dir>/<YYYYmmdd-HHMMSS>-<slug>`. Same-second runs with the
    /// same slug share a directory.
    pub async fn create(
        runs_dir: &Path,
        title: &str,
        now: DateTime<Utc>,
    ) -> Result<Self, RelayError> {
        let id = format!("{}-{}", now.format("%Y%m%d-%H%M%S"), slugify(title));
        Self::at(runs_dir.join(&id)).await
    }

    /// Use an explicit directory, creating it if needed.
    pub async fn at(dir: PathBuf) -> Result<Self, RelayError> {
        tokio::fs::create_dir_all(&dir).await?;
        let id = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "run".to_string());
        Ok(Self {
            id,
            dir,
            digests: BTreeMap::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Relative path -> hex SHA-256 of everything written so far.
    pub fn digests(&self) -> &BTreeMap<String, String> {
        &self.digests
    }

    pub fn resolve(&self, rel: &str) -> Result<PathBuf, RelayError> {
        Ok(self.dir.join(safe_relative_path(rel)?))
    }

    pub async fn exists(&self, rel: &str) -> bool {
        match self.resolve(rel) {
            Ok(p) => tokio::fs::try_exists(p).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Write `content` to `rel`, creating parent directories.
    pub async fn write_text(&mut self, rel: &str, content: &str) -> Result<PathBuf, RelayError> {
        let clean = safe_relative_path(rel)?;
        let path = self.dir.join(&clean);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content.as_bytes()).await?;

        let key = clean.to_string_lossy().replace('\\', "/");
        self.digests
            .insert(key, hex::encode(Sha256::digest(content.as_bytes())));
        Ok(path)
    }
}

/// Lowercase, keep alphanumerics plus `-`, `_` and spaces, trim, spaces to
/// dashes, cap at [`SLUG_MAX`] characters. Empty input becomes `project`.
pub fn slugify(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | ' '))
        .collect();
    let slug: String = kept.trim().replace(' ', "-").chars().take(SLUG_MAX).collect();
    if slug.is_empty() {
        "project".to_string()
    } else {
        slug
    }
}

/// Validate a generated relative path.
///
/// Rejects empty paths, absolute paths (including Windows drive and UNC
/// forms) and any `..` component. `.` components are dropped. Backslashes are
/// treated as separators.
pub fn safe_relative_path(rel: &str) -> Result<PathBuf, RelayError> {
    let normalized = rel.trim().replace('\\', "/");
    let unsafe_path = || RelayError::UnsafePath(rel.to_string());

    if normalized.is_empty() || normalized.starts_with('/') {
        return Err(unsafe_path());
    }
    // `C:` style prefixes are not absolute on unix but still escape on windows.
    if normalized.len() >= 2 && normalized.as_bytes()[1] == b':' {
        return Err(unsafe_path());
    }

    let mut clean = PathBuf::new();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(unsafe_path());
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(unsafe_path());
    }
    Ok(clean)
}
