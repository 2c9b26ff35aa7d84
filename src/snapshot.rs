//! Workspace snapshots and file diffs
//!
//! A [`Snapshot`] is an in-memory copy of a workspace tree. Comparing the
//! snapshots taken before and after a step yields the step's [`FileChange`]s,
//! which are what the cache stores and what changeset diffs are rendered from.
//!
//! Contents are kept as raw bytes. Diffs are rendered as text only when both
//! sides are valid UTF-8; anything else gets git's `Binary files ... differ`
//! line.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use similar::TextDiff;
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// A change to a single file, relative to the repository root.
///
/// `before` is `None` for created files and `after` is `None` for deleted
/// files. Contents are serialized as base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    #[serde(with = "base64_content")]
    pub before: Option<Vec<u8>>,
    #[serde(with = "base64_content")]
    pub after: Option<Vec<u8>>,
}

mod base64_content {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(content: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match content {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// In-memory copy of a directory tree
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Files stored as relative path -> content, `/`-separated
    files: BTreeMap<String, Vec<u8>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every file below `root`, skipping `.git` directories
    pub fn capture(root: &Path) -> Result<Self> {
        let mut snapshot = Self::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git");

        for entry in walker {
            let entry = entry.map_err(|e| Error::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .map_err(|e| Error::Io(std::io::Error::other(e)))?;
            snapshot.insert(&relative_key(relative), fs::read(entry.path())?);
        }

        Ok(snapshot)
    }

    pub fn insert(&mut self, path: &str, content: impl Into<Vec<u8>>) {
        self.files.insert(path.to_string(), content.into());
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Relative paths of all files, sorted
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Content fingerprint of the whole tree
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for (path, content) in &self.files {
            hasher.update(path.as_bytes());
            hasher.update(&[0]);
            hasher.update(content);
            hasher.update(&[0]);
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Changes that turn `self` into `after`, ordered by path
    pub fn changes_to(&self, after: &Snapshot) -> Vec<FileChange> {
        let mut changes = Vec::new();

        for (path, before) in &self.files {
            match after.files.get(path) {
                Some(content) if content == before => {}
                Some(content) => changes.push(FileChange {
                    path: path.clone(),
                    before: Some(before.clone()),
                    after: Some(content.clone()),
                }),
                None => changes.push(FileChange {
                    path: path.clone(),
                    before: Some(before.clone()),
                    after: None,
                }),
            }
        }
        for (path, content) in &after.files {
            if !self.files.contains_key(path) {
                changes.push(FileChange {
                    path: path.clone(),
                    before: None,
                    after: Some(content.clone()),
                });
            }
        }

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        changes
    }
}

fn relative_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Fold sequential change lists into the net change per path.
///
/// Paths whose final content equals their original content are dropped, so a
/// step that reverts an earlier step cancels it out.
pub fn compose_changes<'a, I>(steps: I) -> Vec<FileChange>
where
    I: IntoIterator<Item = &'a [FileChange]>,
{
    let mut net: BTreeMap<String, FileChange> = BTreeMap::new();

    for changes in steps {
        for change in changes {
            net.entry(change.path.clone())
                .and_modify(|existing| existing.after = change.after.clone())
                .or_insert_with(|| change.clone());
        }
    }

    net.into_values()
        .filter(|change| change.before != change.after)
        .collect()
}

/// Render changes as a git-style unified diff
pub fn render_diff(changes: &[FileChange]) -> String {
    let mut out = String::new();

    for change in changes {
        let a = format!("a/{}", change.path);
        let b = format!("b/{}", change.path);

        out.push_str(&format!("diff --git {} {}\n", a, b));
        let (old_header, new_header) = match (&change.before, &change.after) {
            (None, _) => {
                out.push_str("new file mode 100644\n");
                ("/dev/null", b.as_str())
            }
            (_, None) => {
                out.push_str("deleted file mode 100644\n");
                (a.as_str(), "/dev/null")
            }
            _ => (a.as_str(), b.as_str()),
        };

        let (Some(old), Some(new)) = (as_text(&change.before), as_text(&change.after)) else {
            out.push_str(&format!("Binary files {} and {} differ\n", old_header, new_header));
            continue;
        };
        let diff = TextDiff::from_lines(old, new);
        out.push_str(
            &diff
                .unified_diff()
                .context_radius(3)
                .header(old_header, new_header)
                .to_string(),
        );
    }

    out
}

/// Content as text; a missing side is empty. `None` if not UTF-8.
fn as_text(content: &Option<Vec<u8>>) -> Option<&str> {
    match content {
        Some(bytes) => std::str::from_utf8(bytes).ok(),
        None => Some(""),
    }
}

/// Replay changes onto a directory tree
pub fn apply_changes(root: &Path, changes: &[FileChange]) -> Result<()> {
    for change in changes {
        let full_path = root.join(&change.path);
        match &change.after {
            Some(content) => {
                if let Some(parent) = full_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&full_path, content)?;
            }
            None => {
                if full_path.exists() {
                    fs::remove_file(&full_path)?;
                }
            }
        }
    }
    Ok(())
}
