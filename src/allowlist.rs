//! Allowlist of tags that survive the cleanup
//!
//! The allowlist file is plain text with one tag per line. Surrounding
//! whitespace is trimmed, blank lines are ignored, and duplicates collapse.

use std::collections::HashSet;
use std::path::Path;

use crate::error::{CleanerError, Result};

/// Set of tag identifiers exempt from deletion
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Allowlist {
    tags: HashSet<String>,
}

impl Allowlist {
    /// Create an empty allowlist
    pub fn new() -> Self {
        Self {
            tags: HashSet::new(),
        }
    }

    /// Parse newline-delimited allowlist content
    pub fn parse(content: &str) -> Self {
        let tags = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self { tags }
    }

    /// Load the allowlist for an optional path
    ///
    /// `None` or an empty path yields an empty allowlist. A path that cannot
    /// be read is a configuration error.
    pub async fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => {
                tracing::info!("no allowlist file specified");
                return Ok(Self::new());
            }
        };

        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            CleanerError::ConfigError(format!(
                "could not read allowlist file '{}': {}",
                path.display(),
                e
            ))
        })?;

        let allowlist = Self::parse(&content);
        tracing::debug!(
            "Loaded {} allowlisted tags from {}",
            allowlist.len(),
            path.display()
        );
        Ok(allowlist)
    }

    /// Check if a tag is allowlisted
    pub fn contains(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Entries in sorted order, for display
    pub fn sorted(&self) -> Vec<&str> {
        let mut entries: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        entries.sort_unstable();
        entries
    }
}

impl<S: Into<String>> FromIterator<S> for Allowlist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            tags: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_trims_and_drops_blank_lines() {
        let allowlist = Allowlist::parse("  keep1 \n\n\tkeep2\n   \nkeep3\r\n");

        assert_eq!(allowlist.len(), 3);
        assert!(allowlist.contains("keep1"));
        assert!(allowlist.contains("keep2"));
        assert!(allowlist.contains("keep3"));
        assert!(!allowlist.contains(""));
        assert!(!allowlist.contains("  keep1 "));
    }

    #[test]
    fn test_parse_collapses_duplicates() {
        let allowlist = Allowlist::parse("rust\nrust\n rust \n");
        assert_eq!(allowlist.len(), 1);
    }

    #[test]
    fn test_sorted_entries() {
        let allowlist: Allowlist = ["zeta", "alpha", "mid"].into_iter().collect();
        assert_eq!(allowlist.sorted(), vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn test_load_without_path_is_empty() {
        assert!(Allowlist::load(None).await.unwrap().is_empty());
        assert!(Allowlist::load(Some(Path::new(""))).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("allowlist.txt");
        tokio::fs::write(&path, "keep1\n\n  keep2  \n").await.unwrap();

        let allowlist = Allowlist::load(Some(&path)).await.unwrap();
        assert_eq!(allowlist.sorted(), vec!["keep1", "keep2"]);
    }

    #[tokio::test]
    async fn test_load_unreadable_file_is_error() {
        let result = Allowlist::load(Some(Path::new("/nonexistent/allowlist.txt"))).await;
        let err = result.unwrap_err();
        assert!(matches!(err, CleanerError::ConfigError(_)));
        assert!(err.to_string().contains("could not read allowlist file"));
    }
}
