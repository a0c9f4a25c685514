//! Change detection
//!
//! Turns the file lists of the commits in a push into one net change per path.
//! Commits are replayed in push order, so the last action on a path wins.

use std::collections::BTreeMap;

use glob::{MatchOptions, Pattern};

use crate::config::GeneratorConfig;
use crate::error::{Error, Result};
use crate::github::{CommitFile, FileStatus, TreeEntry};
use crate::webhook::PushEvent;

/// Net effect of a push on one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Modified => "modified",
            ChangeKind::Removed => "removed",
        }
    }
}

/// A path and what happened to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub kind: ChangeKind,
}

/// Ordered set of net file changes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    changes: BTreeMap<String, ChangeKind>,
}

impl ChangeSet {
    /// Replay commit file lists in order.
    pub fn from_commits(commits: &[(String, Vec<CommitFile>)]) -> Self {
        let mut set = Self::default();
        for (_, files) in commits {
            for file in files {
                set.apply_commit_file(file);
            }
        }
        set
    }

    /// Build from the `added`/`removed`/`modified` lists embedded in a push payload.
    pub fn from_push_payload(push: &PushEvent) -> Self {
        let mut set = Self::default();
        for commit in &push.commits {
            set.apply_payload_commit(commit);
        }
        set
    }

    /// Every blob in a tree, as additions
    pub fn full(tree: &[TreeEntry]) -> Self {
        let changes = tree
            .iter()
            .map(|entry| (entry.path.clone(), ChangeKind::Added))
            .collect();
        Self { changes }
    }

    /// Record a deletion, e.g. a documented path missing from the current tree
    pub fn mark_removed(&mut self, path: &str) {
        self.record(path, ChangeKind::Removed);
    }

    pub(crate) fn apply_commit_file(&mut self, file: &CommitFile) {
        match file.status {
            FileStatus::Added | FileStatus::Copied => self.record(&file.filename, ChangeKind::Added),
            FileStatus::Modified | FileStatus::Changed => {
                self.record(&file.filename, ChangeKind::Modified)
            }
            FileStatus::Removed => self.record(&file.filename, ChangeKind::Removed),
            FileStatus::Renamed => {
                if let Some(previous) = &file.previous_filename {
                    self.record(previous, ChangeKind::Removed);
                }
                self.record(&file.filename, ChangeKind::Added);
            }
            FileStatus::Unchanged => {}
        }
    }

    pub(crate) fn apply_payload_commit(&mut self, commit: &crate::webhook::PushCommit) {
        for path in &commit.removed {
            self.record(path, ChangeKind::Removed);
        }
        for path in &commit.added {
            self.record(path, ChangeKind::Added);
        }
        for path in &commit.modified {
            self.record(path, ChangeKind::Modified);
        }
    }

    /// Fold a new action into the existing state for `path`.
    fn record(&mut self, path: &str, kind: ChangeKind) {
        let merged = match (self.changes.get(path), kind) {
            // Added earlier in this push, later edits keep it an addition
            (Some(ChangeKind::Added), ChangeKind::Modified) => ChangeKind::Added,
            // Removed then re-added within one push: content may differ
            (Some(ChangeKind::Removed), ChangeKind::Added) => ChangeKind::Modified,
            (_, kind) => kind,
        };
        self.changes.insert(path.to_string(), merged);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Changes ordered by path
    pub fn iter(&self) -> impl Iterator<Item = FileChange> + '_ {
        self.changes.iter().map(|(path, kind)| FileChange {
            path: path.clone(),
            kind: *kind,
        })
    }

    pub fn get(&self, path: &str) -> Option<ChangeKind> {
        self.changes.get(path).copied()
    }
}

/// Decides which paths are documented
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    max_file_bytes: u64,
}

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl PathFilter {
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|p| {
                    Pattern::new(p).map_err(|e| {
                        Error::Config(format!("invalid generator pattern {:?}: {}", p, e))
                    })
                })
                .collect::<Result<Vec<_>>>()
        };

        Ok(Self {
            include: compile(&config.include)?,
            exclude: compile(&config.exclude)?,
            max_file_bytes: config.max_file_bytes,
        })
    }

    /// Whether the path is selected by the include/exclude patterns.
    ///
    /// A leading `**/` also matches files at the repository root.
    pub fn matches(&self, path: &str) -> bool {
        let matches_any = |patterns: &[Pattern]| {
            patterns.iter().any(|p| {
                p.matches_with(path, MATCH_OPTIONS)
                    || p
                        .as_str()
                        .strip_prefix("**/")
                        .and_then(|rest| Pattern::new(rest).ok())
                        .is_some_and(|root| root.matches_with(path, MATCH_OPTIONS))
            })
        };

        matches_any(&self.include) && !matches_any(&self.exclude)
    }

    /// Whether a file of this size may be documented
    pub fn within_size(&self, size: u64) -> bool {
        size <= self.max_file_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::PushCommit;

    fn commit(sha: &str, files: Vec<CommitFile>) -> (String, Vec<CommitFile>) {
        (sha.to_string(), files)
    }

    #[test]
    fn last_action_wins_across_commits() {
        let set = ChangeSet::from_commits(&[
            commit("c1", vec![CommitFile::new("a.rs", FileStatus::Modified)]),
            commit("c2", vec![CommitFile::new("a.rs", FileStatus::Removed)]),
        ]);
        assert_eq!(set.get("a.rs"), Some(ChangeKind::Removed));
    }

    #[test]
    fn added_then_modified_stays_added() {
        let set = ChangeSet::from_commits(&[
            commit("c1", vec![CommitFile::new("new.rs", FileStatus::Added)]),
            commit("c2", vec![CommitFile::new("new.rs", FileStatus::Modified)]),
        ]);
        assert_eq!(set.get("new.rs"), Some(ChangeKind::Added));
    }

    #[test]
    fn removed_then_added_is_modification() {
        let set = ChangeSet::from_commits(&[
            commit("c1", vec![CommitFile::new("x.rs", FileStatus::Removed)]),
            commit("c2", vec![CommitFile::new("x.rs", FileStatus::Added)]),
        ]);
        assert_eq!(set.get("x.rs"), Some(ChangeKind::Modified));
    }

    #[test]
    fn rename_removes_old_path() {
        let set = ChangeSet::from_commits(&[commit(
            "c1",
            vec![CommitFile::renamed("old.rs", "new.rs")],
        )]);
        assert_eq!(set.get("old.rs"), Some(ChangeKind::Removed));
        assert_eq!(set.get("new.rs"), Some(ChangeKind::Added));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn iteration_is_path_ordered() {
        let set = ChangeSet::from_commits(&[commit(
            "c1",
            vec![
                CommitFile::new("z.rs", FileStatus::Added),
                CommitFile::new("a.rs", FileStatus::Added),
                CommitFile::new("m/b.rs", FileStatus::Modified),
            ],
        )]);
        let paths: Vec<_> = set.iter().map(|c| c.path).collect();
        assert_eq!(paths, vec!["a.rs", "m/b.rs", "z.rs"]);
    }

    #[test]
    fn payload_lists_are_replayed() {
        let push = PushEvent {
            git_ref: "refs/heads/main".to_string(),
            before: "a".to_string(),
            after: "b".to_string(),
            repository: serde_json::from_value(serde_json::json!({
                "id": 1, "name": "r", "full_name": "o/r", "owner": {"login": "o"}
            }))
            .unwrap(),
            commits: vec![
                PushCommit {
                    id: "c1".to_string(),
                    message: String::new(),
                    added: vec!["lib.rs".to_string()],
                    removed: vec![],
                    modified: vec!["main.rs".to_string()],
                },
                PushCommit {
                    id: "c2".to_string(),
                    message: String::new(),
                    added: vec![],
                    removed: vec!["main.rs".to_string()],
                    modified: vec!["lib.rs".to_string()],
                },
            ],
            deleted: false,
        };
        let set = ChangeSet::from_push_payload(&push);
        assert_eq!(set.get("lib.rs"), Some(ChangeKind::Added));
        assert_eq!(set.get("main.rs"), Some(ChangeKind::Removed));
    }

    #[test]
    fn full_tree_is_all_additions() {
        let tree = vec![
            TreeEntry {
                path: "b.rs".to_string(),
                sha: "2".to_string(),
                size: 10,
            },
            TreeEntry {
                path: "a.rs".to_string(),
                sha: "1".to_string(),
                size: 10,
            },
        ];
        let set = ChangeSet::full(&tree);
        assert!(set.iter().all(|c| c.kind == ChangeKind::Added));
        assert_eq!(set.iter().next().unwrap().path, "a.rs");
    }

    #[test]
    fn path_filter_include_and_exclude() {
        let filter = PathFilter::new(&GeneratorConfig::default()).unwrap();
        assert!(filter.matches("main.rs"));
        assert!(filter.matches("src/deep/mod.rs"));
        assert!(filter.matches("web/app.tsx"));
        assert!(!filter.matches("README.md"));
        assert!(!filter.matches("node_modules/pkg/index.js"));
        assert!(!filter.matches("web/node_modules/pkg/index.js"));
        assert!(!filter.matches("static/app.min.js"));
        assert!(!filter.matches("Cargo.lock"));
    }

    #[test]
    fn path_filter_size_limit() {
        let config = GeneratorConfig {
            max_file_bytes: 100,
            ..Default::default()
        };
        let filter = PathFilter::new(&config).unwrap();
        assert!(filter.within_size(100));
        assert!(!filter.within_size(101));
    }
}
