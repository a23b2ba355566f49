//! Describing the project's working tree

use std::path::Path;

use git2::{Repository, StatusOptions};

use crate::error::Result;

/// The commit a project is at and whether it has local changes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitInfo {
    pub hash: String,
    pub clean: bool,
}

impl GitInfo {
    /// Describe the repository containing `path`, if any
    pub fn discover(path: &Path) -> Result<Option<Self>> {
        let repo = match Repository::discover(path) {
            Ok(repo) => repo,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let head = repo.head()?.peel_to_commit()?;

        let mut options = StatusOptions::new();
        options.include_untracked(false).include_ignored(false);
        let clean = repo.statuses(Some(&mut options))?.is_empty();

        Ok(Some(Self {
            hash: head.id().to_string(),
            clean,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_discover() {
        let temp = TempDir::new().unwrap();
        assert_eq!(GitInfo::discover(temp.path()).unwrap(), None);

        let repo = Repository::init(temp.path()).unwrap();
        std::fs::write(temp.path().join("omnetpp.ini"), "[General]\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("omnetpp.ini")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let signature = git2::Signature::now("Test", "test@example.com").unwrap();
        let head = repo.commit(Some("HEAD"), &signature, &signature, "init", &tree, &[]).unwrap();

        let info = GitInfo::discover(temp.path()).unwrap().unwrap();
        assert_eq!(info.hash, head.to_string());
        assert!(info.clean);

        std::fs::write(temp.path().join("omnetpp.ini"), "[General]\nsim-time-limit = 1s\n").unwrap();
        assert!(!GitInfo::discover(temp.path()).unwrap().unwrap().clean);
    }
}
