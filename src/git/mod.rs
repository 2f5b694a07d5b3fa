//! Git operations.
//!
//! Snapshots the journal directory after each daily run.

use crate::instance::DIR_LOCK_NAME;
use crate::{Error, Result};
use git2::{IndexAddOption, IndexMatchedPath, Oid, Repository, Signature};
use std::path::{Path, PathBuf};

/// Journal directory under version control.
#[derive(Debug, Clone)]
pub struct JournalRepo {
    path: PathBuf,
}

impl JournalRepo {
    /// Creates a handle for the repository rooted at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the repository path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stages every change and commits it.
    ///
    /// The repository is initialized if it does not exist. Returns `None` when
    /// the staged tree matches `HEAD`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository cannot be opened or initialized, or
    /// the index or commit cannot be written.
    pub fn commit_all(&self, message: &str) -> Result<Option<Oid>> {
        let repo = self.open_or_init()?;

        let mut index = repo.index().map_err(|e| git_error("open_index", &e))?;
        let skip_lock = &mut |path: &Path, _: &[u8]| i32::from(path == Path::new(DIR_LOCK_NAME));
        index
            .add_all(
                ["*"],
                IndexAddOption::DEFAULT,
                Some(skip_lock as &mut IndexMatchedPath<'_>),
            )
            .map_err(|e| git_error("stage_changes", &e))?;
        index
            .update_all(["*"], None)
            .map_err(|e| git_error("stage_removals", &e))?;
        index.write().map_err(|e| git_error("write_index", &e))?;
        let tree_id = index.write_tree().map_err(|e| git_error("write_tree", &e))?;

        let parent = match repo.head() {
            Ok(head) => Some(
                head.peel_to_commit()
                    .map_err(|e| git_error("peel_to_commit", &e))?,
            ),
            Err(e)
                if e.code() == git2::ErrorCode::UnbornBranch
                    || e.code() == git2::ErrorCode::NotFound =>
            {
                None
            },
            Err(e) => return Err(git_error("get_head", &e)),
        };

        if parent.as_ref().is_some_and(|p| p.tree_id() == tree_id) {
            tracing::debug!(path = %self.path.display(), "Nothing to commit");
            return Ok(None);
        }

        let tree = repo
            .find_tree(tree_id)
            .map_err(|e| git_error("find_tree", &e))?;
        let sig = repo.signature().or_else(|_| {
            Signature::now("daybook", "daybook@local").map_err(|e| git_error("create_signature", &e))
        })?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        let oid = repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .map_err(|e| git_error("create_commit", &e))?;

        tracing::info!(path = %self.path.display(), commit = %oid, "Committed journal changes");
        Ok(Some(oid))
    }

    fn open_or_init(&self) -> Result<Repository> {
        match Repository::open(&self.path) {
            Ok(repo) => Ok(repo),
            Err(e) if e.code() == git2::ErrorCode::NotFound => {
                tracing::info!(path = %self.path.display(), "Initializing git repository");
                Repository::init(&self.path).map_err(|e| git_error("init_repository", &e))
            },
            Err(e) => Err(git_error("open_repository", &e)),
        }
    }
}

fn git_error(operation: &str, err: &git2::Error) -> Error {
    Error::OperationFailed {
        operation: operation.to_string(),
        cause: err.to_string(),
    }
}
