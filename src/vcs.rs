//! Git facade used for commits and reverts.
//!
//! Commits are staged from an explicit path list (manifest, lockfile,
//! edited sources); reverts restore exactly the paths the edit engine
//! touched, the `git checkout -- <paths>` way.

use anyhow::{Context, Result};
use git2::{Repository, Signature};
use std::path::{Path, PathBuf};

const COMMIT_NAME: &str = "devpost-upgrade";
const COMMIT_EMAIL: &str = "devpost-upgrade@localhost";

pub struct Vcs {
    repo: Repository,
    workdir: PathBuf,
}

impl Vcs {
    pub fn open(project_dir: &Path) -> Result<Self> {
        let repo = Repository::open(project_dir).context("Failed to open git repository")?;
        let workdir = repo
            .workdir()
            .context("Repository has no working directory")?
            .to_path_buf();
        Ok(Self { repo, workdir })
    }

    /// Whether the directory is the root of a git working tree.
    pub fn is_repository(project_dir: &Path) -> bool {
        Repository::open(project_dir).is_ok()
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.workdir).unwrap_or(path)
    }

    /// Get the HEAD commit if it exists (None on unborn branches).
    fn head_commit(&self) -> Option<git2::Commit<'_>> {
        self.repo
            .head()
            .ok()
            .and_then(|head| head.peel_to_commit().ok())
    }

    pub fn head_sha(&self) -> Option<String> {
        self.head_commit().map(|c| c.id().to_string())
    }

    /// Stage a single path without committing.
    pub fn stage(&self, path: &Path) -> Result<()> {
        let mut index = self.repo.index()?;
        index
            .add_path(self.relative(path))
            .with_context(|| format!("Failed to stage {}", path.display()))?;
        index.write()?;
        Ok(())
    }

    /// Stage the given paths and commit them. Paths that do not exist on
    /// disk are skipped so an absent lockfile never blocks a commit.
    pub fn commit_paths(&self, paths: &[PathBuf], message: &str) -> Result<String> {
        let mut index = self.repo.index()?;
        for path in paths {
            let rel = self.relative(path);
            if self.workdir.join(rel).exists() {
                index
                    .add_path(rel)
                    .with_context(|| format!("Failed to stage {}", rel.display()))?;
            }
        }
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let sig = Signature::now(COMMIT_NAME, COMMIT_EMAIL)?;

        // Handle unborn branch (new repo with no commits yet)
        let commit_id = if let Some(parent) = self.head_commit() {
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])?
        } else {
            self.repo
                .commit(Some("HEAD"), &sig, &sig, message, &tree, &[])?
        };

        Ok(commit_id.to_string())
    }

    /// Restore the given paths to their HEAD state, discarding working-tree
    /// and index changes. Equivalent of `git checkout -- <paths>`.
    pub fn checkout_paths(&self, paths: &[PathBuf]) -> Result<()> {
        if paths.is_empty() {
            return Ok(());
        }

        // Unstage first so a force checkout pulls from HEAD, not the index
        if let Some(head) = self.head_commit() {
            let obj = head.as_object();
            let rels: Vec<&Path> = paths.iter().map(|p| self.relative(p)).collect();
            self.repo
                .reset_default(Some(obj), rels)
                .context("Failed to unstage paths for revert")?;
        }

        let mut builder = git2::build::CheckoutBuilder::new();
        builder.force();
        for path in paths {
            builder.path(self.relative(path));
        }
        self.repo
            .checkout_head(Some(&mut builder))
            .context("Failed to check out paths from HEAD")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn setup_repo() -> (Vcs, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "test").unwrap();
        config.set_str("user.email", "test@test.com").unwrap();
        drop(config);
        let vcs = Vcs::open(dir.path()).unwrap();
        (vcs, dir)
    }

    #[test]
    fn is_repository_detects_git_dirs() {
        let dir = tempdir().unwrap();
        assert!(!Vcs::is_repository(dir.path()));
        Repository::init(dir.path()).unwrap();
        assert!(Vcs::is_repository(dir.path()));
    }

    #[test]
    fn commit_paths_on_unborn_branch_creates_initial_commit() {
        let (vcs, dir) = setup_repo();
        assert!(vcs.head_sha().is_none());
        fs::write(dir.path().join("package.json"), "{}\n").unwrap();
        let sha = vcs
            .commit_paths(
                &[dir.path().join("package.json")],
                "chore(deps): upgrade chalk from 4.0.0 to 5.3.0",
            )
            .unwrap();
        assert_eq!(sha.len(), 40);
        assert_eq!(vcs.head_sha(), Some(sha));
    }

    #[test]
    fn commit_paths_skips_missing_files() {
        let (vcs, dir) = setup_repo();
        fs::write(dir.path().join("a.txt"), "a\n").unwrap();
        let sha = vcs
            .commit_paths(
                &[dir.path().join("a.txt"), dir.path().join("no-lockfile.json")],
                "commit with absent path",
            )
            .unwrap();
        assert_eq!(sha.len(), 40);
    }

    #[test]
    fn commit_paths_stages_only_listed_files() {
        let (vcs, dir) = setup_repo();
        fs::write(dir.path().join("tracked.txt"), "one\n").unwrap();
        fs::write(dir.path().join("untouched.txt"), "zero\n").unwrap();
        vcs.commit_paths(
            &[
                dir.path().join("tracked.txt"),
                dir.path().join("untouched.txt"),
            ],
            "init",
        )
        .unwrap();

        fs::write(dir.path().join("tracked.txt"), "two\n").unwrap();
        fs::write(dir.path().join("untouched.txt"), "dirty\n").unwrap();
        vcs.commit_paths(&[dir.path().join("tracked.txt")], "only tracked")
            .unwrap();

        // untouched.txt's working-tree change is still there, uncommitted
        let repo = Repository::open(dir.path()).unwrap();
        let head = repo.head().unwrap().peel_to_commit().unwrap();
        let tree = head.tree().unwrap();
        let blob = tree
            .get_path(Path::new("tracked.txt"))
            .unwrap()
            .to_object(&repo)
            .unwrap();
        let blob = blob.as_blob().unwrap();
        assert_eq!(blob.content(), b"two\n");
    }

    #[test]
    fn checkout_paths_restores_head_content() {
        let (vcs, dir) = setup_repo();
        let file = dir.path().join("src.js");
        fs::write(&file, "const original = 1;\n").unwrap();
        vcs.commit_paths(&[file.clone()], "init").unwrap();

        fs::write(&file, "const broken = 2;\n").unwrap();
        vcs.checkout_paths(&[file.clone()]).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "const original = 1;\n");
    }

    #[test]
    fn checkout_paths_leaves_other_files_alone() {
        let (vcs, dir) = setup_repo();
        let reverted = dir.path().join("reverted.js");
        let kept = dir.path().join("kept.js");
        fs::write(&reverted, "a\n").unwrap();
        fs::write(&kept, "b\n").unwrap();
        vcs.commit_paths(&[reverted.clone(), kept.clone()], "init")
            .unwrap();

        fs::write(&reverted, "a-dirty\n").unwrap();
        fs::write(&kept, "b-dirty\n").unwrap();
        vcs.checkout_paths(&[reverted.clone()]).unwrap();

        assert_eq!(fs::read_to_string(&reverted).unwrap(), "a\n");
        assert_eq!(fs::read_to_string(&kept).unwrap(), "b-dirty\n");
    }

    #[test]
    fn checkout_paths_restores_staged_files_too() {
        let (vcs, dir) = setup_repo();
        let file = dir.path().join("staged.js");
        fs::write(&file, "clean\n").unwrap();
        vcs.commit_paths(&[file.clone()], "init").unwrap();

        fs::write(&file, "staged-change\n").unwrap();
        vcs.stage(&file).unwrap();
        vcs.checkout_paths(&[file.clone()]).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "clean\n");
    }

    #[test]
    fn checkout_paths_empty_list_is_a_no_op() {
        let (vcs, _dir) = setup_repo();
        vcs.checkout_paths(&[]).unwrap();
    }
}
