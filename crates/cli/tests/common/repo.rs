//! Throwaway Git repositories for CLI tests

use anyhow::Result;
use git2::{Oid, Repository, Signature, Time};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SECRET: &str = "SECRET_ABC123";

pub struct TestRepo {
    dir: TempDir,
    pub repo: Repository,
    clock: i64,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let repo = Repository::init(dir.path())?;
        repo.set_head("refs/heads/main")?;
        Ok(Self {
            dir,
            repo,
            clock: 1_700_000_000,
        })
    }

    /// Three commits on main; `.env` leaks a token on line 2 from the second
    pub fn leaky() -> Result<Self> {
        let mut repo = Self::new()?;
        repo.commit("refs/heads/main", &[("README.md", b"hello\n")], "initial")?;
        repo.commit(
            "refs/heads/main",
            &[
                ("README.md", b"hello\n"),
                (".env", format!("USER=app\nTOKEN={SECRET}\nDEBUG=0\n").as_bytes()),
            ],
            "add env",
        )?;
        repo.commit(
            "refs/heads/main",
            &[
                ("README.md", b"hello again\n"),
                (".env", format!("USER=app\nTOKEN={SECRET}\nDEBUG=0\n").as_bytes()),
            ],
            "touch readme",
        )?;
        Ok(repo)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn git_dir(&self) -> PathBuf {
        self.repo.path().to_path_buf()
    }

    /// Commit a full snapshot of top-level files onto `refname`
    pub fn commit(&mut self, refname: &str, files: &[(&str, &[u8])], message: &str) -> Result<Oid> {
        let mut builder = self.repo.treebuilder(None)?;
        for (name, content) in files {
            let blob = self.repo.blob(content)?;
            builder.insert(*name, blob, 0o100644)?;
        }
        let tree = self.repo.find_tree(builder.write()?)?;
        self.clock += 1;
        let sig = Signature::new("Dev", "dev@example.com", &Time::new(self.clock, 0))?;
        let parent = match self.repo.refname_to_id(refname) {
            Ok(oid) => Some(self.repo.find_commit(oid)?),
            Err(_) => None,
        };
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        Ok(self.repo.commit(Some(refname), &sig, &sig, message, &tree, &parents)?)
    }

    /// Write a neutral findings report outside the work tree's history
    pub fn write_findings(&self, name: &str) -> Result<PathBuf> {
        let path = self.path().join(name);
        let report = format!(
            r#"[{{"commit_hint": null, "file_path": ".env", "line_number": 2, "secret_literal": "{SECRET}", "rule": "generic-token"}}]"#
        );
        std::fs::write(&path, report)?;
        Ok(path)
    }

    pub fn file_at(&self, refname: &str, name: &str) -> Result<Option<Vec<u8>>> {
        let tree = self.repo.find_reference(refname)?.peel_to_commit()?.tree()?;
        let result = match tree.get_name(name) {
            Some(entry) => Ok(Some(self.repo.find_blob(entry.id())?.content().to_vec())),
            None => Ok(None),
        };
        result
    }

    pub fn head(&self, refname: &str) -> Result<Oid> {
        Ok(self.repo.refname_to_id(refname)?)
    }
}
