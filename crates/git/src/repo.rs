//! On-disk Git repository as an object and ref store

use crate::error::{backend, read_error, write_error, GitError};
use git2::{ErrorCode, ObjectType, Oid, Repository};
use parking_lot::Mutex;
use scrub_core::{ObjectId, ObjectKind, ObjectStore, RawObject, RefStore, RefUpdate, StoreError};
use std::path::{Path, PathBuf};

const REFLOG_MESSAGE: &str = "scrub: rewrite history";

/// A Git repository opened through libgit2
///
/// libgit2 handles are not `Sync`, so every call takes the lock. Object
/// reads are short; the rewriter's parallel blob evaluation still overlaps
/// policy work with I/O.
pub struct GitStore {
    repo: Mutex<Repository>,
    git_dir: PathBuf,
    work_dir: Option<PathBuf>,
}

impl GitStore {
    /// Open the repository containing `path`
    pub fn open(path: &Path) -> Result<Self, GitError> {
        let repo = Repository::discover(path).map_err(|source| GitError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let git_dir = repo.path().to_path_buf();
        let work_dir = repo.workdir().map(Path::to_path_buf);
        tracing::debug!(git_dir = %git_dir.display(), "opened repository");

        Ok(Self {
            repo: Mutex::new(repo),
            git_dir,
            work_dir,
        })
    }

    /// The `.git` directory (the repository itself when bare)
    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    /// Work tree root; `None` for a bare repository
    pub fn work_dir(&self) -> Option<&Path> {
        self.work_dir.as_deref()
    }

    /// Current target of a direct ref
    fn current_target(repo: &Repository, name: &str) -> Result<Option<ObjectId>, StoreError> {
        match repo.find_reference(name) {
            Ok(reference) => Ok(reference.target().map(to_object_id)),
            Err(err) if err.code() == ErrorCode::NotFound => Ok(None),
            Err(err) => Err(backend(name)(err)),
        }
    }
}

impl ObjectStore for GitStore {
    fn read(&self, id: &ObjectId) -> Result<RawObject, StoreError> {
        let repo = self.repo.lock();
        let odb = repo.odb().map_err(backend("opening object database"))?;
        let object = odb.read(to_oid(id)?).map_err(read_error(*id))?;
        Ok(RawObject {
            kind: to_kind(*id, object.kind())?,
            data: object.data().to_vec().into(),
        })
    }

    fn contains(&self, id: &ObjectId) -> Result<bool, StoreError> {
        let repo = self.repo.lock();
        let odb = repo.odb().map_err(backend("opening object database"))?;
        Ok(odb.exists(to_oid(id)?))
    }

    fn write(&self, kind: ObjectKind, data: &[u8]) -> Result<ObjectId, StoreError> {
        let repo = self.repo.lock();
        let odb = repo.odb().map_err(write_error(kind))?;
        let oid = odb.write(to_object_type(kind), data).map_err(write_error(kind))?;
        Ok(to_object_id(oid))
    }

    fn header(&self, id: &ObjectId) -> Result<(ObjectKind, u64), StoreError> {
        let repo = self.repo.lock();
        let odb = repo.odb().map_err(backend("opening object database"))?;
        let (size, kind) = odb.read_header(to_oid(id)?).map_err(read_error(*id))?;
        Ok((to_kind(*id, kind)?, size as u64))
    }
}

impl RefStore for GitStore {
    fn list_refs(&self) -> Result<Vec<(String, ObjectId)>, StoreError> {
        let repo = self.repo.lock();
        let mut refs = Vec::new();
        for reference in repo.references().map_err(backend("listing refs"))? {
            let reference = reference.map_err(backend("listing refs"))?;
            // Symbolic refs have no direct target
            if let (Some(name), Some(target)) = (reference.name(), reference.target()) {
                refs.push((name.to_string(), to_object_id(target)));
            }
        }
        refs.sort();
        Ok(refs)
    }

    fn resolve(&self, name: &str) -> Result<Option<ObjectId>, StoreError> {
        let repo = self.repo.lock();
        let resolved = match repo.revparse_single(name) {
            Ok(object) => Ok(Some(to_object_id(object.id()))),
            Err(err) if matches!(err.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec | ErrorCode::UnbornBranch) => {
                Ok(None)
            }
            Err(err) => Err(backend(name)(err)),
        };
        resolved
    }

    fn apply_ref_updates(&self, updates: &[RefUpdate]) -> Result<(), StoreError> {
        let repo = self.repo.lock();
        let mut tx = repo.transaction().map_err(backend("starting ref transaction"))?;

        // Lock everything first so the old-value checks and the writes see
        // the same state.
        for update in updates {
            tx.lock_ref(&update.name).map_err(|err| {
                StoreError::RefUpdate(format!("cannot lock {}: {}", update.name, err.message()))
            })?;
        }
        for update in updates {
            let current = Self::current_target(&repo, &update.name)?;
            if current != update.old {
                return Err(StoreError::RefUpdate(format!(
                    "{} moved: expected {:?}, found {:?}",
                    update.name, update.old, current
                )));
            }
            tx.set_target(&update.name, to_oid(&update.new)?, None, REFLOG_MESSAGE)
                .map_err(|err| StoreError::RefUpdate(format!("{}: {}", update.name, err.message())))?;
        }
        tx.commit()
            .map_err(|err| StoreError::RefUpdate(format!("committing ref transaction: {}", err.message())))?;

        tracing::info!(refs = updates.len(), "ref transaction committed");
        Ok(())
    }
}

fn to_oid(id: &ObjectId) -> Result<Oid, StoreError> {
    Oid::from_bytes(id.as_bytes()).map_err(backend("converting object id"))
}

fn to_object_id(oid: Oid) -> ObjectId {
    let mut raw = [0u8; ObjectId::LEN];
    raw.copy_from_slice(oid.as_bytes());
    ObjectId::from_bytes(raw)
}

fn to_object_type(kind: ObjectKind) -> ObjectType {
    match kind {
        ObjectKind::Blob => ObjectType::Blob,
        ObjectKind::Tree => ObjectType::Tree,
        ObjectKind::Commit => ObjectType::Commit,
        ObjectKind::Tag => ObjectType::Tag,
    }
}

fn to_kind(id: ObjectId, kind: ObjectType) -> Result<ObjectKind, StoreError> {
    match kind {
        ObjectType::Blob => Ok(ObjectKind::Blob),
        ObjectType::Tree => Ok(ObjectKind::Tree),
        ObjectType::Commit => Ok(ObjectKind::Commit),
        ObjectType::Tag => Ok(ObjectKind::Tag),
        ObjectType::Any => Err(StoreError::Backend(format!("object {id} has no concrete type"))),
    }
}
