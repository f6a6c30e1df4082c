//! History rewriter
//!
//! One pass over the walker's topological order. Per commit:
//! 1. resolve every blob through the policy chain (once per blob id)
//! 2. rebuild trees bottom-up from the new child ids
//! 3. rebuild the commit over the new tree and the already rewritten parents
//! 4. record progress and audit output
//!
//! Ref updates are staged and applied in one transaction after the last
//! commit; a failed or cancelled run never moves a ref.

use crate::config::{DropMode, RewriteConfig};
use crate::error::RewriteError;
use crate::findings::SecretSet;
use crate::mapping::{RewriteMapping, TreeImage};
use crate::policy::size::{
    is_placeholder_content, is_placeholder_name, placeholder_content, placeholder_name, PLACEHOLDER_MAX_LEN,
};
use crate::policy::{BlobDecision, LineRedactor, MessageRedactor, PolicyChain, RemovedLine, SizePruner};
use crate::reachability::ProtectedSet;
use crate::walker::{is_internal_ref, join_path, WalkPlan, Walker, INTERNAL_REF_PREFIX};
use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use scrub_core::tree::MODE_FILE;
use scrub_core::{looks_binary, Entry, EntryKind, ObjectId, ObjectKind, ObjectStore, RefStore, RefUpdate, Tree};
use scrub_journal::{
    AuditRecord, BlobOutcome, CommitRecord, ProgressTracker, ResumeState, RunStatistics, RunStatus,
};
use smallvec::SmallVec;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use ulid::Ulid;

/// Cooperative cancellation flag, checked between commits
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summary of a completed run
#[derive(Debug, Clone)]
pub struct RewriteReport {
    pub run_id: Ulid,
    /// True when an interrupted run was continued
    pub resumed: bool,
    pub stats: RunStatistics,
    /// Ref changes that were applied (including backup refs)
    pub ref_updates: Vec<RefUpdate>,
    /// Refs left alone because they do not lead to a commit
    pub untouched_refs: Vec<String>,
    /// Every walked commit, old → new, sorted by old id
    pub commit_map: Vec<(ObjectId, ObjectId)>,
}

impl RewriteReport {
    /// Image of an original commit
    pub fn rewritten(&self, old: &ObjectId) -> Option<ObjectId> {
        self.commit_map
            .binary_search_by(|(k, _)| k.cmp(old))
            .ok()
            .map(|i| self.commit_map[i].1)
    }
}

/// How a run ended
#[derive(Debug, Clone)]
pub enum RewriteOutcome {
    Completed(RewriteReport),
    /// Cancelled between commits; the journal can resume it
    Interrupted { stats: RunStatistics, processed: u64 },
}

/// Per-run working state
struct RunState {
    chain: PolicyChain,
    mapping: RewriteMapping,
}

/// Changed blobs first resolved while processing one commit
struct CommitScope {
    commit: ObjectId,
    blobs: Vec<(ObjectId, BlobOutcome)>,
}

/// A blob decision with the facts needed to audit it
struct BlobEval {
    outcome: BlobOutcome,
    size: u64,
    removed: Vec<RemovedLine>,
    binary: bool,
}

/// Rewrites the history held by `store`
pub struct HistoryRewriter<'a, S: ?Sized> {
    store: &'a S,
    config: &'a RewriteConfig,
    secrets: &'a SecretSet,
    tracker: &'a dyn ProgressTracker,
    messages: MessageRedactor,
    cancel: CancelToken,
}

impl<'a, S> HistoryRewriter<'a, S>
where
    S: ObjectStore + RefStore + ?Sized,
{
    /// Validate the configuration and prepare a rewriter
    ///
    /// Touches nothing in the store.
    pub fn new(
        store: &'a S,
        config: &'a RewriteConfig,
        secrets: &'a SecretSet,
        tracker: &'a dyn ProgressTracker,
    ) -> Result<Self, RewriteError> {
        config.validate()?;
        let extra: &[Vec<u8>] = if config.message.redact_finding_literals {
            secrets.literals()
        } else {
            &[]
        };
        let messages = MessageRedactor::new(&config.message, extra)?;

        Ok(Self {
            store,
            config,
            secrets,
            tracker,
            messages,
            cancel: CancelToken::new(),
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run (or resume) the rewrite
    pub fn run(&self) -> Result<RewriteOutcome, RewriteError> {
        let refs = self.store.list_refs()?;

        // The protected set only has to be ready before the first pruning
        // decision, so it is computed alongside the walk.
        let (plan, protected) = rayon::join(
            || Walker::new(self.store).walk(&refs),
            || self.protected_set(),
        );
        let plan = plan?;
        let protected = protected?;

        let fingerprint = self.config.fingerprint(self.secrets);
        let resume = self.tracker.begin(&fingerprint)?;
        if resume.resumed {
            tracing::warn!(
                run_id = %resume.run_id,
                done = resume.commits.len(),
                "resuming interrupted run"
            );
        }

        let result = self.rewrite(plan, protected, resume);

        if let Err(err) = &result {
            tracing::error!(error = %err, "rewrite failed, refs left untouched");
            if let Err(journal_err) = self.tracker.finish(RunStatus::Failed) {
                tracing::warn!(error = %journal_err, "could not mark run as failed");
            }
        }
        result
    }

    fn protected_set(&self) -> Result<ProtectedSet, RewriteError> {
        if self.config.strip_blobs_bigger_than.is_none() {
            return Ok(ProtectedSet::default());
        }
        let set = if self.config.protect_all_refs {
            ProtectedSet::for_all_refs(self.store)?
        } else {
            ProtectedSet::for_refs(self.store, &self.config.protected_refs)?
        };
        tracing::info!(blobs = set.len(), "protected set ready");
        Ok(set)
    }

    fn rewrite(
        &self,
        plan: WalkPlan,
        protected: ProtectedSet,
        resume: ResumeState,
    ) -> Result<RewriteOutcome, RewriteError> {
        let mut chain = PolicyChain::new();
        if let Some(threshold) = self.config.strip_blobs_bigger_than {
            chain.push(SizePruner::new(threshold, Arc::new(protected)));
        }
        if !self.secrets.is_empty() {
            chain.push(LineRedactor::new(self.secrets.literals()));
        }
        tracing::info!(
            policies = ?chain.names(),
            secrets = self.secrets.len(),
            commits = plan.commits.len(),
            "rewriting history"
        );

        let run = RunState {
            chain,
            mapping: RewriteMapping::new(),
        };
        for (old, new) in resume.commits {
            run.mapping.insert_commit(old, new)?;
        }
        for (blob, outcome) in resume.blobs {
            run.mapping.insert_blob(blob, outcome)?;
        }

        self.tracker.record_total(plan.commits.len() as u64)?;

        for id in &plan.commits {
            if run.mapping.commit(id).is_some() {
                continue;
            }
            if self.cancel.is_cancelled() {
                self.tracker.finish(RunStatus::Interrupted)?;
                let processed = self.tracker.processed();
                tracing::info!(processed, total = plan.commits.len(), "rewrite interrupted");
                return Ok(RewriteOutcome::Interrupted {
                    stats: self.tracker.stats(),
                    processed,
                });
            }
            self.rewrite_commit(&run, *id)?;
        }

        let (mut ref_updates, untouched_refs) = self.rewrite_refs(&run, &plan)?;
        if self.config.backup_refs {
            self.add_backup_refs(&mut ref_updates)?;
        }

        if !ref_updates.is_empty() {
            self.store.apply_ref_updates(&ref_updates)?;
        }
        self.tracker.finish(RunStatus::Completed)?;

        let stats = self.tracker.stats();
        tracing::info!(
            commits_rewritten = stats.commits_rewritten,
            blobs_modified = stats.blobs_modified,
            blobs_dropped = stats.blobs_dropped,
            messages_redacted = stats.messages_redacted,
            refs_updated = ref_updates.len(),
            "rewrite complete"
        );

        Ok(RewriteOutcome::Completed(RewriteReport {
            run_id: resume.run_id,
            resumed: resume.resumed,
            stats,
            ref_updates,
            untouched_refs,
            commit_map: run.mapping.commit_pairs(),
        }))
    }

    fn rewrite_commit(&self, run: &RunState, id: ObjectId) -> Result<ObjectId, RewriteError> {
        let commit = self
            .store
            .read_commit(&id)
            .map_err(RewriteError::on_read(id, "commit"))?;
        let mut scope = CommitScope {
            commit: id,
            blobs: Vec::new(),
        };

        let tree = match self.rewrite_tree(run, &mut scope, commit.tree, "")? {
            TreeImage::Tree(tree) => tree,
            TreeImage::Emptied => self
                .store
                .write_tree(&Tree::new())
                .map_err(RewriteError::on_write(id))?,
        };

        let parents = commit
            .parents
            .iter()
            .map(|parent| {
                run.mapping.commit(parent).ok_or_else(|| RewriteError::CorruptHistory {
                    id: *parent,
                    context: format!("parent of commit {id} was not rewritten first"),
                })
            })
            .collect::<Result<SmallVec<[ObjectId; 2]>, _>>()?;

        let (message, message_changed) = self.messages.redact(&commit.message);
        let message = message_changed.then(|| message.into_owned());

        let new_id = if tree == commit.tree && parents == commit.parents && message.is_none() {
            id
        } else {
            let mut rewritten = commit.clone();
            rewritten.tree = tree;
            rewritten.parents = parents;
            if let Some(message) = message {
                rewritten.message = message;
            }
            if rewritten.strip_signatures() {
                tracing::debug!(commit = %id, "dropped signature from rewritten commit");
            }
            self.store
                .write_commit(&rewritten)
                .map_err(RewriteError::on_write(id))?
        };

        if message_changed {
            self.tracker.counters().message_redacted();
            self.tracker.record_mutation(AuditRecord::message_redacted(id))?;
        }

        run.mapping.insert_commit(id, new_id)?;
        let processed = self.tracker.record_processed(&CommitRecord {
            old: id,
            new: new_id,
            blobs: scope.blobs,
        })?;
        tracing::debug!(
            commit = %id.short(),
            new = %new_id.short(),
            processed,
            "commit rewritten"
        );
        Ok(new_id)
    }

    fn rewrite_tree(
        &self,
        run: &RunState,
        scope: &mut CommitScope,
        id: ObjectId,
        path: &str,
    ) -> Result<TreeImage, RewriteError> {
        if let Some(image) = run.mapping.tree(&id) {
            return Ok(image);
        }
        let context = if path.is_empty() {
            format!("root tree of commit {}", scope.commit)
        } else {
            format!("tree {path} in commit {}", scope.commit)
        };
        let tree = self
            .store
            .read_tree(&id)
            .map_err(RewriteError::on_read(id, context))?;

        // Sibling blobs are independent: evaluate the unresolved ones in
        // parallel, then apply results in entry order.
        let markers = self.placeholder_markers(run, &tree)?;
        let mut seen = AHashSet::new();
        let pending: Vec<&Entry> = tree
            .entries()
            .iter()
            .filter(|e| {
                e.is_blob()
                    && !markers.contains(e.name.as_slice())
                    && run.mapping.blob(&e.id).is_none()
                    && seen.insert(e.id)
            })
            .collect();
        let mut evaluated: AHashMap<ObjectId, BlobEval> = pending
            .par_iter()
            .map(|entry| Ok((entry.id, self.evaluate_blob(run, entry)?)))
            .collect::<Result<Vec<_>, RewriteError>>()?
            .into_iter()
            .collect();

        let mut entries = Vec::with_capacity(tree.len());
        let mut changed = false;
        for entry in tree.entries() {
            match entry.kind() {
                EntryKind::Submodule => entries.push(entry.clone()),
                EntryKind::Tree => {
                    let sub_path = join_path(path, &entry.name);
                    match self.rewrite_tree(run, scope, entry.id, &sub_path)? {
                        TreeImage::Tree(new_id) => {
                            changed |= new_id != entry.id;
                            entries.push(Entry {
                                id: new_id,
                                ..entry.clone()
                            });
                        }
                        TreeImage::Emptied => changed = true,
                    }
                }
                EntryKind::File | EntryKind::Symlink if markers.contains(entry.name.as_slice()) => {
                    entries.push(entry.clone())
                }
                EntryKind::File | EntryKind::Symlink => {
                    let outcome = match evaluated.remove(&entry.id) {
                        Some(eval) => self.resolve_blob(run, scope, entry, path, eval)?,
                        None => run.mapping.blob(&entry.id).ok_or_else(|| RewriteError::CorruptHistory {
                            id: entry.id,
                            context: format!("blob in commit {} left unresolved", scope.commit),
                        })?,
                    };
                    match outcome {
                        BlobOutcome::Unchanged => entries.push(entry.clone()),
                        BlobOutcome::Modified(new_id) => {
                            changed = true;
                            entries.push(Entry {
                                id: new_id,
                                ..entry.clone()
                            });
                        }
                        BlobOutcome::Dropped { placeholder } => {
                            changed = true;
                            if let Some(marker) = placeholder {
                                let name = placeholder_name(&entry.name);
                                if tree.get(&name).is_some() {
                                    return Err(RewriteError::PlaceholderCollision {
                                        path: join_path(path, &name),
                                        commit: scope.commit,
                                    });
                                }
                                entries.push(Entry::new(MODE_FILE, &name, marker));
                            }
                        }
                    }
                }
            }
        }

        let image = if !changed {
            TreeImage::Tree(id)
        } else if entries.is_empty() && !tree.is_empty() {
            TreeImage::Emptied
        } else {
            let new_id = self
                .store
                .write_tree(&Tree::from_entries(entries))
                .map_err(RewriteError::on_write(id))?;
            TreeImage::Tree(new_id)
        };
        run.mapping.insert_tree(id, image)?;
        Ok(image)
    }

    /// Names of entries that are markers left by an earlier placeholder prune
    ///
    /// Markers are kept as they are: pruning or redacting one again would
    /// stack suffixes on every pass.
    fn placeholder_markers<'t>(&self, run: &RunState, tree: &'t Tree) -> Result<AHashSet<&'t [u8]>, RewriteError> {
        let mut markers = AHashSet::new();
        if run.chain.is_empty() {
            return Ok(markers);
        }
        for entry in tree
            .entries()
            .iter()
            .filter(|e| e.kind() == EntryKind::File && is_placeholder_name(&e.name))
        {
            let (kind, size) = self
                .store
                .header(&entry.id)
                .map_err(RewriteError::on_read(entry.id, "blob"))?;
            if kind != ObjectKind::Blob || size > PLACEHOLDER_MAX_LEN {
                continue;
            }
            let content = self
                .store
                .read_blob(&entry.id)
                .map_err(RewriteError::on_read(entry.id, "blob"))?;
            if is_placeholder_content(&content) {
                markers.insert(entry.name.as_slice());
            }
        }
        Ok(markers)
    }

    /// Run the policy chain over one blob and write any replacement object
    fn evaluate_blob(&self, run: &RunState, entry: &Entry) -> Result<BlobEval, RewriteError> {
        let id = entry.id;
        let unchanged = |size| BlobEval {
            outcome: BlobOutcome::Unchanged,
            size,
            removed: Vec::new(),
            binary: false,
        };
        if run.chain.is_empty() {
            return Ok(unchanged(0));
        }

        let (kind, size) = self
            .store
            .header(&id)
            .map_err(RewriteError::on_read(id, "blob"))?;
        if kind != ObjectKind::Blob {
            return Err(RewriteError::CorruptHistory {
                id,
                context: format!("tree entry expected a blob, found a {kind}"),
            });
        }

        let decision = run.chain.evaluate(id, size, || {
            self.store
                .read_blob(&id)
                .map_err(RewriteError::on_read(id, "blob"))
        })?;

        match decision {
            BlobDecision::Keep => Ok(unchanged(size)),
            BlobDecision::Drop => {
                let placeholder = match self.config.drop_mode {
                    DropMode::Omit => None,
                    DropMode::Placeholder => Some(
                        self.store
                            .write_blob(&placeholder_content(&id, size))
                            .map_err(RewriteError::on_write(id))?,
                    ),
                };
                Ok(BlobEval {
                    outcome: BlobOutcome::Dropped { placeholder },
                    size,
                    removed: Vec::new(),
                    binary: false,
                })
            }
            BlobDecision::Rewrite { content, removed } => {
                let new_id = self
                    .store
                    .write_blob(&content)
                    .map_err(RewriteError::on_write(id))?;
                Ok(BlobEval {
                    outcome: BlobOutcome::Modified(new_id),
                    size,
                    removed,
                    binary: looks_binary(&content),
                })
            }
        }
    }

    /// Record a freshly evaluated blob: mapping, counters and audit
    fn resolve_blob(
        &self,
        run: &RunState,
        scope: &mut CommitScope,
        entry: &Entry,
        dir: &str,
        eval: BlobEval,
    ) -> Result<BlobOutcome, RewriteError> {
        let id = entry.id;
        if !run.mapping.insert_blob(id, eval.outcome)? || !eval.outcome.is_change() {
            return Ok(eval.outcome);
        }

        let path = join_path(dir, &entry.name);
        let counters = self.tracker.counters();
        match eval.outcome {
            BlobOutcome::Modified(new_id) => {
                counters.blob_modified(eval.removed.len() as u64);
                if eval.binary {
                    tracing::warn!(path = %path, blob = %id.short(), "redacted lines in a binary-looking blob");
                }
                for removed in &eval.removed {
                    let finding = self.secrets.attribution(removed.secret, &path);
                    let record = AuditRecord::line_removed(scope.commit, &path, removed.line, id, new_id)
                        .with_finding(
                            finding.and_then(|f| f.commit_hint.clone()),
                            finding.and_then(|f| f.rule.clone()),
                        );
                    self.tracker.record_mutation(record)?;
                }
                tracing::debug!(path = %path, blob = %id.short(), lines = eval.removed.len(), "blob redacted");
            }
            BlobOutcome::Dropped { placeholder } => {
                counters.blob_dropped();
                self.tracker.record_mutation(AuditRecord::blob_dropped(
                    scope.commit,
                    &path,
                    id,
                    eval.size,
                    placeholder,
                ))?;
                tracing::debug!(path = %path, blob = %id.short(), size = eval.size, "blob pruned");
            }
            BlobOutcome::Unchanged => {}
        }
        scope.blobs.push((id, eval.outcome));
        Ok(eval.outcome)
    }

    /// Compute new targets for every walked ref
    fn rewrite_refs(
        &self,
        run: &RunState,
        plan: &WalkPlan,
    ) -> Result<(Vec<RefUpdate>, Vec<String>), RewriteError> {
        let mut updates = Vec::new();
        let mut untouched = Vec::new();
        let mut tags = AHashMap::new();

        for walked in &plan.refs {
            let Some(commit) = walked.commit else {
                tracing::warn!(refname = %walked.name, "ref does not lead to a commit, left untouched");
                untouched.push(walked.name.clone());
                continue;
            };
            let new_target = if walked.is_tag() {
                self.rewrite_tag(run, &mut tags, walked.target, &walked.name)?
            } else {
                run.mapping.commit(&commit).ok_or_else(|| RewriteError::CorruptHistory {
                    id: commit,
                    context: format!("tip of {} was not rewritten", walked.name),
                })?
            };
            if new_target != walked.target {
                updates.push(RefUpdate {
                    name: walked.name.clone(),
                    old: Some(walked.target),
                    new: new_target,
                });
            }
        }
        Ok((updates, untouched))
    }

    /// Re-create an annotated tag whose target or message changed
    fn rewrite_tag(
        &self,
        run: &RunState,
        cache: &mut AHashMap<ObjectId, ObjectId>,
        id: ObjectId,
        refname: &str,
    ) -> Result<ObjectId, RewriteError> {
        if let Some(new_id) = cache.get(&id) {
            return Ok(*new_id);
        }
        let tag = self
            .store
            .read_tag(&id)
            .map_err(RewriteError::on_read(id, format!("tag behind {refname}")))?;

        let target = match tag.target_kind {
            ObjectKind::Commit => run.mapping.commit(&tag.target).ok_or_else(|| RewriteError::CorruptHistory {
                id: tag.target,
                context: format!("commit tagged by {refname} was not rewritten"),
            })?,
            ObjectKind::Tag => self.rewrite_tag(run, cache, tag.target, refname)?,
            other => {
                return Err(RewriteError::CorruptHistory {
                    id: tag.target,
                    context: format!("tag {refname} expected to lead to a commit, found a {other}"),
                })
            }
        };

        let message_changed = self.messages.matches(&tag.message);
        let new_id = if target == tag.target && !message_changed {
            id
        } else {
            let mut rewritten = tag.clone();
            rewritten.target = target;
            rewritten.strip_signature();
            rewritten.message = self.messages.redact(&rewritten.message).0.into_owned();
            let new_id = self
                .store
                .write_tag(&rewritten)
                .map_err(RewriteError::on_write(id))?;

            let counters = self.tracker.counters();
            counters.tag_rewritten();
            self.tracker
                .record_mutation(AuditRecord::tag_rewritten(id, new_id, refname))?;
            if message_changed {
                counters.message_redacted();
                self.tracker.record_mutation(AuditRecord::message_redacted(id))?;
            }
            tracing::debug!(tag = refname, old = %id.short(), new = %new_id.short(), "tag rewritten");
            new_id
        };

        cache.insert(id, new_id);
        Ok(new_id)
    }

    /// Add `refs/scrub/original/<ref>` entries holding the old tips
    fn add_backup_refs(&self, updates: &mut Vec<RefUpdate>) -> Result<(), RewriteError> {
        let existing: AHashMap<String, ObjectId> = self
            .store
            .list_refs()?
            .into_iter()
            .filter(|(name, _)| is_internal_ref(name))
            .collect();

        let backups: Vec<RefUpdate> = updates
            .iter()
            .filter_map(|update| {
                let old_tip = update.old?;
                let name = format!("{INTERNAL_REF_PREFIX}original/{}", update.name);
                Some(RefUpdate {
                    old: existing.get(&name).copied(),
                    name,
                    new: old_tip,
                })
            })
            .collect();
        updates.extend(backups);
        Ok(())
    }
}
