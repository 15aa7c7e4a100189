//! Membership changes and the key migrations they trigger.
//!
//! Adding or removing a node follows the same shape:
//!
//! 1. Validate and (for joins) dial the node. Nothing is changed yet.
//! 2. Commit the new topology and snapshot the key index in one exclusive
//!    section. Routing uses the new ring from here on.
//! 3. Diff the old and new rings over the snapshot and move every key whose
//!    owner changed: read from the old owner, write to the new owner, then
//!    delete from the old owner.
//!
//! Step 3 is best effort per key. A key whose copy fails stays where it
//! was and is reported in [`MigrationReport::failed`]; a key whose copy
//! succeeded but whose old copy could not be deleted is counted as migrated
//! and reported in [`MigrationReport::orphaned`].

use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use vidshard_net::{MigrationSummary, NetError, NodeConnector, StorageClient};
use vidshard_placement::{Reassignment, Ring};
use vidshard_types::{ContentKey, NodeAddr};

use crate::error::RouterError;
use crate::state::{Commit, RouterState};

/// Default number of keys migrated in parallel.
pub const DEFAULT_MIGRATION_CONCURRENCY: usize = 8;

/// Outcome of one join or leave.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// The node that joined or left.
    pub node: Option<NodeAddr>,
    /// Keys copied to their new owner.
    pub migrated: usize,
    /// Keys whose owner changed.
    pub planned: usize,
    /// Keys rewritten or deleted by clients after the commit; only the
    /// stale copy on the old owner was removed.
    pub superseded: usize,
    /// Keys that could not be copied and remain on their old owner.
    pub failed: Vec<(ContentKey, NetError)>,
    /// Keys copied to their new owner whose old copy could not be deleted.
    pub orphaned: Vec<(ContentKey, NodeAddr)>,
}

impl MigrationReport {
    fn for_node(node: &NodeAddr) -> Self {
        Self {
            node: Some(node.clone()),
            ..Default::default()
        }
    }

    /// The wire form of this report.
    pub fn summary(&self) -> MigrationSummary {
        MigrationSummary {
            migrated_file_count: clamp_i32(self.migrated),
            failed_file_count: clamp_i32(self.failed.len()),
            orphaned_file_count: clamp_i32(self.orphaned.len()),
        }
    }
}

fn clamp_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// What happened to one key.
enum KeyOutcome {
    Migrated,
    Orphaned(NodeAddr),
    Superseded,
    Failed(NetError),
}

/// One key to move, with the clients for both ends.
struct Move {
    reassignment: Reassignment,
    source: Arc<dyn StorageClient>,
    target: Arc<dyn StorageClient>,
}

/// Adds and removes storage nodes.
///
/// Membership operations are serialized: a second join or leave waits until
/// the first one has finished migrating, so every operation diffs against
/// the ring the data actually lives on. Content operations are never
/// blocked by this.
pub struct MembershipManager {
    state: Arc<RouterState>,
    connector: Arc<dyn NodeConnector>,
    concurrency: usize,
    op_lock: Mutex<()>,
}

impl std::fmt::Debug for MembershipManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipManager")
            .field("concurrency", &self.concurrency)
            .finish_non_exhaustive()
    }
}

impl MembershipManager {
    /// Create a manager over shared state, dialing nodes with `connector`.
    pub fn new(state: Arc<RouterState>, connector: Arc<dyn NodeConnector>) -> Self {
        Self {
            state,
            connector,
            concurrency: DEFAULT_MIGRATION_CONCURRENCY,
            op_lock: Mutex::new(()),
        }
    }

    /// Set how many keys are migrated in parallel (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// The shared state.
    pub fn state(&self) -> &Arc<RouterState> {
        &self.state
    }

    /// Register the startup node set.
    ///
    /// Every node is dialed; the first unreachable, duplicate or colliding
    /// address aborts with an error. No keys are migrated: a fresh router has
    /// written nothing yet.
    pub async fn bootstrap(&self, nodes: &[NodeAddr]) -> Result<(), RouterError> {
        let _guard = self.op_lock.lock().await;
        for addr in nodes {
            self.state.topology().check_joinable(addr)?;
            let client = self.connector.connect(addr).await?;
            self.state
                .commit(|current, _| current.with_node(addr, client))?;
            info!(node = %addr, "registered startup node");
        }
        Ok(())
    }

    /// Add `addr` and move onto it every key it now owns.
    ///
    /// Fails with no state change if the node is already registered, its
    /// ring point is taken, or it cannot be dialed.
    #[tracing::instrument(skip_all, fields(node = %addr))]
    pub async fn add_node(&self, addr: &NodeAddr) -> Result<MigrationReport, RouterError> {
        let _guard = self.op_lock.lock().await;

        self.state.topology().check_joinable(addr)?;
        let client = self.connector.connect(addr).await?;

        let commit = self
            .state
            .commit(|current, _| current.with_node(addr, client))?;
        info!(version = commit.new.version(), "node joined, migrating keys");

        let moves = plan(&commit, |r| &r.to == addr);
        let report = self.migrate(addr, commit.new.version(), moves).await;
        log_report("join", &report);
        Ok(report)
    }

    /// Remove `addr` and move every key it owned to its new owner.
    ///
    /// Fails with [`RouterError::UnknownNode`] if the node is not registered,
    /// and with [`RouterError::LastNode`] if it is the only node while keys
    /// are stored. Neither changes any state.
    #[tracing::instrument(skip_all, fields(node = %addr))]
    pub async fn remove_node(&self, addr: &NodeAddr) -> Result<MigrationReport, RouterError> {
        let _guard = self.op_lock.lock().await;

        let commit = self.state.commit(|current, key_count| {
            let next = current.without_node(addr)?;
            if next.ring().is_empty() && key_count > 0 {
                return Err(RouterError::LastNode(addr.clone()));
            }
            Ok(next)
        })?;
        info!(version = commit.new.version(), "node left, migrating keys");

        let moves = plan(&commit, |r| &r.from == addr);
        let report = self.migrate(addr, commit.new.version(), moves).await;
        log_report("leave", &report);
        Ok(report)
    }

    /// Run `moves` with bounded parallelism and tally the outcomes.
    async fn migrate(&self, node: &NodeAddr, version: u64, moves: Vec<Move>) -> MigrationReport {
        let mut report = MigrationReport::for_node(node);
        report.planned = moves.len();
        if moves.is_empty() {
            return report;
        }

        let permits = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        for mv in moves {
            let permits = permits.clone();
            let state = self.state.clone();
            tasks.spawn(async move {
                // The semaphore is never closed.
                let _permit = permits.acquire_owned().await.ok();
                let outcome = move_key(&state, version, &mv).await;
                (mv.reassignment.key, outcome)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (key, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    warn!(error = %e, "migration task panicked");
                    continue;
                }
            };
            match outcome {
                KeyOutcome::Migrated => report.migrated += 1,
                KeyOutcome::Orphaned(at) => {
                    report.migrated += 1;
                    report.orphaned.push((key, at));
                }
                KeyOutcome::Superseded => report.superseded += 1,
                KeyOutcome::Failed(e) => report.failed.push((key, e)),
            }
        }
        report
    }
}

/// Pair each reassigned key with the clients it moves between.
fn plan(commit: &Commit, keep: impl Fn(&Reassignment) -> bool) -> Vec<Move> {
    Ring::reassignments(commit.old.ring(), commit.new.ring(), &commit.keys)
        .into_iter()
        .filter(|r| keep(r))
        .filter_map(|r| {
            let source = commit.old.client(&r.from)?;
            let target = commit.new.client(&r.to)?;
            Some(Move {
                reassignment: r,
                source,
                target,
            })
        })
        .collect()
}

/// Whether a client touched `key` after topology `version` was committed.
///
/// Writes routed under `version` already went to the new owner; a missing
/// entry means the key was deleted.
fn superseded(state: &RouterState, key: &ContentKey, version: u64) -> bool {
    state.key_version(key).is_none_or(|written| written >= version)
}

/// Copy one key to its new owner, then delete the old copy.
async fn move_key(state: &RouterState, version: u64, mv: &Move) -> KeyOutcome {
    let Reassignment { key, from, to } = &mv.reassignment;

    if superseded(state, key, version) {
        return drop_stale(mv).await;
    }

    let data = match mv.source.read_file(key).await {
        Ok(data) => data,
        // A re-routed client write removes its copy from the old owner.
        Err(e) if e.is_not_found() && superseded(state, key, version) => {
            return KeyOutcome::Superseded;
        }
        Err(e) => {
            warn!(%key, %from, error = %e, "migration read failed");
            return KeyOutcome::Failed(e);
        }
    };

    // A client may have written a fresher copy while we were reading.
    if superseded(state, key, version) {
        return drop_stale(mv).await;
    }

    if let Err(e) = mv.target.write_file(key, data).await {
        warn!(%key, %to, error = %e, "migration write failed, key stays on old owner");
        return KeyOutcome::Failed(e);
    }

    match mv.source.delete_file(key).await {
        Ok(()) => {
            debug!(%key, %from, %to, "migrated key");
            KeyOutcome::Migrated
        }
        Err(e) if e.is_not_found() => KeyOutcome::Migrated,
        Err(e) => {
            warn!(%key, node = %from, error = %e, "failed to delete migrated key, orphan left behind");
            KeyOutcome::Orphaned(from.clone())
        }
    }
}

/// Remove the old owner's copy of a key that no longer needs copying.
async fn drop_stale(mv: &Move) -> KeyOutcome {
    let Reassignment { key, from, .. } = &mv.reassignment;
    match mv.source.delete_file(key).await {
        Ok(()) => debug!(%key, %from, "removed stale copy of superseded key"),
        Err(e) if e.is_not_found() => {}
        Err(e) => warn!(%key, node = %from, error = %e, "failed to remove stale copy"),
    }
    KeyOutcome::Superseded
}

fn log_report(event: &str, report: &MigrationReport) {
    if report.failed.is_empty() && report.orphaned.is_empty() {
        info!(
            event,
            planned = report.planned,
            migrated = report.migrated,
            superseded = report.superseded,
            "migration complete"
        );
    } else {
        warn!(
            event,
            planned = report.planned,
            migrated = report.migrated,
            superseded = report.superseded,
            failed = report.failed.len(),
            orphaned = report.orphaned.len(),
            "migration finished with errors"
        );
    }
}
