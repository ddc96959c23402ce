//! LDAP organisation reader
//!
//! Runs a full sync: detect the vendor, stream users, stream groups, resolve
//! relations. Any failure fails the whole run and no partial graph is
//! returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use dirgraph_connector::traits::DirectoryClient;

use crate::config::{GroupQueryConfig, OrgSyncConfig, UserQueryConfig};
use crate::directory::LdapDirectory;
use crate::entity::{GroupEntity, UserEntity};
use crate::error::{SyncError, SyncResult};
use crate::ingest::{GroupBatch, IngestStatistics, Ingestor, UserBatch};
use crate::progress::{ProgressReporter, SyncPhase, SyncProgress, DEFAULT_PROGRESS_INTERVAL};
use crate::resolve::{resolve_relations, ResolutionStatistics};
use crate::transform::{
    DefaultGroupTransformer, DefaultUserTransformer, GroupTransformer, RecordTransformer,
    UserTransformer,
};
use crate::vendor::LdapVendor;

/// Users and groups with their relations resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedGraph {
    pub users: Vec<UserEntity>,
    pub groups: Vec<GroupEntity>,
}

/// Statistics for one sync run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatistics {
    /// Detected directory vendor.
    pub vendor: LdapVendor,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Queries processed, users and groups together.
    pub queries_processed: usize,
    pub records_processed: usize,
    pub users: usize,
    pub groups: usize,
    /// Records a transformer dropped.
    pub skipped: usize,
    /// Records dropped because their entity was already emitted.
    pub duplicates: usize,
    pub memberships_resolved: usize,
    pub parents_resolved: usize,
    /// Relation edges that matched no entity.
    pub dropped_edges: usize,
    pub parent_conflicts: usize,
}

impl SyncStatistics {
    fn new(
        vendor: LdapVendor,
        started_at: DateTime<Utc>,
        elapsed: Duration,
        graph: &ResolvedGraph,
        ingest: IngestStatistics,
        resolution: ResolutionStatistics,
    ) -> Self {
        Self {
            vendor,
            started_at,
            duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            queries_processed: ingest.queries,
            records_processed: ingest.records,
            users: graph.users.len(),
            groups: graph.groups.len(),
            skipped: ingest.skipped,
            duplicates: ingest.duplicates,
            memberships_resolved: resolution.memberships_resolved,
            parents_resolved: resolution.parents_resolved,
            dropped_edges: resolution.dropped_edges,
            parent_conflicts: resolution.parent_conflicts,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncOutput {
    pub graph: ResolvedGraph,
    pub statistics: SyncStatistics,
}

/// Reads users and groups from a directory into a [`ResolvedGraph`].
pub struct LdapOrgReader {
    config: OrgSyncConfig,
    user_transformer: UserTransformer,
    group_transformer: GroupTransformer,
    cancel: CancellationToken,
    progress: Arc<watch::Sender<SyncProgress>>,
    progress_interval: Duration,
}

impl LdapOrgReader {
    /// Create a reader with the default transformers.
    ///
    /// # Errors
    ///
    /// `Configuration` when a query is unusable. Nothing is retrieved.
    pub fn new(config: OrgSyncConfig) -> SyncResult<Self> {
        config.validate()?;
        let (progress, _) = watch::channel(SyncProgress::default());

        Ok(Self {
            config,
            user_transformer: Arc::new(DefaultUserTransformer),
            group_transformer: Arc::new(DefaultGroupTransformer),
            cancel: CancellationToken::new(),
            progress: Arc::new(progress),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        })
    }

    /// Replace the user transformer.
    pub fn with_user_transformer<T>(mut self, transformer: T) -> Self
    where
        T: RecordTransformer<UserQueryConfig, UserEntity> + 'static,
    {
        self.user_transformer = Arc::new(transformer);
        self
    }

    /// Replace the group transformer.
    pub fn with_group_transformer<T>(mut self, transformer: T) -> Self
    where
        T: RecordTransformer<GroupQueryConfig, GroupEntity> + 'static,
    {
        self.group_transformer = Arc::new(transformer);
        self
    }

    /// Cancel runs through `token`.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// How often progress is logged while streaming.
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Watch the progress of runs.
    pub fn progress(&self) -> watch::Receiver<SyncProgress> {
        self.progress.subscribe()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &OrgSyncConfig {
        &self.config
    }

    /// Run one sync against `directory`.
    #[instrument(skip_all, fields(client = %directory.client().display_name()))]
    pub async fn read<C: DirectoryClient>(
        &self,
        directory: &LdapDirectory<C>,
    ) -> SyncResult<SyncOutput> {
        let started_at = Utc::now();
        let timer = Instant::now();

        match self.run(directory, started_at, timer).await {
            Ok(output) => {
                info!(
                    vendor = %output.statistics.vendor,
                    users = output.statistics.users,
                    groups = output.statistics.groups,
                    skipped = output.statistics.skipped,
                    dropped_edges = output.statistics.dropped_edges,
                    duration_ms = output.statistics.duration_ms,
                    "Directory sync completed"
                );
                Ok(output)
            }
            Err(err) => {
                self.progress
                    .send_modify(|progress| progress.phase = SyncPhase::Failed);
                match &err {
                    SyncError::Cancelled => warn!("Directory sync cancelled"),
                    other => error!(error = %other, code = other.error_code(), "Directory sync failed"),
                }
                Err(err)
            }
        }
    }

    async fn run<C: DirectoryClient>(
        &self,
        directory: &LdapDirectory<C>,
        started_at: DateTime<Utc>,
        timer: Instant,
    ) -> SyncResult<SyncOutput> {
        let mut reporter = ProgressReporter::start(Arc::clone(&self.progress), self.progress_interval);

        reporter.set_phase(SyncPhase::DetectingVendor);
        let vendor = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            vendor = directory.vendor() => vendor.map_err(|source| SyncError::VendorDetection { source })?,
        };

        let mut ingestor = Ingestor::new(vendor, self.cancel.clone(), reporter);

        ingestor.progress_mut().set_phase(SyncPhase::ReadingUsers);
        let UserBatch {
            mut users,
            member_of: user_member_of,
        } = ingestor
            .read_users(directory.client(), &self.config.users, &self.user_transformer)
            .await?;

        ingestor.progress_mut().set_phase(SyncPhase::ReadingGroups);
        let GroupBatch {
            mut groups,
            member_of: group_member_of,
            members: group_members,
        } = ingestor
            .read_groups(directory.client(), &self.config.groups, &self.group_transformer)
            .await?;

        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        ingestor.progress_mut().set_phase(SyncPhase::Resolving);
        let resolution = resolve_relations(
            &mut groups,
            &mut users,
            &user_member_of,
            &group_member_of,
            &group_members,
        )?;
        ingestor.progress_mut().set_phase(SyncPhase::Completed);

        let graph = ResolvedGraph { users, groups };
        let statistics = SyncStatistics::new(
            vendor,
            started_at,
            timer.elapsed(),
            &graph,
            ingestor.statistics(),
            resolution,
        );

        Ok(SyncOutput { graph, statistics })
    }
}

impl std::fmt::Debug for LdapOrgReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapOrgReader")
            .field("config", &self.config)
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = OrgSyncConfig::new(vec![UserQueryConfig::new("  ")], vec![]);
        let err = LdapOrgReader::new(config).unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_progress_starts_pending() {
        let reader = LdapOrgReader::new(OrgSyncConfig::default()).unwrap();
        assert_eq!(reader.progress().borrow().phase, SyncPhase::Pending);
    }

    #[test]
    fn test_statistics_serialize() {
        let stats = SyncStatistics::new(
            LdapVendor::Lldap,
            Utc::now(),
            Duration::from_millis(42),
            &ResolvedGraph::default(),
            IngestStatistics::default(),
            ResolutionStatistics::default(),
        );
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["vendor"], "lldap");
        assert_eq!(json["duration_ms"], 42);
    }
}
