//! Streaming ingestion
//!
//! Pages through every configured query, transforms each page concurrently
//! and collects entities plus the raw relation edges they declare. A page is
//! fully transformed before the next one is requested, so at most one page of
//! raw records is held at a time.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use dirgraph_connector::record::DirectoryRecord;
use dirgraph_connector::traits::DirectoryClient;

use crate::config::{GroupQueryConfig, QueryOptions, UserQueryConfig};
use crate::entity::{Entity, EntityKind, EntityRef, GroupEntity, UserEntity};
use crate::error::{SyncError, SyncResult};
use crate::membership::RawMembershipIndex;
use crate::progress::ProgressReporter;
use crate::transform::{GroupTransformer, RecordTransformer, UserTransformer};
use crate::vendor::LdapVendor;

/// Counters collected while streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestStatistics {
    pub queries: usize,
    pub pages: usize,
    pub records: usize,
    /// Records the transformer dropped.
    pub skipped: usize,
    /// Records whose entity reference was already emitted.
    pub duplicates: usize,
}

/// Users read by [`Ingestor::read_users`].
#[derive(Debug, Default)]
pub struct UserBatch {
    pub users: Vec<UserEntity>,
    /// User DN to raw group identifiers.
    pub member_of: RawMembershipIndex,
}

/// Groups read by [`Ingestor::read_groups`].
#[derive(Debug, Default)]
pub struct GroupBatch {
    pub groups: Vec<GroupEntity>,
    /// Group DN to raw parent group identifiers.
    pub member_of: RawMembershipIndex,
    /// Group DN to raw member identifiers (users or groups).
    pub members: RawMembershipIndex,
}

trait QuerySource: Send + Sync + 'static {
    fn base_dn(&self) -> &str;
    fn query_options(&self) -> &QueryOptions;
    /// Attribute the entity name is mapped from.
    fn name_attribute(&self) -> &str;
}

impl QuerySource for UserQueryConfig {
    fn base_dn(&self) -> &str {
        &self.dn
    }

    fn query_options(&self) -> &QueryOptions {
        &self.options
    }

    fn name_attribute(&self) -> &str {
        self.map.name_attribute()
    }
}

impl QuerySource for GroupQueryConfig {
    fn base_dn(&self) -> &str {
        &self.dn
    }

    fn query_options(&self) -> &QueryOptions {
        &self.options
    }

    fn name_attribute(&self) -> &str {
        self.map.name_attribute()
    }
}

enum Accepted {
    Entity,
    Skipped,
    Duplicate,
}

/// Drives paged retrieval for one sync run.
pub struct Ingestor {
    vendor: LdapVendor,
    cancel: CancellationToken,
    progress: ProgressReporter,
    stats: IngestStatistics,
}

impl Ingestor {
    pub fn new(vendor: LdapVendor, cancel: CancellationToken, progress: ProgressReporter) -> Self {
        Self {
            vendor,
            cancel,
            progress,
            stats: IngestStatistics::default(),
        }
    }

    pub fn statistics(&self) -> IngestStatistics {
        self.stats
    }

    pub fn progress_mut(&mut self) -> &mut ProgressReporter {
        &mut self.progress
    }

    /// Read every user query.
    ///
    /// The same entity reference is kept only once across all queries.
    #[instrument(skip_all, fields(queries = queries.len(), vendor = %self.vendor))]
    pub async fn read_users<C: DirectoryClient>(
        &mut self,
        client: &C,
        queries: &[UserQueryConfig],
        transformer: &UserTransformer,
    ) -> SyncResult<UserBatch> {
        let vendor = self.vendor;
        let mut batch = UserBatch::default();
        let mut seen: HashSet<EntityRef> = HashSet::new();

        for query in queries {
            self.stream_query(
                client,
                Arc::new(query.clone()),
                transformer,
                EntityKind::User,
                |query: &UserQueryConfig, record, entity: Option<UserEntity>| {
                    let Some(entity) = entity else {
                        return Accepted::Skipped;
                    };
                    if !seen.insert(entity.entity_ref()) {
                        debug!(entity = %entity.entity_ref(), dn = %record.dn(), "Dropping duplicate user");
                        return Accepted::Duplicate;
                    }

                    let source = relation_source(&entity, &record);
                    batch.member_of.insert(
                        &source,
                        vendor.decode_string_attribute(&record, &query.map.member_of),
                    );
                    batch.users.push(entity);
                    Accepted::Entity
                },
            )
            .await?;
        }

        info!(
            users = batch.users.len(),
            edges = batch.member_of.edge_count(),
            "Finished reading users"
        );
        Ok(batch)
    }

    /// Read every group query.
    ///
    /// The same entity reference is kept only once across all queries.
    #[instrument(skip_all, fields(queries = queries.len(), vendor = %self.vendor))]
    pub async fn read_groups<C: DirectoryClient>(
        &mut self,
        client: &C,
        queries: &[GroupQueryConfig],
        transformer: &GroupTransformer,
    ) -> SyncResult<GroupBatch> {
        let vendor = self.vendor;
        let mut batch = GroupBatch::default();
        let mut seen: HashSet<EntityRef> = HashSet::new();

        for query in queries {
            self.stream_query(
                client,
                Arc::new(query.clone()),
                transformer,
                EntityKind::Group,
                |query: &GroupQueryConfig, record, entity: Option<GroupEntity>| {
                    let Some(entity) = entity else {
                        return Accepted::Skipped;
                    };
                    if !seen.insert(entity.entity_ref()) {
                        debug!(entity = %entity.entity_ref(), dn = %record.dn(), "Dropping duplicate group");
                        return Accepted::Duplicate;
                    }

                    let source = relation_source(&entity, &record);
                    batch.member_of.insert(
                        &source,
                        vendor.decode_string_attribute(&record, &query.map.member_of),
                    );
                    batch.members.insert(
                        &source,
                        vendor.decode_string_attribute(&record, &query.map.members),
                    );
                    batch.groups.push(entity);
                    Accepted::Entity
                },
            )
            .await?;
        }

        info!(
            groups = batch.groups.len(),
            parent_edges = batch.member_of.edge_count(),
            member_edges = batch.members.edge_count(),
            "Finished reading groups"
        );
        Ok(batch)
    }

    #[instrument(skip_all, fields(kind = %kind, base_dn = %query.base_dn()))]
    async fn stream_query<C, Q, E, F>(
        &mut self,
        client: &C,
        query: Arc<Q>,
        transformer: &Arc<dyn RecordTransformer<Q, E>>,
        kind: EntityKind,
        mut accept: F,
    ) -> SyncResult<()>
    where
        C: DirectoryClient,
        Q: QuerySource,
        E: Entity + Send + 'static,
        F: FnMut(&Q, DirectoryRecord, Option<E>) -> Accepted,
    {
        let base_dn = query.base_dn().to_string();
        let options = query.query_options().search_options();
        self.stats.queries += 1;

        let mut stream = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
            result = client.search_paginated(&base_dn, &options) => {
                result.map_err(|e| SyncError::retrieval(&base_dn, e))?
            }
        };

        loop {
            let page = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SyncError::Cancelled),
                page = stream.next_page() => page.map_err(|e| SyncError::retrieval(&base_dn, e))?,
            };
            let Some(page) = page else {
                break;
            };

            let received = page.len();
            debug!(records = received, "Received page");
            let results = transform_page(self.vendor, &query, transformer, page).await?;

            let (mut accepted, mut skipped, mut duplicates) = (0, 0, 0);
            for (record, entity) in results {
                if entity
                    .as_ref()
                    .is_some_and(|entity| entity.metadata().name.trim().is_empty())
                {
                    return Err(SyncError::MissingAttribute {
                        kind,
                        attribute: query.name_attribute().to_string(),
                        dn: record.dn().to_string(),
                    });
                }
                match accept(query.as_ref(), record, entity) {
                    Accepted::Entity => accepted += 1,
                    Accepted::Skipped => skipped += 1,
                    Accepted::Duplicate => duplicates += 1,
                }
            }

            self.stats.pages += 1;
            self.stats.records += received;
            self.stats.skipped += skipped;
            self.stats.duplicates += duplicates;
            self.progress.update(|progress| {
                progress.pages += 1;
                progress.records += received;
                progress.skipped += skipped;
                match kind {
                    EntityKind::User => progress.users += accepted,
                    EntityKind::Group => progress.groups += accepted,
                }
            });
        }

        Ok(())
    }
}

/// Transform one page concurrently, returning results in record order.
///
/// The first failure aborts the remaining tasks of the page.
async fn transform_page<Q, E>(
    vendor: LdapVendor,
    query: &Arc<Q>,
    transformer: &Arc<dyn RecordTransformer<Q, E>>,
    page: Vec<DirectoryRecord>,
) -> SyncResult<Vec<(DirectoryRecord, Option<E>)>>
where
    Q: Send + Sync + 'static,
    E: Send + 'static,
{
    let mut tasks = JoinSet::new();
    let len = page.len();

    for (position, record) in page.into_iter().enumerate() {
        let query = Arc::clone(query);
        let transformer = Arc::clone(transformer);
        tasks.spawn(async move {
            let result = transformer.transform(vendor, &query, &record).await;
            (position, record, result)
        });
    }

    let mut slots: Vec<Option<(DirectoryRecord, Option<E>)>> = (0..len).map(|_| None).collect();
    while let Some(joined) = tasks.join_next().await {
        let (position, record, result) = joined
            .map_err(|e| SyncError::internal(format!("transform task failed: {e}")))?;
        match result {
            Ok(entity) => slots[position] = Some((record, entity)),
            Err(err) => {
                tasks.abort_all();
                return Err(err);
            }
        }
    }

    Ok(slots.into_iter().flatten().collect())
}

/// Key under which an entity's raw relations are recorded.
fn relation_source<E: Entity>(entity: &E, record: &DirectoryRecord) -> String {
    entity
        .dn()
        .filter(|dn| !dn.is_empty())
        .unwrap_or_else(|| record.dn())
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::LDAP_DN_ANNOTATION;

    #[test]
    fn test_relation_source_prefers_annotation() {
        let record = DirectoryRecord::new("uid=a,dc=example,dc=com");
        let mut user = UserEntity::new("a");
        assert_eq!(relation_source(&user, &record), "uid=a,dc=example,dc=com");

        user.metadata.annotations.insert(
            LDAP_DN_ANNOTATION.to_string(),
            "uid=A,dc=example,dc=com".to_string(),
        );
        assert_eq!(relation_source(&user, &record), "uid=A,dc=example,dc=com");
    }

    #[tokio::test]
    async fn test_transform_page_keeps_record_order() {
        use crate::transform::DefaultUserTransformer;

        let transformer: UserTransformer = Arc::new(DefaultUserTransformer);
        let query = Arc::new(UserQueryConfig::new("dc=example,dc=com"));
        let page: Vec<DirectoryRecord> = (0..20)
            .map(|i| DirectoryRecord::new(format!("uid=u{i},dc=example,dc=com")).with("uid", format!("u{i}")))
            .collect();

        let results = transform_page(LdapVendor::Default, &query, &transformer, page)
            .await
            .unwrap();

        let names: Vec<String> = results
            .into_iter()
            .filter_map(|(_, user)| user.map(|u| u.metadata.name))
            .collect();
        let expected: Vec<String> = (0..20).map(|i| format!("u{i}")).collect();
        assert_eq!(names, expected);
    }
}
