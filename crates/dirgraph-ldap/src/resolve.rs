//! Relation resolution
//!
//! Turns the raw membership indices collected during ingestion into entity
//! references on the users and groups themselves. Identifiers are matched by
//! DN first (ASCII case-insensitive) and by unique id second (exact). Edges
//! that match nothing are dropped.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::entity::{Entity, GroupEntity, UserEntity};
use crate::error::{SyncError, SyncResult};
use crate::membership::RawMembershipIndex;

/// Counters from one resolution pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionStatistics {
    /// User to group links added.
    pub memberships_resolved: usize,
    /// Groups whose parent was set from an edge.
    pub parents_resolved: usize,
    /// Edges whose source or target matched no entity, plus self-edges.
    pub dropped_edges: usize,
    /// Groups that saw more than one distinct parent candidate.
    pub parent_conflicts: usize,
}

/// Lookup from raw identifiers to entity positions for one kind.
struct IdentityIndex {
    by_dn: HashMap<String, usize>,
    by_uuid: HashMap<String, usize>,
}

impl IdentityIndex {
    fn build<E: Entity>(entities: &[E]) -> SyncResult<Self> {
        let mut by_dn: HashMap<String, usize> = HashMap::new();
        let mut by_uuid: HashMap<String, usize> = HashMap::new();

        for (position, entity) in entities.iter().enumerate() {
            if let Some(dn) = entity.dn() {
                claim(&mut by_dn, dn.to_lowercase(), position, entities, "DN")?;
            }
            if let Some(uuid) = entity.uuid() {
                claim(&mut by_uuid, uuid.to_string(), position, entities, "unique id")?;
            }
        }

        Ok(Self { by_dn, by_uuid })
    }

    fn lookup(&self, identifier: &str) -> Option<usize> {
        self.by_dn
            .get(&identifier.to_lowercase())
            .or_else(|| self.by_uuid.get(identifier))
            .copied()
    }
}

fn claim<E: Entity>(
    index: &mut HashMap<String, usize>,
    key: String,
    position: usize,
    entities: &[E],
    what: &str,
) -> SyncResult<()> {
    if key.is_empty() {
        return Ok(());
    }

    match index.get(&key) {
        Some(existing) => {
            let first = entities[*existing].entity_ref();
            let second = entities[position].entity_ref();
            if first != second {
                return Err(SyncError::resolution(format!(
                    "{what} '{key}' is claimed by both {first} and {second}"
                )));
            }
        }
        None => {
            index.insert(key, position);
        }
    }
    Ok(())
}

/// Parent candidates per group, tracking conflicts.
struct ParentCandidates {
    parents: Vec<Option<usize>>,
    conflicts: Vec<bool>,
}

impl ParentCandidates {
    fn new(len: usize) -> Self {
        Self {
            parents: vec![None; len],
            conflicts: vec![false; len],
        }
    }

    fn offer(&mut self, child: usize, parent: usize, groups: &[GroupEntity]) {
        if let Some(previous) = self.parents[child] {
            if previous != parent {
                warn!(
                    group = %groups[child].entity_ref(),
                    previous = %groups[previous].entity_ref(),
                    replacement = %groups[parent].entity_ref(),
                    "Group has more than one parent candidate, keeping the last one"
                );
                self.conflicts[child] = true;
            }
        }
        self.parents[child] = Some(parent);
    }
}

/// Resolve raw relation edges into entity references.
///
/// Users gain `memberOf` entries, groups gain `parent` and `children`. Either
/// membership direction (a user's `memberOf` or a group's `members`) yields
/// the same result, and running the pass again on its own output changes
/// nothing.
///
/// # Errors
///
/// `Resolution` when one DN or unique id belongs to two different entities of
/// the same kind. Nothing is mutated in that case.
pub fn resolve_relations(
    groups: &mut [GroupEntity],
    users: &mut [UserEntity],
    user_member_of: &RawMembershipIndex,
    group_member_of: &RawMembershipIndex,
    group_members: &RawMembershipIndex,
) -> SyncResult<ResolutionStatistics> {
    let user_index = IdentityIndex::build(users)?;
    let group_index = IdentityIndex::build(groups)?;
    let group_refs: Vec<String> = groups.iter().map(|g| g.entity_ref().to_string()).collect();

    let mut stats = ResolutionStatistics::default();
    let mut memberships: Vec<Vec<usize>> = vec![Vec::new(); users.len()];
    let mut candidates = ParentCandidates::new(groups.len());

    for (source, targets) in user_member_of.iter() {
        let Some(user) = user_index.lookup(source) else {
            debug!(source = %source, edges = targets.len(), "Dropping memberOf edges of unknown user");
            stats.dropped_edges += targets.len();
            continue;
        };
        for target in targets {
            match group_index.lookup(target) {
                Some(group) => memberships[user].push(group),
                None => {
                    debug!(user = %source, target = %target, "Dropping unresolved memberOf edge");
                    stats.dropped_edges += 1;
                }
            }
        }
    }

    for (source, targets) in group_member_of.iter() {
        let Some(child) = group_index.lookup(source) else {
            debug!(source = %source, edges = targets.len(), "Dropping memberOf edges of unknown group");
            stats.dropped_edges += targets.len();
            continue;
        };
        for target in targets {
            match group_index.lookup(target) {
                Some(parent) if parent == child => {
                    debug!(group = %source, "Dropping self-referencing memberOf edge");
                    stats.dropped_edges += 1;
                }
                Some(parent) => candidates.offer(child, parent, groups),
                None => {
                    debug!(group = %source, target = %target, "Dropping unresolved memberOf edge");
                    stats.dropped_edges += 1;
                }
            }
        }
    }

    for (source, targets) in group_members.iter() {
        let Some(parent) = group_index.lookup(source) else {
            debug!(source = %source, edges = targets.len(), "Dropping member edges of unknown group");
            stats.dropped_edges += targets.len();
            continue;
        };
        for target in targets {
            if let Some(user) = user_index.lookup(target) {
                memberships[user].push(parent);
                continue;
            }
            match group_index.lookup(target) {
                Some(child) if child == parent => {
                    debug!(group = %source, "Dropping self-referencing member edge");
                    stats.dropped_edges += 1;
                }
                Some(child) => candidates.offer(child, parent, groups),
                None => {
                    debug!(group = %source, target = %target, "Dropping unresolved member edge");
                    stats.dropped_edges += 1;
                }
            }
        }
    }

    for (user, group_positions) in users.iter_mut().zip(memberships) {
        let mut present: HashSet<String> = user.spec.member_of.iter().cloned().collect();
        for group in group_positions {
            let reference = &group_refs[group];
            if present.insert(reference.clone()) {
                user.spec.member_of.push(reference.clone());
                stats.memberships_resolved += 1;
            }
        }
    }

    for (position, parent) in candidates.parents.iter().enumerate() {
        if let Some(parent) = parent {
            groups[position].spec.parent = Some(group_refs[*parent].clone());
            stats.parents_resolved += 1;
        }
    }
    stats.parent_conflicts = candidates.conflicts.iter().filter(|c| **c).count();

    // Children always mirror the final parents.
    let positions: HashMap<&str, usize> = group_refs
        .iter()
        .enumerate()
        .map(|(position, reference)| (reference.as_str(), position))
        .collect();
    let mut children: Vec<Vec<String>> = vec![Vec::new(); groups.len()];
    for (position, group) in groups.iter().enumerate() {
        let Some(parent) = group.spec.parent.as_deref() else {
            continue;
        };
        // Each group has one parent, so a child is listed at most once.
        if let Some(parent_position) = positions.get(parent) {
            children[*parent_position].push(group_refs[position].clone());
        }
    }
    for (group, group_children) in groups.iter_mut().zip(children) {
        group.spec.children = group_children;
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{LDAP_DN_ANNOTATION, LDAP_UUID_ANNOTATION};

    fn user(name: &str, dn: &str) -> UserEntity {
        let mut user = UserEntity::new(name);
        user.metadata
            .annotations
            .insert(LDAP_DN_ANNOTATION.to_string(), dn.to_string());
        user
    }

    fn group(name: &str, dn: &str) -> GroupEntity {
        let mut group = GroupEntity::new(name);
        group
            .metadata
            .annotations
            .insert(LDAP_DN_ANNOTATION.to_string(), dn.to_string());
        group
    }

    fn index(source: &str, targets: &[&str]) -> RawMembershipIndex {
        let mut index = RawMembershipIndex::new();
        index.insert(source, targets.iter().copied());
        index
    }

    #[test]
    fn test_unknown_group_is_omitted() {
        let mut users = vec![user("user1", "uid=user1,dc=example,dc=com")];
        let mut groups = vec![group("team1", "cn=team1,dc=example,dc=com")];
        let user_member_of = index("uid=user1,dc=example,dc=com", &["cn=team1,dc=example,dc=com", "cn=team2,dc=example,dc=com"]);

        let stats = resolve_relations(
            &mut groups,
            &mut users,
            &user_member_of,
            &RawMembershipIndex::new(),
            &RawMembershipIndex::new(),
        )
        .unwrap();

        assert_eq!(users[0].spec.member_of, vec!["group:default/team1"]);
        assert_eq!(stats.memberships_resolved, 1);
        assert_eq!(stats.dropped_edges, 1);
    }

    #[test]
    fn test_parent_and_children() {
        let mut groups = vec![
            group("parent", "cn=parent,dc=example,dc=com"),
            group("child", "cn=child,dc=example,dc=com"),
        ];
        let group_member_of = index("cn=child,dc=example,dc=com", &["cn=parent,dc=example,dc=com"]);

        resolve_relations(
            &mut groups,
            &mut [],
            &RawMembershipIndex::new(),
            &group_member_of,
            &RawMembershipIndex::new(),
        )
        .unwrap();

        assert_eq!(groups[1].spec.parent.as_deref(), Some("group:default/parent"));
        assert_eq!(groups[0].spec.children, vec!["group:default/child"]);
        assert!(groups[0].spec.parent.is_none());
    }

    #[test]
    fn test_mixed_case_dn_resolves() {
        let mut users = vec![user("user1", "uid=user1,ou=people,dc=example,dc=com")];
        let mut groups = vec![group("team1", "cn=team1,ou=groups,dc=example,dc=com")];
        let group_members = index("CN=Team1,OU=Groups,DC=Example,DC=Com", &["UID=User1,OU=People,DC=Example,DC=Com"]);

        resolve_relations(
            &mut groups,
            &mut users,
            &RawMembershipIndex::new(),
            &RawMembershipIndex::new(),
            &group_members,
        )
        .unwrap();

        assert_eq!(users[0].spec.member_of, vec!["group:default/team1"]);
    }

    #[test]
    fn test_uuid_fallback_is_exact() {
        let mut users = vec![user("user1", "uid=user1,dc=example,dc=com")];
        let mut team = group("team1", "cn=team1,dc=example,dc=com");
        team.metadata
            .annotations
            .insert(LDAP_UUID_ANNOTATION.to_string(), "AbC-123".to_string());
        let mut groups = vec![team];

        let user_member_of = index("uid=user1,dc=example,dc=com", &["AbC-123", "abc-123"]);

        let stats = resolve_relations(
            &mut groups,
            &mut users,
            &user_member_of,
            &RawMembershipIndex::new(),
            &RawMembershipIndex::new(),
        )
        .unwrap();

        assert_eq!(users[0].spec.member_of, vec!["group:default/team1"]);
        assert_eq!(stats.dropped_edges, 1);
    }

    #[test]
    fn test_self_edges_dropped() {
        let mut groups = vec![group("loop", "cn=loop,dc=example,dc=com")];
        let edges = index("cn=loop,dc=example,dc=com", &["CN=loop,dc=example,dc=com"]);

        let stats = resolve_relations(
            &mut groups,
            &mut [],
            &RawMembershipIndex::new(),
            &edges,
            &edges,
        )
        .unwrap();

        assert!(groups[0].spec.parent.is_none());
        assert!(groups[0].spec.children.is_empty());
        assert_eq!(stats.dropped_edges, 2);
    }

    #[test]
    fn test_last_parent_candidate_wins() {
        let mut groups = vec![
            group("a", "cn=a,dc=example,dc=com"),
            group("b", "cn=b,dc=example,dc=com"),
            group("child", "cn=child,dc=example,dc=com"),
        ];
        let group_member_of = index("cn=child,dc=example,dc=com", &["cn=a,dc=example,dc=com", "cn=b,dc=example,dc=com"]);

        let stats = resolve_relations(
            &mut groups,
            &mut [],
            &RawMembershipIndex::new(),
            &group_member_of,
            &RawMembershipIndex::new(),
        )
        .unwrap();

        assert_eq!(groups[2].spec.parent.as_deref(), Some("group:default/b"));
        assert!(groups[0].spec.children.is_empty());
        assert_eq!(groups[1].spec.children, vec!["group:default/child"]);
        assert_eq!(stats.parent_conflicts, 1);
    }

    #[test]
    fn test_ambiguous_dn_fails_without_mutation() {
        let mut users = vec![user("user1", "uid=user1,dc=example,dc=com")];
        let mut groups = vec![
            group("team1", "cn=team,dc=example,dc=com"),
            group("team2", "CN=Team,dc=example,dc=com"),
        ];
        let user_member_of = index("uid=user1,dc=example,dc=com", &["cn=team,dc=example,dc=com"]);

        let err = resolve_relations(
            &mut groups,
            &mut users,
            &user_member_of,
            &RawMembershipIndex::new(),
            &RawMembershipIndex::new(),
        )
        .unwrap_err();

        assert_eq!(err.error_code(), "RESOLUTION_ERROR");
        assert!(users[0].spec.member_of.is_empty());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let mut users = vec![user("user1", "uid=user1,dc=example,dc=com")];
        let mut groups = vec![
            group("parent", "cn=parent,dc=example,dc=com"),
            group("child", "cn=child,dc=example,dc=com"),
        ];
        let user_member_of = index("uid=user1,dc=example,dc=com", &["cn=child,dc=example,dc=com"]);
        let group_members = index("cn=parent,dc=example,dc=com", &["cn=child,dc=example,dc=com", "uid=user1,dc=example,dc=com"]);
        let empty = RawMembershipIndex::new();

        resolve_relations(&mut groups, &mut users, &user_member_of, &empty, &group_members)
            .unwrap();
        let (users_once, groups_once) = (users.clone(), groups.clone());

        resolve_relations(&mut groups, &mut users, &user_member_of, &empty, &group_members)
            .unwrap();
        assert_eq!(users, users_once);
        assert_eq!(groups, groups_once);
        assert_eq!(
            users[0].spec.member_of,
            vec!["group:default/child", "group:default/parent"]
        );
    }

    #[test]
    fn test_user_in_many_groups_from_both_directions() {
        let user_dn = "uid=user1,dc=example,dc=com";
        let mut users = vec![user("user1", user_dn)];
        let mut groups: Vec<GroupEntity> = (0..20_000)
            .map(|i| group(&format!("team{i}"), &format!("cn=team{i},dc=example,dc=com")))
            .collect();

        let group_dns: Vec<String> = (0..20_000)
            .map(|i| format!("cn=team{i},dc=example,dc=com"))
            .collect();
        let mut user_member_of = RawMembershipIndex::new();
        user_member_of.insert(user_dn, group_dns.iter().cloned());
        let mut group_members = RawMembershipIndex::new();
        for dn in &group_dns {
            group_members.insert(dn, [user_dn]);
        }
        let empty = RawMembershipIndex::new();

        let stats =
            resolve_relations(&mut groups, &mut users, &user_member_of, &empty, &group_members)
                .unwrap();

        assert_eq!(users[0].spec.member_of.len(), 20_000);
        assert_eq!(users[0].spec.member_of[0], "group:default/team0");
        assert_eq!(stats.memberships_resolved, 20_000);
    }
}
