//! Relationship derivation
//!
//! Pure transforms from a unit of records (a whole document or one chunk of
//! it) to [`RelationshipBatch`]es. Which derivers run depends on the
//! document's entity type and on legacy mode. LAPS-sync inference is the
//! exception: it reads the whole store, so it lives in [`sync_laps`].

use super::document::{
    CollectedResults, DelegationTarget, EntityRecord, EntityType, ObjectRef, TrustDirection,
};
use super::retry::run_with_retry;
use crate::config::IngestConfig;
use crate::driver::{GraphSession, RelationshipBatch, Row, Statement};
use crate::error::IngestResult;
use crate::graph::{Label, OBJECT_ID_KEY};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Relationship types written by the structural derivers
pub mod kind {
    pub const MEMBER_OF: &str = "MemberOf";
    pub const CONTAINS: &str = "Contains";
    pub const GP_LINK: &str = "GPLink";
    pub const TRUSTED_BY: &str = "TrustedBy";
    pub const HAS_SESSION: &str = "HasSession";
    pub const CAN_RDP: &str = "CanRDP";
    pub const ADMIN_TO: &str = "AdminTo";
    pub const EXECUTE_DCOM: &str = "ExecuteDCOM";
    pub const CAN_PS_REMOTE: &str = "CanPSRemote";
    pub const ALLOWED_TO_DELEGATE: &str = "AllowedToDelegate";
    pub const ALLOWED_TO_ACT: &str = "AllowedToAct";
    pub const SYNC_LAPS_PASSWORD: &str = "SyncLAPSPassword";

    /// Every type not derived from an access-control entry
    pub const STRUCTURAL: [&str; 12] = [
        MEMBER_OF,
        CONTAINS,
        GP_LINK,
        TRUSTED_BY,
        HAS_SESSION,
        CAN_RDP,
        ADMIN_TO,
        EXECUTE_DCOM,
        CAN_PS_REMOTE,
        ALLOWED_TO_DELEGATE,
        ALLOWED_TO_ACT,
        SYNC_LAPS_PASSWORD,
    ];

    /// True for relationship types that come from access-control entries
    pub fn is_acl(edge_type: &str) -> bool {
        !STRUCTURAL.contains(&edge_type)
    }
}

/// Well-known RIDs of groups that may read LAPS passwords
const LAPS_GROUP_SUFFIXES: [&str; 4] = ["-512", "-516", "-519", "-544"];

/// Run every deriver that applies to `entity_type` over `records`
///
/// Batches come back in write order; empty ones are dropped.
pub fn derive_batches(
    entity_type: &EntityType,
    records: &[EntityRecord],
    legacy_mode: bool,
) -> Vec<RelationshipBatch> {
    let mut batches = Vec::new();
    batches.extend(memberships(entity_type, records));
    batches.extend(aces(records));

    match entity_type {
        EntityType::Container | EntityType::OU => {
            batches.push(child_objects(records));
            batches.push(gpo_links(records));
        }
        EntityType::Computer => {
            batches.push(sessions(records));
            if legacy_mode {
                batches.push(remote_accounts(records, kind::CAN_RDP, |r| &r.remote_desktop_users));
                batches.push(remote_accounts(records, kind::ADMIN_TO, |r| &r.local_admins));
                batches.push(remote_accounts(records, kind::EXECUTE_DCOM, |r| &r.dcom_users));
                batches.push(remote_accounts(records, kind::CAN_PS_REMOTE, |r| &r.ps_remote_users));
            }
            batches.push(delegation(records, kind::ALLOWED_TO_DELEGATE, |r| &r.allowed_to_delegate));
            batches.push(delegation(records, kind::ALLOWED_TO_ACT, |r| &r.allowed_to_act));
        }
        EntityType::User => {
            batches.push(delegation(records, kind::ALLOWED_TO_DELEGATE, |r| &r.allowed_to_delegate));
        }
        EntityType::Domain => batches.push(trusts(records)),
        _ => {}
    }

    batches.retain(|batch| !batch.is_empty());
    batches
}

/// Group members point at their group; users and computers point at their
/// primary group
pub fn memberships(entity_type: &EntityType, records: &[EntityRecord]) -> Option<RelationshipBatch> {
    match entity_type {
        EntityType::Group => {
            let mut batch = RelationshipBatch::new(kind::MEMBER_OF);
            for record in records {
                for member in &record.members {
                    batch.push(member.object_id.as_str(), record.object_id.as_str());
                }
            }
            Some(batch)
        }
        EntityType::User | EntityType::Computer => {
            let mut batch = RelationshipBatch::new(kind::MEMBER_OF).with_target_label("Group");
            for record in records {
                if let Some(group) = record.primary_group_sid.as_deref().filter(|g| !g.is_empty()) {
                    batch.push(record.object_id.as_str(), group);
                }
            }
            Some(batch)
        }
        _ => None,
    }
}

/// One batch per right name, principal -> protected object
pub fn aces(records: &[EntityRecord]) -> Vec<RelationshipBatch> {
    let mut by_right: IndexMap<&str, RelationshipBatch> = IndexMap::new();
    for record in records {
        for ace in &record.aces {
            let Some(principal) = ace.principal_sid.as_deref() else {
                continue;
            };
            by_right
                .entry(ace.right_name.as_str())
                .or_insert_with(|| RelationshipBatch::new(ace.right_name.as_str()))
                .push(principal, record.object_id.as_str());
        }
    }
    by_right.into_values().collect()
}

/// Container -> child object
pub fn child_objects(records: &[EntityRecord]) -> RelationshipBatch {
    let mut batch = RelationshipBatch::new(kind::CONTAINS);
    for record in records {
        for child in &record.child_objects {
            batch.push(record.object_id.as_str(), child.object_id.as_str());
        }
    }
    batch
}

/// GPO -> linked container
pub fn gpo_links(records: &[EntityRecord]) -> RelationshipBatch {
    let mut batch = RelationshipBatch::new(kind::GP_LINK);
    for record in records {
        for link in &record.links {
            batch.push(link.guid.as_str(), record.object_id.as_str());
        }
    }
    batch
}

/// Logged-on user -> computer
pub fn sessions(records: &[EntityRecord]) -> RelationshipBatch {
    let mut batch = RelationshipBatch::new(kind::HAS_SESSION);
    for record in records {
        for entry in &record.registry_sessions.results {
            batch.push(entry.user_sid.as_str(), record.object_id.as_str());
        }
    }
    batch
}

/// Principal listed in a remotely collected group -> computer
pub fn remote_accounts<F>(records: &[EntityRecord], edge_type: &str, list: F) -> RelationshipBatch
where
    F: Fn(&EntityRecord) -> &CollectedResults<ObjectRef>,
{
    let mut batch = RelationshipBatch::new(edge_type);
    for record in records {
        for principal in &list(record).results {
            batch.push(principal.object_id.as_str(), record.object_id.as_str());
        }
    }
    batch
}

/// Delegating account -> delegation target
pub fn delegation<F>(records: &[EntityRecord], edge_type: &str, list: F) -> RelationshipBatch
where
    F: Fn(&EntityRecord) -> &Vec<DelegationTarget>,
{
    let mut batch = RelationshipBatch::new(edge_type);
    for record in records {
        for target in list(record) {
            batch.push(record.object_id.as_str(), target.object_id());
        }
    }
    batch
}

/// Trust edges; inbound points at the target domain, outbound back at the
/// declaring domain, bidirectional both ways
pub fn trusts(records: &[EntityRecord]) -> RelationshipBatch {
    let mut batch = RelationshipBatch::new(kind::TRUSTED_BY);
    for record in records {
        let domain = record.object_id.as_str();
        for trust in &record.trusts {
            let target = trust.target_domain_sid.as_str();
            match &trust.direction {
                TrustDirection::Inbound => batch.push(domain, target),
                TrustDirection::Outbound => batch.push(target, domain),
                TrustDirection::Bidirectional => {
                    batch.push(domain, target);
                    batch.push(target, domain);
                }
                TrustDirection::Disabled => {}
                TrustDirection::Unknown(direction) => {
                    warn!(domain, target, direction = %direction, "unknown trust direction, no edge");
                }
            }
        }
    }
    batch
}

/// Connect every privileged well-known group to every LAPS computer
pub fn laps_sync_pairs(groups: &[String], computers: &[String]) -> RelationshipBatch {
    let mut batch = RelationshipBatch::new(kind::SYNC_LAPS_PASSWORD)
        .with_source_label("Group")
        .with_target_label("Computer");
    for group in groups {
        if !LAPS_GROUP_SUFFIXES.iter().any(|suffix| group.ends_with(suffix)) {
            continue;
        }
        for computer in computers {
            batch.push(group.as_str(), computer.as_str());
        }
    }
    batch
}

fn object_ids(rows: Vec<Row>) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get_str(OBJECT_ID_KEY).map(str::to_string))
        .collect()
}

/// Infer `SyncLAPSPassword` edges from the whole store
///
/// Reads every `Computer` with `haslaps = true` and every `Group` with
/// `admincount = true`. Safe to repeat: the write is a merge. Returns the
/// number of pairs submitted.
pub async fn sync_laps(session: &mut dyn GraphSession, config: &IngestConfig) -> IngestResult<usize> {
    let computers = run_with_retry(
        session,
        &Statement::MatchFlagged {
            label: Label::new("Computer"),
            property: "haslaps".to_string(),
        },
        config,
    )
    .await?;
    let groups = run_with_retry(
        session,
        &Statement::MatchFlagged {
            label: Label::new("Group"),
            property: "admincount".to_string(),
        },
        config,
    )
    .await?;

    let batch = laps_sync_pairs(&object_ids(groups), &object_ids(computers));
    if batch.is_empty() {
        return Ok(0);
    }
    let pairs = batch.len();
    run_with_retry(session, &Statement::MergeRelationships(batch), config).await?;
    debug!(pairs, "LAPS sync relationships merged");
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::document::parse_document;
    use std::path::Path;

    fn records(tag: &str, data: &str) -> (EntityType, Vec<EntityRecord>) {
        let json = format!(r#"{{"meta": {{"type": "{}"}}, "data": {}}}"#, tag, data);
        let doc = parse_document(Path::new("t.json"), json.as_bytes()).unwrap();
        (doc.entity_type, doc.records)
    }

    fn find<'a>(batches: &'a [RelationshipBatch], edge_type: &str) -> &'a RelationshipBatch {
        batches
            .iter()
            .find(|b| b.edge_type.as_str() == edge_type)
            .unwrap_or_else(|| panic!("no {} batch", edge_type))
    }

    fn pair(source: &str, target: &str) -> (String, String) {
        (source.to_string(), target.to_string())
    }

    #[test]
    fn test_group_members() {
        let (ty, recs) = records(
            "groups",
            r#"[{"ObjectIdentifier": "g1", "Members": [{"ObjectIdentifier": "u1", "ObjectType": "User"}, {"ObjectIdentifier": "u2"}]}]"#,
        );
        let batches = derive_batches(&ty, &recs, false);
        let member_of = find(&batches, kind::MEMBER_OF);
        assert_eq!(member_of.pairs, vec![pair("u1", "g1"), pair("u2", "g1")]);
        assert!(member_of.target_label.is_none());
    }

    #[test]
    fn test_primary_group_targets_group_label() {
        let (ty, recs) = records(
            "users",
            r#"[{"ObjectIdentifier": "u1", "PrimaryGroupSID": "g513"}, {"ObjectIdentifier": "u2", "PrimaryGroupSID": null}]"#,
        );
        let batches = derive_batches(&ty, &recs, false);
        let member_of = find(&batches, kind::MEMBER_OF);
        assert_eq!(member_of.pairs, vec![pair("u1", "g513")]);
        assert_eq!(member_of.target_label, Some(Label::new("Group")));
    }

    #[test]
    fn test_aces_grouped_by_right() {
        let (ty, recs) = records(
            "gpos",
            r#"[
                {"ObjectIdentifier": "o1", "Aces": [
                    {"PrincipalSID": "p1", "RightName": "Owns"},
                    {"PrincipalSID": "p2", "RightName": "GenericWrite"}
                ]},
                {"ObjectIdentifier": "o2", "Aces": [
                    {"PrincipalSID": "p3", "RightName": "Owns"},
                    {"PrincipalSID": null, "RightName": "Owns"}
                ]}
            ]"#,
        );
        let batches = derive_batches(&ty, &recs, false);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].edge_type.as_str(), "Owns");
        assert_eq!(batches[0].pairs, vec![pair("p1", "o1"), pair("p3", "o2")]);
        assert_eq!(batches[1].pairs, vec![pair("p2", "o1")]);
    }

    #[test]
    fn test_container_children_and_links() {
        let (ty, recs) = records(
            "ous",
            r#"[{"ObjectIdentifier": "ou1", "ChildObjects": [{"ObjectIdentifier": "c1", "ObjectType": "Computer"}], "Links": [{"GUID": "gpo1", "IsEnforced": false}]}]"#,
        );
        let batches = derive_batches(&ty, &recs, false);
        assert_eq!(find(&batches, kind::CONTAINS).pairs, vec![pair("ou1", "c1")]);
        assert_eq!(find(&batches, kind::GP_LINK).pairs, vec![pair("gpo1", "ou1")]);
    }

    #[test]
    fn test_computer_legacy_gating() {
        let data = r#"[{
            "ObjectIdentifier": "c1",
            "RegistrySessions": {"Results": [{"UserSID": "u1"}]},
            "RemoteDesktopUsers": {"Results": [{"ObjectIdentifier": "u2"}]},
            "LocalAdmins": {"Results": [{"ObjectIdentifier": "g1"}]},
            "DcomUsers": {"Results": [{"ObjectIdentifier": "u3"}]},
            "PSRemoteUsers": {"Results": [{"ObjectIdentifier": "u4"}]},
            "AllowedToDelegate": [{"ObjectIdentifier": "c2"}],
            "AllowedToAct": [{"ObjectIdentifier": "u5"}]
        }]"#;
        let (ty, recs) = records("computers", data);

        let modern = derive_batches(&ty, &recs, false);
        let types: Vec<&str> = modern.iter().map(|b| b.edge_type.as_str()).collect();
        assert_eq!(types, vec![kind::HAS_SESSION, kind::ALLOWED_TO_DELEGATE, kind::ALLOWED_TO_ACT]);
        assert_eq!(find(&modern, kind::HAS_SESSION).pairs, vec![pair("u1", "c1")]);
        assert_eq!(find(&modern, kind::ALLOWED_TO_DELEGATE).pairs, vec![pair("c1", "c2")]);

        let legacy = derive_batches(&ty, &recs, true);
        assert_eq!(legacy.len(), 7);
        assert_eq!(find(&legacy, kind::CAN_RDP).pairs, vec![pair("u2", "c1")]);
        assert_eq!(find(&legacy, kind::ADMIN_TO).pairs, vec![pair("g1", "c1")]);
        assert_eq!(find(&legacy, kind::EXECUTE_DCOM).pairs, vec![pair("u3", "c1")]);
        assert_eq!(find(&legacy, kind::CAN_PS_REMOTE).pairs, vec![pair("u4", "c1")]);
    }

    #[test]
    fn test_user_delegation_bare_ids() {
        let (ty, recs) = records(
            "users",
            r#"[{"ObjectIdentifier": "u1", "AllowedToDelegate": ["c1", "c2"], "AllowedToAct": [{"ObjectIdentifier": "x"}]}]"#,
        );
        let batches = derive_batches(&ty, &recs, false);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].pairs, vec![pair("u1", "c1"), pair("u1", "c2")]);
    }

    #[test]
    fn test_trust_directions() {
        let (ty, recs) = records(
            "domains",
            r#"[{"ObjectIdentifier": "d1", "Trusts": [
                {"TargetDomainSid": "in", "TrustDirection": 1},
                {"TargetDomainSid": "out", "TrustDirection": "Outbound"},
                {"TargetDomainSid": "both", "TrustDirection": "Bidirectional"},
                {"TargetDomainSid": "off", "TrustDirection": 0},
                {"TargetDomainSid": "odd", "TrustDirection": 7},
                {"TargetDomainSid": "weird", "TrustDirection": "Sideways"}
            ]}]"#,
        );
        let batches = derive_batches(&ty, &recs, false);
        assert_eq!(
            find(&batches, kind::TRUSTED_BY).pairs,
            vec![pair("d1", "in"), pair("out", "d1"), pair("d1", "both"), pair("both", "d1")]
        );
    }

    #[test]
    fn test_no_records_no_batches() {
        assert!(derive_batches(&EntityType::Computer, &[], true).is_empty());
        assert!(derive_batches(&EntityType::Group, &[], false).is_empty());
    }

    #[test]
    fn test_laps_pairs_filter_well_known_groups() {
        let groups = vec![
            "S-1-5-21-1-512".to_string(),
            "S-1-5-21-1-1120".to_string(),
            "CORP.LOCAL-S-1-5-32-544".to_string(),
        ];
        let computers = vec!["c1".to_string(), "c2".to_string()];
        let batch = laps_sync_pairs(&groups, &computers);
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.source_label, Some(Label::new("Group")));
        assert_eq!(batch.target_label, Some(Label::new("Computer")));
        assert!(batch.pairs.contains(&pair("CORP.LOCAL-S-1-5-32-544", "c2")));
        assert!(!batch.pairs.iter().any(|(g, _)| g.ends_with("-1120")));
    }

    #[test]
    fn test_acl_classification() {
        assert!(kind::is_acl("GenericAll"));
        assert!(kind::is_acl("Owns"));
        assert!(!kind::is_acl(kind::MEMBER_OF));
        assert!(!kind::is_acl(kind::SYNC_LAPS_PASSWORD));
    }
}
