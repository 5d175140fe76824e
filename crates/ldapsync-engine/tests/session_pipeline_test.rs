//! Full cycles against a wiremock session-API platform.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ldapsync_core::{
    CommonRules, DirectoryPlugin, FieldMapper, GroupReconciler, MappingEntry, MappingTable,
    RawRecord, SyncResult,
};
use ldapsync_engine::{CycleStage, Hooks, SyncPipeline};
use ldapsync_session_client::{SessionClient, SessionConfig};

struct StaticDirectory {
    mapper: FieldMapper,
    records: Vec<RawRecord>,
}

impl StaticDirectory {
    fn new(records: Vec<RawRecord>) -> Self {
        let table: MappingTable = [
            ("userName", "${uid}"),
            ("displayName", "${cn}"),
            ("memberOf", "${memberOf}"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), MappingEntry::Text(v.to_string())))
        .collect();
        Self {
            mapper: FieldMapper::compile(&table, &CommonRules).unwrap(),
            records,
        }
    }
}

#[async_trait]
impl DirectoryPlugin for StaticDirectory {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_records(&self) -> SyncResult<Vec<RawRecord>> {
        Ok(self.records.clone())
    }

    fn mapper(&self) -> &FieldMapper {
        &self.mapper
    }
}

async fn mount_session(server: &MockServer, sessions: u64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "t0k3n"})))
        .expect(sessions)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/auth/logout"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(sessions)
        .mount(server)
        .await;
}

async fn mount_users(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/v1/users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "users": [
                {"id": 5, "username": "alice", "displayName": "Alice", "active": true, "remote": true},
                {"id": 6, "username": "bob", "displayName": "Bob", "active": true, "remote": true}
            ]
        })))
        .mount(server)
        .await;
}

fn pipeline(server: &MockServer, directory: StaticDirectory, auto_removal: bool) -> SyncPipeline {
    let client = Arc::new(
        SessionClient::new(SessionConfig::new(server.uri(), "admin", "hashed")).unwrap(),
    );
    let reconciler = GroupReconciler::new(None, auto_removal).unwrap();
    SyncPipeline::new(Arc::new(directory), client.clone(), Hooks::none()).with_groups(client, reconciler)
}

fn person(uid: &str, cn: &str, groups: &[&str]) -> RawRecord {
    RawRecord::new(format!("uid={uid},ou=people,dc=example,dc=com"))
        .with_text("uid", &[uid])
        .with_text("cn", &[cn])
        .with_text("memberOf", groups)
}

#[tokio::test]
async fn test_cycle_syncs_users_and_groups() {
    let server = MockServer::start().await;
    mount_session(&server, 2).await;
    mount_users(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/users"))
        .and(body_partial_json(json!({"user": {"username": "carol", "remote": true}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "user": {"id": 7, "username": "carol", "displayName": "Carol", "active": true, "remote": true}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/api/v1/users/6"))
        .and(body_partial_json(json!({"active": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user": {"id": 6, "username": "bob", "active": false}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/groups/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "groups": [{"group": {"groupId": 9, "name": "DataScience"}, "numMembers": 0}]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/groups/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "group": {"groupId": 9, "name": "DataScience", "users": []}
        })))
        .mount(&server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/api/v1/groups/9"))
        .and(body_partial_json(json!({"groupId": 9, "addUsers": [5]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let directory = StaticDirectory::new(vec![
        person("alice", "Alice", &["CN=DataScience,OU=Groups,DC=example,DC=com"]),
        person("carol", "Carol", &[]),
    ]);
    let report = pipeline(&server, directory, false).run_cycle().await;

    assert!(report.is_success(), "{:?}", report.error);
    assert_eq!(report.stage, CycleStage::Completed);
    let users = report.users.unwrap();
    assert_eq!((users.add, users.update, users.delete, users.unchanged), (1, 0, 1, 1));
    assert_eq!(report.user_ops.applied, 2);
    assert_eq!(report.groups.added, 1);
}

#[tokio::test]
async fn test_failed_group_listing_still_logs_out() {
    let server = MockServer::start().await;
    mount_session(&server, 1).await;
    mount_users(&server).await;

    Mock::given(method("POST"))
        .and(path("/api/v1/groups/search"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let report = pipeline(&server, StaticDirectory::new(Vec::new()), true)
        .run_cycle()
        .await;

    assert!(!report.is_success());
    assert_eq!(report.stage, CycleStage::ReconcileGroups);
    assert!(report.users.is_none());
}
