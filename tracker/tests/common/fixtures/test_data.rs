//! Common test data: a small but complete tracker store and artifact builders

use anyhow::Result;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedReceiver;

use tracker::backup::{ProgressEvent, SnapshotArtifact};
use tracker::config::BackupSettings;
use tracker::database::EntityKind;

use super::TestDatabase;

/// Identities used by the seeded store
pub mod ids {
    pub const ALICE: &str = "user-alice";
    pub const BOB: &str = "user-bob";
    pub const CAROL: &str = "user-carol";
    pub const ENGINEERING: &str = "dept-engineering";
    pub const PLATFORM: &str = "dept-platform";
    pub const ONBOARDING: &str = "wf-onboarding";
    pub const APOLLO: &str = "project-apollo";
    pub const TASK_PARENT: &str = "task-parent";
    pub const TASK_CHILD: &str = "task-child";
    pub const INCIDENT: &str = "incident-outage";
}

pub const TS: &str = "2026-03-01T09:00:00Z";

/// Small pages so paged collections span several pages
pub fn test_settings() -> BackupSettings {
    BackupSettings {
        page_size: 2,
        page_pause_ms: 0,
        progress_every_records: 1,
        ..BackupSettings::default()
    }
}

pub fn user(id: &str, email: &str, manager: Option<&str>) -> Value {
    json!({
        "id": id,
        "email": email,
        "display_name": id.trim_start_matches("user-"),
        "department_id": null,
        "location_id": null,
        "manager_id": manager,
        "active": true,
        "created_at": TS
    })
}

pub fn incident(id: &str, project: Option<&str>, reporter: Option<&str>) -> Value {
    json!({
        "id": id,
        "title": format!("Incident {}", id),
        "severity": "high",
        "status": "open",
        "project_id": project,
        "reported_by": reporter,
        "assigned_to": null,
        "occurred_at": TS
    })
}

pub fn task(id: &str, owner: &str, parent: Option<&str>) -> Value {
    json!({
        "id": id,
        "title": format!("Task {}", id),
        "owner_id": owner,
        "project_id": ids::APOLLO,
        "milestone_id": null,
        "process_instance_id": null,
        "parent_task_id": parent,
        "status": "open",
        "priority": 2,
        "due_date": null,
        "created_at": TS
    })
}

/// Rows for every entity type, in an insertion order the foreign keys accept.
/// `departments.head_user_id` is patched afterwards by [`seed_store`].
pub fn seed_rows() -> Vec<(EntityKind, Vec<Value>)> {
    use ids::*;
    vec![
        (
            EntityKind::Permission,
            vec![
                json!({"id": "perm-read", "code": "read", "description": "Read access"}),
                json!({"id": "perm-write", "code": "write", "description": null}),
            ],
        ),
        (
            EntityKind::Role,
            vec![json!({"id": "role-admin", "name": "admin", "description": "Administrators"})],
        ),
        (
            EntityKind::Location,
            vec![json!({"id": "loc-berlin", "name": "Berlin", "address": null, "timezone": "Europe/Berlin"})],
        ),
        (
            EntityKind::Department,
            vec![
                json!({"id": ENGINEERING, "name": "Engineering", "parent_department_id": null, "head_user_id": null}),
                json!({"id": PLATFORM, "name": "Platform", "parent_department_id": ENGINEERING, "head_user_id": null}),
            ],
        ),
        (
            EntityKind::Tag,
            vec![
                json!({"id": "tag-urgent", "name": "urgent", "color": "red"}),
                json!({"id": "tag-infra", "name": "infra", "color": null}),
            ],
        ),
        (
            EntityKind::Setting,
            vec![json!({"id": "setting-locale", "key": "locale", "value": "de-DE", "updated_at": TS})],
        ),
        (
            EntityKind::Client,
            vec![json!({"id": "client-acme", "name": "ACME", "industry": "Manufacturing", "created_at": TS})],
        ),
        (
            EntityKind::Workflow,
            vec![json!({"id": ONBOARDING, "name": "Onboarding", "description": null, "active": true})],
        ),
        (
            EntityKind::WorkflowStep,
            vec![
                json!({"id": "step-1", "workflow_id": ONBOARDING, "position": 1, "name": "Paperwork", "sla_hours": 24}),
                json!({"id": "step-2", "workflow_id": ONBOARDING, "position": 2, "name": "Laptop", "sla_hours": null}),
            ],
        ),
        (
            EntityKind::User,
            vec![
                json!({
                    "id": ALICE, "email": "alice@example.com", "display_name": "Alice",
                    "department_id": ENGINEERING, "location_id": "loc-berlin", "manager_id": null,
                    "active": true, "created_at": TS
                }),
                json!({
                    "id": BOB, "email": "bob@example.com", "display_name": "Bob",
                    "department_id": PLATFORM, "location_id": null, "manager_id": ALICE,
                    "active": true, "created_at": TS
                }),
                json!({
                    "id": CAROL, "email": "carol@example.com", "display_name": "Carol",
                    "department_id": null, "location_id": null, "manager_id": BOB,
                    "active": false, "created_at": TS
                }),
            ],
        ),
        (
            EntityKind::UserDevice,
            vec![
                json!({"id": "device-1", "user_id": ALICE, "device_name": "ThinkPad", "platform": "linux", "last_seen_at": TS}),
                json!({"id": "device-2", "user_id": ALICE, "device_name": "Pixel", "platform": "android", "last_seen_at": null}),
            ],
        ),
        (
            EntityKind::Contact,
            vec![json!({"id": "contact-1", "client_id": "client-acme", "name": "Wile E.", "email": null, "phone": "555-0100"})],
        ),
        (
            EntityKind::Kpi,
            vec![json!({"id": "kpi-uptime", "name": "Uptime", "department_id": PLATFORM, "target_value": 99.9, "unit": "%"})],
        ),
        (
            EntityKind::Project,
            vec![json!({
                "id": APOLLO, "name": "Apollo", "client_id": "client-acme", "owner_id": ALICE,
                "department_id": ENGINEERING, "status": "active", "started_at": TS
            })],
        ),
        (
            EntityKind::Milestone,
            vec![json!({"id": "ms-1", "project_id": APOLLO, "title": "Beta", "due_date": TS, "completed": false})],
        ),
        (
            EntityKind::ProcessInstance,
            vec![json!({
                "id": "proc-1", "workflow_id": ONBOARDING, "project_id": null, "started_by": ALICE,
                "current_step_id": "step-2", "status": "running", "started_at": TS
            })],
        ),
        (
            EntityKind::Task,
            vec![
                task(TASK_PARENT, ALICE, None),
                task(TASK_CHILD, BOB, Some(TASK_PARENT)),
                task("task-3", CAROL, None),
            ],
        ),
        (
            EntityKind::TaskComment,
            vec![
                json!({"id": "comment-1", "task_id": TASK_PARENT, "author_id": BOB, "body": "On it", "created_at": TS}),
                json!({"id": "comment-2", "task_id": TASK_PARENT, "author_id": null, "body": "Bump", "created_at": TS}),
                json!({"id": "comment-3", "task_id": TASK_CHILD, "author_id": ALICE, "body": "Done?", "created_at": TS}),
            ],
        ),
        (
            EntityKind::TaskAttachment,
            vec![json!({
                "id": "attachment-1", "task_id": TASK_CHILD, "file_name": "spec.pdf",
                "file_key": "files/spec.pdf", "uploaded_by": BOB, "uploaded_at": TS
            })],
        ),
        (
            EntityKind::Incident,
            vec![incident(INCIDENT, Some(APOLLO), Some(CAROL))],
        ),
        (
            EntityKind::IncidentUpdate,
            vec![json!({"id": "update-1", "incident_id": INCIDENT, "author_id": ALICE, "body": "Mitigated", "created_at": TS})],
        ),
        (
            EntityKind::Audit,
            vec![json!({"id": "audit-1", "title": "ISO", "project_id": APOLLO, "auditor_id": CAROL, "scheduled_for": null})],
        ),
        (
            EntityKind::AuditFinding,
            vec![json!({
                "id": "finding-1", "audit_id": "audit-1", "severity": "low",
                "description": "Missing runbook", "linked_incident_id": INCIDENT
            })],
        ),
        (
            EntityKind::KpiMeasurement,
            vec![
                json!({"id": "measure-1", "kpi_id": "kpi-uptime", "value": 99.5, "measured_at": TS, "recorded_by": BOB}),
                json!({"id": "measure-2", "kpi_id": "kpi-uptime", "value": 100.0, "measured_at": TS, "recorded_by": null}),
            ],
        ),
        (
            EntityKind::Document,
            vec![json!({"id": "doc-1", "title": "Runbook", "file_key": "docs/runbook.md", "owner_id": ALICE, "project_id": APOLLO, "created_at": TS})],
        ),
        (
            EntityKind::CalendarEvent,
            vec![json!({"id": "event-1", "title": "Kickoff", "starts_at": TS, "ends_at": null, "organizer_id": ALICE, "project_id": APOLLO})],
        ),
        (
            EntityKind::Notification,
            vec![
                json!({"id": "notif-1", "user_id": BOB, "message": "Assigned", "read": false, "created_at": TS}),
                json!({"id": "notif-2", "user_id": CAROL, "message": "Mentioned", "read": true, "created_at": TS}),
                json!({"id": "notif-3", "user_id": ALICE, "message": "Reminder", "read": false, "created_at": TS}),
            ],
        ),
        (
            EntityKind::ActivityLog,
            vec![json!({"id": "log-1", "actor_id": ALICE, "entity_type": "task", "entity_id": TASK_PARENT, "action": "created", "created_at": TS})],
        ),
        (
            EntityKind::UserRole,
            vec![json!({"user_id": ALICE, "role_id": "role-admin", "assigned_at": TS})],
        ),
        (
            EntityKind::RolePermission,
            vec![
                json!({"role_id": "role-admin", "permission_id": "perm-read"}),
                json!({"role_id": "role-admin", "permission_id": "perm-write"}),
            ],
        ),
        (
            EntityKind::UserPermission,
            vec![json!({"user_id": BOB, "permission_id": "perm-read", "granted_by": ALICE})],
        ),
        (
            EntityKind::ProjectMember,
            vec![
                json!({"project_id": APOLLO, "user_id": ALICE, "role_label": "lead"}),
                json!({"project_id": APOLLO, "user_id": BOB, "role_label": null}),
            ],
        ),
        (
            EntityKind::TaskTag,
            vec![json!({"task_id": TASK_PARENT, "tag_id": "tag-urgent"})],
        ),
        (
            EntityKind::IncidentTag,
            vec![json!({"incident_id": INCIDENT, "tag_id": "tag-infra"})],
        ),
        (
            EntityKind::EventAttendee,
            vec![json!({"event_id": "event-1", "user_id": BOB, "response": "accepted"})],
        ),
    ]
}

/// Fill the store with [`seed_rows`] and close the department/user cycle
pub async fn seed_store(db: &TestDatabase) -> Result<()> {
    for (kind, rows) in seed_rows() {
        db.insert(kind, rows).await?;
    }

    let mut tx = db.database().begin().await?;
    tx.departments()
        .set_field(ids::ENGINEERING, "head_user_id", &json!(ids::ALICE))
        .await?;
    tx.commit().await
}

/// Artifact holding exactly `collections`, counts taken from their lengths
pub fn artifact_with(collections: Vec<(EntityKind, Vec<Value>)>) -> SnapshotArtifact {
    let captured_at = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let mut artifact = SnapshotArtifact::new(captured_at);
    for (kind, records) in collections {
        artifact.insert_collection(kind, records);
    }
    artifact
}

/// Order-independent view of artifact data for set comparison
pub fn normalized(artifact: &SnapshotArtifact) -> BTreeMap<String, Vec<String>> {
    artifact
        .data
        .iter()
        .map(|(key, records)| {
            let mut rows: Vec<String> = records.iter().map(Value::to_string).collect();
            rows.sort();
            (key.clone(), rows)
        })
        .collect()
}

/// Drain a progress stream until the sender side is dropped
pub async fn collect_events(mut rx: UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

/// Percentages never decrease across a stream
pub fn assert_monotonic(events: &[ProgressEvent]) {
    for pair in events.windows(2) {
        assert!(
            pair[0].progress <= pair[1].progress,
            "progress went from {} ({}) to {} ({})",
            pair[0].progress,
            pair[0].message,
            pair[1].progress,
            pair[1].message
        );
    }
}

/// Unwrap a `json!` object literal into a store record
pub fn record(value: Value) -> tracker::database::Record {
    match value {
        Value::Object(map) => map,
        other => panic!("fixture {} is not an object", other),
    }
}
