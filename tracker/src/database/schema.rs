//! Static schema catalog for the operational store.
//!
//! Every entity type of the tracker is described once here: its table, the
//! shape of its identity, its fields (type, nullability, uniqueness, foreign
//! key target) and how the backup engine treats it (conflict policy, fetch
//! mode, embedded children). DDL, generic SQL and record transforms are all
//! derived from these definitions.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Permission,
    Role,
    Location,
    Department,
    Tag,
    Setting,
    Client,
    Workflow,
    WorkflowStep,
    User,
    UserDevice,
    Contact,
    Kpi,
    Project,
    Milestone,
    ProcessInstance,
    Task,
    TaskComment,
    TaskAttachment,
    Incident,
    IncidentUpdate,
    Audit,
    AuditFinding,
    KpiMeasurement,
    Document,
    CalendarEvent,
    Notification,
    ActivityLog,
    UserRole,
    RolePermission,
    UserPermission,
    ProjectMember,
    TaskTag,
    IncidentTag,
    EventAttendee,
}

impl EntityKind {
    pub const ALL: [EntityKind; 35] = [
        EntityKind::Permission,
        EntityKind::Role,
        EntityKind::Location,
        EntityKind::Department,
        EntityKind::Tag,
        EntityKind::Setting,
        EntityKind::Client,
        EntityKind::Workflow,
        EntityKind::WorkflowStep,
        EntityKind::User,
        EntityKind::UserDevice,
        EntityKind::Contact,
        EntityKind::Kpi,
        EntityKind::Project,
        EntityKind::Milestone,
        EntityKind::ProcessInstance,
        EntityKind::Task,
        EntityKind::TaskComment,
        EntityKind::TaskAttachment,
        EntityKind::Incident,
        EntityKind::IncidentUpdate,
        EntityKind::Audit,
        EntityKind::AuditFinding,
        EntityKind::KpiMeasurement,
        EntityKind::Document,
        EntityKind::CalendarEvent,
        EntityKind::Notification,
        EntityKind::ActivityLog,
        EntityKind::UserRole,
        EntityKind::RolePermission,
        EntityKind::UserPermission,
        EntityKind::ProjectMember,
        EntityKind::TaskTag,
        EntityKind::IncidentTag,
        EntityKind::EventAttendee,
    ];

    pub fn def(self) -> &'static EntityDef {
        match self {
            EntityKind::Permission => &PERMISSIONS,
            EntityKind::Role => &ROLES,
            EntityKind::Location => &LOCATIONS,
            EntityKind::Department => &DEPARTMENTS,
            EntityKind::Tag => &TAGS,
            EntityKind::Setting => &SETTINGS,
            EntityKind::Client => &CLIENTS,
            EntityKind::Workflow => &WORKFLOWS,
            EntityKind::WorkflowStep => &WORKFLOW_STEPS,
            EntityKind::User => &USERS,
            EntityKind::UserDevice => &USER_DEVICES,
            EntityKind::Contact => &CONTACTS,
            EntityKind::Kpi => &KPIS,
            EntityKind::Project => &PROJECTS,
            EntityKind::Milestone => &MILESTONES,
            EntityKind::ProcessInstance => &PROCESS_INSTANCES,
            EntityKind::Task => &TASKS,
            EntityKind::TaskComment => &TASK_COMMENTS,
            EntityKind::TaskAttachment => &TASK_ATTACHMENTS,
            EntityKind::Incident => &INCIDENTS,
            EntityKind::IncidentUpdate => &INCIDENT_UPDATES,
            EntityKind::Audit => &AUDITS,
            EntityKind::AuditFinding => &AUDIT_FINDINGS,
            EntityKind::KpiMeasurement => &KPI_MEASUREMENTS,
            EntityKind::Document => &DOCUMENTS,
            EntityKind::CalendarEvent => &CALENDAR_EVENTS,
            EntityKind::Notification => &NOTIFICATIONS,
            EntityKind::ActivityLog => &ACTIVITY_LOGS,
            EntityKind::UserRole => &USER_ROLES,
            EntityKind::RolePermission => &ROLE_PERMISSIONS,
            EntityKind::UserPermission => &USER_PERMISSIONS,
            EntityKind::ProjectMember => &PROJECT_MEMBERS,
            EntityKind::TaskTag => &TASK_TAGS,
            EntityKind::IncidentTag => &INCIDENT_TAGS,
            EntityKind::EventAttendee => &EVENT_ATTENDEES,
        }
    }

    /// Table name, also used as the artifact collection key
    pub fn table(self) -> &'static str {
        self.def().table
    }

    /// Resolve an artifact collection key back to its entity type
    pub fn from_key(key: &str) -> Option<EntityKind> {
        Self::ALL.into_iter().find(|kind| kind.table() == key)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Integer,
    Real,
    Boolean,
    /// RFC 3339 string
    Timestamp,
}

impl FieldType {
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldType::Text | FieldType::Timestamp => "TEXT",
            FieldType::Integer => "INTEGER",
            FieldType::Real => "REAL",
            FieldType::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    pub target: EntityKind,
    /// Created without the reference, patched in once the target exists
    pub deferred: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub unique: bool,
    pub reference: Option<Reference>,
}

impl FieldDef {
    const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: false,
            unique: false,
            reference: None,
        }
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldType::Text)
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub const fn real(name: &'static str) -> Self {
        Self::new(name, FieldType::Real)
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldType::Boolean)
    }

    pub const fn timestamp(name: &'static str) -> Self {
        Self::new(name, FieldType::Timestamp)
    }

    pub const fn reference(name: &'static str, target: EntityKind) -> Self {
        let mut field = Self::new(name, FieldType::Text);
        field.reference = Some(Reference {
            target,
            deferred: false,
        });
        field
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn deferred(mut self) -> Self {
        if let Some(reference) = self.reference {
            self.reference = Some(Reference {
                target: reference.target,
                deferred: true,
            });
        }
        self
    }

    pub fn is_deferred(&self) -> bool {
        self.reference.map(|r| r.deferred).unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    /// `id TEXT PRIMARY KEY`
    Id,
    /// Junction keyed by its two endpoint columns
    Compound {
        left: &'static str,
        right: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictPolicy {
    CreateOnly,
    UpsertByIdentity,
    UpsertByCompoundKey,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Single,
    Paged,
}

/// Child collection captured nested inside its parent record
#[derive(Debug, Clone, Copy)]
pub struct ChildLink {
    pub kind: EntityKind,
    pub field: &'static str,
}

#[derive(Debug, Clone, Copy)]
pub struct ParentLink {
    pub kind: EntityKind,
    pub fk: &'static str,
}

#[derive(Debug)]
pub struct EntityDef {
    pub kind: EntityKind,
    pub table: &'static str,
    pub identity: Identity,
    pub fields: &'static [FieldDef],
    pub policy: ConflictPolicy,
    pub fetch: FetchMode,
    pub children: Option<ChildLink>,
    pub parent: Option<ParentLink>,
}

impl EntityDef {
    pub fn is_junction(&self) -> bool {
        matches!(self.identity, Identity::Compound { .. })
    }

    pub fn is_embedded(&self) -> bool {
        self.parent.is_some()
    }

    pub fn field(&self, name: &str) -> Option<&'static FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Column list in storage order, `id` first for identity tables
    pub fn columns(&self) -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(self.fields.len() + 1);
        if self.identity == Identity::Id {
            columns.push("id");
        }
        columns.extend(self.fields.iter().map(|f| f.name));
        columns
    }

    pub fn references(&self) -> impl Iterator<Item = (&'static FieldDef, Reference)> {
        self.fields
            .iter()
            .filter_map(|f| f.reference.map(|r| (f, r)))
    }

    pub fn create_table_sql(&self) -> String {
        let mut lines = Vec::with_capacity(self.fields.len() + 2);
        if self.identity == Identity::Id {
            lines.push("id TEXT PRIMARY KEY".to_string());
        }
        for field in self.fields {
            let mut line = format!("{} {}", field.name, field.ty.sql_type());
            if field.required {
                line.push_str(" NOT NULL");
            }
            if field.unique {
                line.push_str(" UNIQUE");
            }
            if let Some(reference) = field.reference {
                line.push_str(&format!(" REFERENCES {}(id)", reference.target.table()));
            }
            lines.push(line);
        }
        if let Identity::Compound { left, right } = self.identity {
            lines.push(format!("PRIMARY KEY ({}, {})", left, right));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
            self.table,
            lines.join(",\n    ")
        )
    }

    pub fn index_sql(&self) -> Vec<String> {
        self.references()
            .map(|(field, _)| {
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
                    self.table, field.name, self.table, field.name
                )
            })
            .collect()
    }
}

// ============================================================================
// Access control and organisation
// ============================================================================

pub static PERMISSIONS: EntityDef = EntityDef {
    kind: EntityKind::Permission,
    table: "permissions",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("code").required().unique(),
        FieldDef::text("description"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static ROLES: EntityDef = EntityDef {
    kind: EntityKind::Role,
    table: "roles",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("name").required().unique(),
        FieldDef::text("description"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static LOCATIONS: EntityDef = EntityDef {
    kind: EntityKind::Location,
    table: "locations",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("name").required(),
        FieldDef::text("address"),
        FieldDef::text("timezone"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static DEPARTMENTS: EntityDef = EntityDef {
    kind: EntityKind::Department,
    table: "departments",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("name").required(),
        FieldDef::reference("parent_department_id", EntityKind::Department).deferred(),
        // departments and users reference each other
        FieldDef::reference("head_user_id", EntityKind::User).deferred(),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static TAGS: EntityDef = EntityDef {
    kind: EntityKind::Tag,
    table: "tags",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("name").required().unique(),
        FieldDef::text("color"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static SETTINGS: EntityDef = EntityDef {
    kind: EntityKind::Setting,
    table: "settings",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("key").required().unique(),
        FieldDef::text("value").required(),
        FieldDef::timestamp("updated_at"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static CLIENTS: EntityDef = EntityDef {
    kind: EntityKind::Client,
    table: "clients",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("name").required(),
        FieldDef::text("industry"),
        FieldDef::timestamp("created_at").required(),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

// ============================================================================
// Workflows and people
// ============================================================================

pub static WORKFLOWS: EntityDef = EntityDef {
    kind: EntityKind::Workflow,
    table: "workflows",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("name").required(),
        FieldDef::text("description"),
        FieldDef::boolean("active").required(),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: Some(ChildLink {
        kind: EntityKind::WorkflowStep,
        field: "steps",
    }),
    parent: None,
};

pub static WORKFLOW_STEPS: EntityDef = EntityDef {
    kind: EntityKind::WorkflowStep,
    table: "workflow_steps",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("workflow_id", EntityKind::Workflow).required(),
        FieldDef::integer("position").required(),
        FieldDef::text("name").required(),
        FieldDef::integer("sla_hours"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: Some(ParentLink {
        kind: EntityKind::Workflow,
        fk: "workflow_id",
    }),
};

pub static USERS: EntityDef = EntityDef {
    kind: EntityKind::User,
    table: "users",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("email").required().unique(),
        FieldDef::text("display_name").required(),
        FieldDef::reference("department_id", EntityKind::Department),
        FieldDef::reference("location_id", EntityKind::Location),
        FieldDef::reference("manager_id", EntityKind::User).deferred(),
        FieldDef::boolean("active").required(),
        FieldDef::timestamp("created_at").required(),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: Some(ChildLink {
        kind: EntityKind::UserDevice,
        field: "devices",
    }),
    parent: None,
};

pub static USER_DEVICES: EntityDef = EntityDef {
    kind: EntityKind::UserDevice,
    table: "user_devices",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("user_id", EntityKind::User).required(),
        FieldDef::text("device_name").required(),
        FieldDef::text("platform"),
        FieldDef::timestamp("last_seen_at"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: Some(ParentLink {
        kind: EntityKind::User,
        fk: "user_id",
    }),
};

pub static CONTACTS: EntityDef = EntityDef {
    kind: EntityKind::Contact,
    table: "contacts",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("client_id", EntityKind::Client).required(),
        FieldDef::text("name").required(),
        FieldDef::text("email"),
        FieldDef::text("phone"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static KPIS: EntityDef = EntityDef {
    kind: EntityKind::Kpi,
    table: "kpis",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("name").required(),
        FieldDef::reference("department_id", EntityKind::Department),
        FieldDef::real("target_value"),
        FieldDef::text("unit"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

// ============================================================================
// Projects, processes and tasks
// ============================================================================

pub static PROJECTS: EntityDef = EntityDef {
    kind: EntityKind::Project,
    table: "projects",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("name").required(),
        FieldDef::reference("client_id", EntityKind::Client),
        FieldDef::reference("owner_id", EntityKind::User),
        FieldDef::reference("department_id", EntityKind::Department),
        FieldDef::text("status").required(),
        FieldDef::timestamp("started_at"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static MILESTONES: EntityDef = EntityDef {
    kind: EntityKind::Milestone,
    table: "milestones",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("project_id", EntityKind::Project).required(),
        FieldDef::text("title").required(),
        FieldDef::timestamp("due_date"),
        FieldDef::boolean("completed").required(),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static PROCESS_INSTANCES: EntityDef = EntityDef {
    kind: EntityKind::ProcessInstance,
    table: "process_instances",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("workflow_id", EntityKind::Workflow).required(),
        FieldDef::reference("project_id", EntityKind::Project),
        FieldDef::reference("started_by", EntityKind::User),
        FieldDef::reference("current_step_id", EntityKind::WorkflowStep),
        FieldDef::text("status").required(),
        FieldDef::timestamp("started_at").required(),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static TASKS: EntityDef = EntityDef {
    kind: EntityKind::Task,
    table: "tasks",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("title").required(),
        FieldDef::reference("owner_id", EntityKind::User).required(),
        FieldDef::reference("project_id", EntityKind::Project),
        FieldDef::reference("milestone_id", EntityKind::Milestone),
        FieldDef::reference("process_instance_id", EntityKind::ProcessInstance),
        FieldDef::reference("parent_task_id", EntityKind::Task).deferred(),
        FieldDef::text("status").required(),
        FieldDef::integer("priority"),
        FieldDef::timestamp("due_date"),
        FieldDef::timestamp("created_at").required(),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Paged,
    children: None,
    parent: None,
};

pub static TASK_COMMENTS: EntityDef = EntityDef {
    kind: EntityKind::TaskComment,
    table: "task_comments",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("task_id", EntityKind::Task).required(),
        FieldDef::reference("author_id", EntityKind::User),
        FieldDef::text("body").required(),
        FieldDef::timestamp("created_at").required(),
    ],
    policy: ConflictPolicy::CreateOnly,
    fetch: FetchMode::Paged,
    children: None,
    parent: None,
};

pub static TASK_ATTACHMENTS: EntityDef = EntityDef {
    kind: EntityKind::TaskAttachment,
    table: "task_attachments",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("task_id", EntityKind::Task).required(),
        FieldDef::text("file_name").required(),
        FieldDef::text("file_key").required(),
        FieldDef::reference("uploaded_by", EntityKind::User),
        FieldDef::timestamp("uploaded_at").required(),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

// ============================================================================
// Incidents, audits and measurements
// ============================================================================

pub static INCIDENTS: EntityDef = EntityDef {
    kind: EntityKind::Incident,
    table: "incidents",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("title").required(),
        FieldDef::text("severity").required(),
        FieldDef::text("status").required(),
        FieldDef::reference("project_id", EntityKind::Project),
        FieldDef::reference("reported_by", EntityKind::User),
        FieldDef::reference("assigned_to", EntityKind::User),
        FieldDef::timestamp("occurred_at").required(),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static INCIDENT_UPDATES: EntityDef = EntityDef {
    kind: EntityKind::IncidentUpdate,
    table: "incident_updates",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("incident_id", EntityKind::Incident).required(),
        FieldDef::reference("author_id", EntityKind::User),
        FieldDef::text("body").required(),
        FieldDef::timestamp("created_at").required(),
    ],
    policy: ConflictPolicy::CreateOnly,
    fetch: FetchMode::Paged,
    children: None,
    parent: None,
};

pub static AUDITS: EntityDef = EntityDef {
    kind: EntityKind::Audit,
    table: "audits",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("title").required(),
        FieldDef::reference("project_id", EntityKind::Project),
        FieldDef::reference("auditor_id", EntityKind::User),
        FieldDef::timestamp("scheduled_for"),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static AUDIT_FINDINGS: EntityDef = EntityDef {
    kind: EntityKind::AuditFinding,
    table: "audit_findings",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("audit_id", EntityKind::Audit).required(),
        FieldDef::text("severity").required(),
        FieldDef::text("description").required(),
        FieldDef::reference("linked_incident_id", EntityKind::Incident),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static KPI_MEASUREMENTS: EntityDef = EntityDef {
    kind: EntityKind::KpiMeasurement,
    table: "kpi_measurements",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("kpi_id", EntityKind::Kpi).required(),
        FieldDef::real("value").required(),
        FieldDef::timestamp("measured_at").required(),
        FieldDef::reference("recorded_by", EntityKind::User),
    ],
    policy: ConflictPolicy::CreateOnly,
    fetch: FetchMode::Paged,
    children: None,
    parent: None,
};

pub static DOCUMENTS: EntityDef = EntityDef {
    kind: EntityKind::Document,
    table: "documents",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("title").required(),
        FieldDef::text("file_key").required(),
        FieldDef::reference("owner_id", EntityKind::User),
        FieldDef::reference("project_id", EntityKind::Project),
        FieldDef::timestamp("created_at").required(),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static CALENDAR_EVENTS: EntityDef = EntityDef {
    kind: EntityKind::CalendarEvent,
    table: "calendar_events",
    identity: Identity::Id,
    fields: &[
        FieldDef::text("title").required(),
        FieldDef::timestamp("starts_at").required(),
        FieldDef::timestamp("ends_at"),
        FieldDef::reference("organizer_id", EntityKind::User),
        FieldDef::reference("project_id", EntityKind::Project),
    ],
    policy: ConflictPolicy::UpsertByIdentity,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static NOTIFICATIONS: EntityDef = EntityDef {
    kind: EntityKind::Notification,
    table: "notifications",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("user_id", EntityKind::User).required(),
        FieldDef::text("message").required(),
        FieldDef::boolean("read").required(),
        FieldDef::timestamp("created_at").required(),
    ],
    policy: ConflictPolicy::CreateOnly,
    fetch: FetchMode::Paged,
    children: None,
    parent: None,
};

pub static ACTIVITY_LOGS: EntityDef = EntityDef {
    kind: EntityKind::ActivityLog,
    table: "activity_logs",
    identity: Identity::Id,
    fields: &[
        FieldDef::reference("actor_id", EntityKind::User),
        FieldDef::text("entity_type").required(),
        FieldDef::text("entity_id").required(),
        FieldDef::text("action").required(),
        FieldDef::timestamp("created_at").required(),
    ],
    policy: ConflictPolicy::CreateOnly,
    fetch: FetchMode::Paged,
    children: None,
    parent: None,
};

// ============================================================================
// Junctions
// ============================================================================

pub static USER_ROLES: EntityDef = EntityDef {
    kind: EntityKind::UserRole,
    table: "user_roles",
    identity: Identity::Compound {
        left: "user_id",
        right: "role_id",
    },
    fields: &[
        FieldDef::reference("user_id", EntityKind::User).required(),
        FieldDef::reference("role_id", EntityKind::Role).required(),
        FieldDef::timestamp("assigned_at"),
    ],
    policy: ConflictPolicy::UpsertByCompoundKey,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static ROLE_PERMISSIONS: EntityDef = EntityDef {
    kind: EntityKind::RolePermission,
    table: "role_permissions",
    identity: Identity::Compound {
        left: "role_id",
        right: "permission_id",
    },
    fields: &[
        FieldDef::reference("role_id", EntityKind::Role).required(),
        FieldDef::reference("permission_id", EntityKind::Permission).required(),
    ],
    policy: ConflictPolicy::UpsertByCompoundKey,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static USER_PERMISSIONS: EntityDef = EntityDef {
    kind: EntityKind::UserPermission,
    table: "user_permissions",
    identity: Identity::Compound {
        left: "user_id",
        right: "permission_id",
    },
    fields: &[
        FieldDef::reference("user_id", EntityKind::User).required(),
        FieldDef::reference("permission_id", EntityKind::Permission).required(),
        FieldDef::reference("granted_by", EntityKind::User),
    ],
    policy: ConflictPolicy::UpsertByCompoundKey,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static PROJECT_MEMBERS: EntityDef = EntityDef {
    kind: EntityKind::ProjectMember,
    table: "project_members",
    identity: Identity::Compound {
        left: "project_id",
        right: "user_id",
    },
    fields: &[
        FieldDef::reference("project_id", EntityKind::Project).required(),
        FieldDef::reference("user_id", EntityKind::User).required(),
        FieldDef::text("role_label"),
    ],
    policy: ConflictPolicy::UpsertByCompoundKey,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static TASK_TAGS: EntityDef = EntityDef {
    kind: EntityKind::TaskTag,
    table: "task_tags",
    identity: Identity::Compound {
        left: "task_id",
        right: "tag_id",
    },
    fields: &[
        FieldDef::reference("task_id", EntityKind::Task).required(),
        FieldDef::reference("tag_id", EntityKind::Tag).required(),
    ],
    policy: ConflictPolicy::UpsertByCompoundKey,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static INCIDENT_TAGS: EntityDef = EntityDef {
    kind: EntityKind::IncidentTag,
    table: "incident_tags",
    identity: Identity::Compound {
        left: "incident_id",
        right: "tag_id",
    },
    fields: &[
        FieldDef::reference("incident_id", EntityKind::Incident).required(),
        FieldDef::reference("tag_id", EntityKind::Tag).required(),
    ],
    policy: ConflictPolicy::UpsertByCompoundKey,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

pub static EVENT_ATTENDEES: EntityDef = EntityDef {
    kind: EntityKind::EventAttendee,
    table: "event_attendees",
    identity: Identity::Compound {
        left: "event_id",
        right: "user_id",
    },
    fields: &[
        FieldDef::reference("event_id", EntityKind::CalendarEvent).required(),
        FieldDef::reference("user_id", EntityKind::User).required(),
        FieldDef::text("response"),
    ],
    policy: ConflictPolicy::UpsertByCompoundKey,
    fetch: FetchMode::Single,
    children: None,
    parent: None,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_maps_to_its_own_definition() {
        for kind in EntityKind::ALL {
            assert_eq!(kind.def().kind, kind, "definition mismatch for {}", kind);
            assert_eq!(EntityKind::from_key(kind.table()), Some(kind));
        }
    }

    #[test]
    fn test_junction_identity_columns_are_required_references() {
        for kind in EntityKind::ALL {
            let def = kind.def();
            if let Identity::Compound { left, right } = def.identity {
                for column in [left, right] {
                    let field = def.field(column).expect("endpoint column defined");
                    assert!(field.required, "{}.{} must be required", def.table, column);
                    assert!(field.reference.is_some());
                }
            }
        }
    }

    #[test]
    fn test_embedded_children_point_back_to_parent() {
        for kind in EntityKind::ALL {
            if let Some(child) = kind.def().children {
                let parent = child.kind.def().parent.expect("child declares parent");
                assert_eq!(parent.kind, kind);
                assert!(child.kind.def().field(parent.fk).is_some());
            }
        }
    }

    #[test]
    fn test_create_table_sql_for_junction() {
        let sql = USER_PERMISSIONS.create_table_sql();
        assert!(sql.contains("PRIMARY KEY (user_id, permission_id)"));
        assert!(sql.contains("granted_by TEXT REFERENCES users(id)"));
        assert!(!sql.contains("id TEXT PRIMARY KEY"));
    }

    #[test]
    fn test_unknown_collection_key() {
        assert_eq!(EntityKind::from_key("backup_catalog"), None);
    }
}
