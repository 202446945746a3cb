//! Generic store access driven by the schema catalog.
//!
//! A [`Collection`] is a short-lived handle on one entity table over a
//! borrowed connection. It is used both from pooled connections (snapshot
//! fetches) and from inside a restore transaction via [`StoreTx`].

use anyhow::Result;
use serde_json::{Map, Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::collections::HashSet;
use tracing::debug;

use super::schema::{ConflictPolicy, EntityDef, EntityKind, FieldType, Identity};
use crate::constants::restore::ID_LOOKUP_CHUNK;

/// One entity row as a JSON object keyed by column name
pub type Record = Map<String, Value>;

#[derive(Debug, Clone)]
pub enum Filter {
    All,
    Eq(&'static str, Value),
}

#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: u32,
    pub offset: u64,
}

pub struct Collection<'c> {
    conn: &'c mut SqliteConnection,
    def: &'static EntityDef,
}

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

impl<'c> Collection<'c> {
    pub fn new(conn: &'c mut SqliteConnection, kind: EntityKind) -> Self {
        Self {
            conn,
            def: kind.def(),
        }
    }

    pub async fn find_many(&mut self, filter: &Filter, page: Option<Page>) -> Result<Vec<Record>> {
        let (where_sql, params) = where_clause(filter);
        let mut sql = format!(
            "SELECT {} FROM {}{} ORDER BY rowid",
            self.def.columns().join(", "),
            self.def.table,
            where_sql
        );
        if let Some(page) = page {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", page.limit, page.offset));
        }

        let mut query = sqlx::query(&sql);
        for value in params {
            query = bind_value(query, value);
        }
        let rows = query.fetch_all(&mut *self.conn).await?;

        rows.iter().map(|row| decode_row(self.def, row)).collect()
    }

    /// Fetch a single record by its `id`
    pub async fn find_by_id(&mut self, id: &str) -> Result<Option<Record>> {
        let mut records = self
            .find_many(&Filter::Eq("id", Value::String(id.to_string())), None)
            .await?;
        Ok(records.pop())
    }

    pub async fn count(&mut self) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) as count FROM {}", self.def.table);
        let row = sqlx::query(&sql).fetch_one(&mut *self.conn).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as u64)
    }

    /// Plain insert; a conflicting identity surfaces as a unique violation
    pub async fn create(&mut self, record: &Record) -> sqlx::Result<()> {
        let columns = self.def.columns();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.def.table,
            columns.join(", "),
            placeholders(columns.len())
        );
        self.execute_with_record(&sql, &columns, record).await
    }

    /// Insert or update on the identity conflict target
    pub async fn upsert(&mut self, record: &Record) -> sqlx::Result<()> {
        let columns = self.def.columns();
        let key: Vec<&str> = match self.def.identity {
            Identity::Id => vec!["id"],
            Identity::Compound { left, right } => vec![left, right],
        };
        let updates: Vec<String> = columns
            .iter()
            .filter(|column| !key.contains(*column))
            .map(|column| format!("{} = excluded.{}", column, column))
            .collect();
        let conflict_action = if updates.is_empty() {
            "DO NOTHING".to_string()
        } else {
            format!("DO UPDATE SET {}", updates.join(", "))
        };
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT({}) {}",
            self.def.table,
            columns.join(", "),
            placeholders(columns.len()),
            key.join(", "),
            conflict_action
        );
        self.execute_with_record(&sql, &columns, record).await
    }

    pub async fn write(&mut self, record: &Record, policy: ConflictPolicy) -> sqlx::Result<()> {
        match policy {
            ConflictPolicy::CreateOnly => self.create(record).await,
            ConflictPolicy::UpsertByIdentity | ConflictPolicy::UpsertByCompoundKey => {
                self.upsert(record).await
            }
        }
    }

    /// Whether a row with the record's identity is present
    pub async fn exists(&mut self, record: &Record) -> Result<bool> {
        let (sql, values) = match self.def.identity {
            Identity::Id => (
                format!("SELECT 1 FROM {} WHERE id = ?", self.def.table),
                vec![record.get("id").cloned().unwrap_or(Value::Null)],
            ),
            Identity::Compound { left, right } => (
                format!(
                    "SELECT 1 FROM {} WHERE {} = ? AND {} = ?",
                    self.def.table, left, right
                ),
                vec![
                    record.get(left).cloned().unwrap_or(Value::Null),
                    record.get(right).cloned().unwrap_or(Value::Null),
                ],
            ),
        };
        let mut query = sqlx::query(&sql);
        for value in values {
            query = bind_value(query, value);
        }
        Ok(query.fetch_optional(&mut *self.conn).await?.is_some())
    }

    /// Subset of `ids` present in this table, looked up in bounded chunks
    pub async fn existing_ids(&mut self, ids: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        for chunk in ids.chunks(ID_LOOKUP_CHUNK) {
            let sql = format!(
                "SELECT id FROM {} WHERE id IN ({})",
                self.def.table,
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id.clone());
            }
            for row in query.fetch_all(&mut *self.conn).await? {
                found.insert(row.try_get::<String, _>("id")?);
            }
        }
        Ok(found)
    }

    pub async fn set_field(&mut self, id: &str, field: &str, value: &Value) -> sqlx::Result<u64> {
        let sql = format!("UPDATE {} SET {} = ? WHERE id = ?", self.def.table, field);
        let query = bind_value(sqlx::query(&sql), value.clone()).bind(id.to_string());
        Ok(query.execute(&mut *self.conn).await?.rows_affected())
    }

    pub async fn delete_many(&mut self, filter: &Filter) -> Result<u64> {
        let (where_sql, params) = where_clause(filter);
        let sql = format!("DELETE FROM {}{}", self.def.table, where_sql);
        let mut query = sqlx::query(&sql);
        for value in params {
            query = bind_value(query, value);
        }
        let affected = query.execute(&mut *self.conn).await?.rows_affected();
        debug!("Deleted {} rows from {}", affected, self.def.table);
        Ok(affected)
    }

    /// Null out nullable foreign keys; with `deferred_only` just the
    /// back-reference columns that break dependency cycles.
    pub async fn detach_references(&mut self, deferred_only: bool) -> Result<u64> {
        let columns: Vec<&str> = self
            .def
            .references()
            .filter(|(field, reference)| !field.required && (reference.deferred || !deferred_only))
            .map(|(field, _)| field.name)
            .collect();
        if columns.is_empty() {
            return Ok(0);
        }

        let assignments: Vec<String> = columns.iter().map(|c| format!("{} = NULL", c)).collect();
        let predicate: Vec<String> = columns
            .iter()
            .map(|c| format!("{} IS NOT NULL", c))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {}",
            self.def.table,
            assignments.join(", "),
            predicate.join(" OR ")
        );
        let affected = sqlx::query(&sql)
            .execute(&mut *self.conn)
            .await?
            .rows_affected();
        Ok(affected)
    }

    async fn execute_with_record(
        &mut self,
        sql: &str,
        columns: &[&'static str],
        record: &Record,
    ) -> sqlx::Result<()> {
        let mut query = sqlx::query(sql);
        for column in columns {
            query = bind_value(query, record.get(*column).cloned().unwrap_or(Value::Null));
        }
        query.execute(&mut *self.conn).await?;
        Ok(())
    }
}

/// Transaction-scoped store handle with one accessor per entity type
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub(crate) fn new(tx: Transaction<'static, Sqlite>) -> Self {
        Self { tx }
    }

    pub fn collection(&mut self, kind: EntityKind) -> Collection<'_> {
        Collection::new(&mut *self.tx, kind)
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn rollback(self) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

macro_rules! entity_accessors {
    ($($name:ident => $kind:ident),* $(,)?) => {
        impl StoreTx {
            $(
                pub fn $name(&mut self) -> Collection<'_> {
                    self.collection(EntityKind::$kind)
                }
            )*
        }
    };
}

entity_accessors! {
    permissions => Permission,
    roles => Role,
    locations => Location,
    departments => Department,
    tags => Tag,
    settings => Setting,
    clients => Client,
    workflows => Workflow,
    workflow_steps => WorkflowStep,
    users => User,
    user_devices => UserDevice,
    contacts => Contact,
    kpis => Kpi,
    projects => Project,
    milestones => Milestone,
    process_instances => ProcessInstance,
    tasks => Task,
    task_comments => TaskComment,
    task_attachments => TaskAttachment,
    incidents => Incident,
    incident_updates => IncidentUpdate,
    audits => Audit,
    audit_findings => AuditFinding,
    kpi_measurements => KpiMeasurement,
    documents => Document,
    calendar_events => CalendarEvent,
    notifications => Notification,
    activity_logs => ActivityLog,
    user_roles => UserRole,
    role_permissions => RolePermission,
    user_permissions => UserPermission,
    project_members => ProjectMember,
    task_tags => TaskTag,
    incident_tags => IncidentTag,
    event_attendees => EventAttendee,
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn where_clause(filter: &Filter) -> (String, Vec<Value>) {
    match filter {
        Filter::All => (String::new(), Vec::new()),
        Filter::Eq(field, value) => (format!(" WHERE {} = ?", field), vec![value.clone()]),
    }
}

fn bind_value(query: SqliteQuery<'_>, value: Value) -> SqliteQuery<'_> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => query.bind(i),
            None => query.bind(n.as_f64()),
        },
        Value::String(s) => query.bind(s),
        other => query.bind(other.to_string()),
    }
}

fn decode_row(def: &EntityDef, row: &SqliteRow) -> Result<Record> {
    let mut record = Record::new();
    if def.identity == Identity::Id {
        let id: String = row.try_get("id")?;
        record.insert("id".to_string(), Value::String(id));
    }
    for field in def.fields {
        let value = match field.ty {
            FieldType::Text | FieldType::Timestamp => row
                .try_get::<Option<String>, _>(field.name)?
                .map(Value::String),
            FieldType::Integer => decode_integer(row, field.name)?,
            FieldType::Real => row
                .try_get::<Option<f64>, _>(field.name)?
                .and_then(Number::from_f64)
                .map(Value::Number),
            FieldType::Boolean => row.try_get::<Option<bool>, _>(field.name)?.map(Value::Bool),
        };
        record.insert(field.name.to_string(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

/// SQLite keeps each value's own storage class, so an INTEGER column may
/// still hold a REAL or TEXT value written by another client.
fn decode_integer(row: &SqliteRow, column: &str) -> Result<Option<Value>> {
    match row.try_get::<Option<i64>, _>(column) {
        Ok(value) => Ok(value.map(|i| Value::Number(i.into()))),
        Err(sqlx::Error::ColumnDecode { .. }) => {
            if let Ok(real) = row.try_get::<Option<f64>, _>(column) {
                return Ok(real.and_then(Number::from_f64).map(Value::Number));
            }
            Ok(row.try_get::<Option<String>, _>(column)?.map(Value::String))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_where_clause_variants() {
        assert_eq!(where_clause(&Filter::All).0, "");

        let (sql, params) = where_clause(&Filter::Eq("user_id", json!("u-1")));
        assert_eq!(sql, " WHERE user_id = ?");
        assert_eq!(params, vec![json!("u-1")]);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
