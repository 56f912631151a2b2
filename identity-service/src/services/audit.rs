//! Audit trail for tracked entity mutations.
//!
//! A unit of work describes its mutations as a [`ChangeSet`] of before/after
//! snapshots taken from the in-memory values it is about to persist. The
//! recorder runs the primary commit, resolves the acting principal from
//! [`RequestContext`], and writes the audit rows in a second, separate commit.

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::models::{AuditAction, AuditLog};
use crate::services::{IdentityStore, PrincipalContext, RequestContext, ServiceError};

/// An entity whose mutations are audited.
pub trait Auditable {
    fn entity_type(&self) -> &'static str;
    fn entity_id(&self) -> String;
    /// Snapshot of the fields that are audited, keyed by field name.
    fn audited_fields(&self) -> Map<String, Value>;
}

#[derive(Debug, Clone)]
struct Snapshot {
    entity_type: &'static str,
    entity_id: String,
    fields: Map<String, Value>,
}

impl Snapshot {
    fn of(entity: &dyn Auditable) -> Self {
        Self {
            entity_type: entity.entity_type(),
            entity_id: entity.entity_id(),
            fields: entity.audited_fields(),
        }
    }
}

#[derive(Debug, Clone)]
enum Change {
    Added(Snapshot),
    Modified { before: Snapshot, after: Snapshot },
    Deleted(Snapshot),
}

/// Tracked changes of one unit of work.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn added(mut self, entity: &dyn Auditable) -> Self {
        self.changes.push(Change::Added(Snapshot::of(entity)));
        self
    }

    pub fn modified(mut self, before: &dyn Auditable, after: &dyn Auditable) -> Self {
        self.changes.push(Change::Modified {
            before: Snapshot::of(before),
            after: Snapshot::of(after),
        });
        self
    }

    pub fn deleted(mut self, entity: &dyn Auditable) -> Self {
        self.changes.push(Change::Deleted(Snapshot::of(entity)));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Audit rows attributed to `actor`. Modifications record only differing
    /// fields and produce nothing when no audited field changed.
    pub fn to_audit_logs(&self, actor: &PrincipalContext) -> Vec<AuditLog> {
        self.changes
            .iter()
            .filter_map(|change| {
                let (action, snapshot, old_values, new_values) = match change {
                    Change::Added(s) => (
                        AuditAction::Create,
                        s,
                        None,
                        Some(Value::Object(s.fields.clone())),
                    ),
                    Change::Deleted(s) => (
                        AuditAction::Delete,
                        s,
                        Some(Value::Object(s.fields.clone())),
                        None,
                    ),
                    Change::Modified { before, after } => {
                        let (old, new) = diff(&before.fields, &after.fields);
                        if new.is_empty() && old.is_empty() {
                            return None;
                        }
                        (
                            AuditAction::Update,
                            after,
                            Some(Value::Object(old)),
                            Some(Value::Object(new)),
                        )
                    }
                };

                Some(AuditLog::new(
                    actor.principal_id,
                    action,
                    snapshot.entity_type,
                    snapshot.entity_id.clone(),
                    old_values,
                    new_values,
                    actor.ip_address.clone(),
                    actor.user_agent.clone(),
                ))
            })
            .collect()
    }
}

fn diff(before: &Map<String, Value>, after: &Map<String, Value>) -> (Map<String, Value>, Map<String, Value>) {
    let mut old = Map::new();
    let mut new = Map::new();
    for (field, after_value) in after {
        let before_value = before.get(field).unwrap_or(&Value::Null);
        if before_value != after_value {
            old.insert(field.clone(), before_value.clone());
            new.insert(field.clone(), after_value.clone());
        }
    }
    for (field, before_value) in before {
        if !after.contains_key(field) {
            old.insert(field.clone(), before_value.clone());
            new.insert(field.clone(), Value::Null);
        }
    }
    (old, new)
}

#[derive(Clone)]
pub struct AuditRecorder {
    store: Arc<dyn IdentityStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    /// Run `primary`, then append audit rows for `changes` in a second commit.
    ///
    /// The primary result is returned unchanged. Without an acting principal
    /// no rows are written; a failed audit commit is logged.
    pub async fn commit<T, F>(&self, changes: ChangeSet, primary: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, ServiceError>>,
    {
        let output = primary.await?;

        if changes.is_empty() {
            return Ok(output);
        }

        let Some(actor) = RequestContext::current() else {
            tracing::debug!("No acting principal in context; skipping audit");
            return Ok(output);
        };

        let logs = changes.to_audit_logs(&actor);
        if logs.is_empty() {
            return Ok(output);
        }

        if let Err(e) = self.store.append_audit_logs(&logs).await {
            tracing::error!(
                principal_id = %actor.principal_id,
                rows = logs.len(),
                error = %e,
                "Failed to write audit logs"
            );
        }

        Ok(output)
    }
}
