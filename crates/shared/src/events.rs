//! Audit event sink.
//!
//! Every mutating operation in the ledger and billing crates reports an
//! audit record here. The sink is deliberately best-effort: a failed insert
//! is logged at the call site and never rolls back the parent operation.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

/// Who performed an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    User,
    Admin,
    System,
}

impl ActorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorType::User => "user",
            ActorType::Admin => "admin",
            ActorType::System => "system",
        }
    }
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An audit record under construction.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: Option<Uuid>,
    pub actor_type: ActorType,
    pub action: String,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub before_state: Option<serde_json::Value>,
    pub after_state: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(action: &str, entity_type: &str, entity_id: Uuid) -> Self {
        Self {
            actor_id: None,
            actor_type: ActorType::System,
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            before_state: None,
            after_state: None,
        }
    }

    pub fn actor(mut self, actor_id: Uuid, actor_type: ActorType) -> Self {
        self.actor_id = Some(actor_id);
        self.actor_type = actor_type;
        self
    }

    /// Attach an actor when one is known; system attribution otherwise.
    pub fn actor_opt(mut self, actor_id: Option<Uuid>, actor_type: ActorType) -> Self {
        self.actor_id = actor_id;
        self.actor_type = actor_type;
        self
    }

    pub fn before(mut self, state: serde_json::Value) -> Self {
        self.before_state = Some(state);
        self
    }

    pub fn after(mut self, state: serde_json::Value) -> Self {
        self.after_state = Some(state);
        self
    }
}

/// Writes audit records to the `audit_events` table.
#[derive(Clone)]
pub struct AuditLogger {
    pool: PgPool,
}

impl AuditLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert one audit record.
    ///
    /// Callers wrap this in `if let Err(e) = ... { tracing::warn!(...) }` —
    /// the parent operation has already committed by the time this runs.
    pub async fn log_event(&self, event: AuditEvent) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO audit_events
                (actor_id, actor_type, action, entity_type, entity_id, before_state, after_state)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.actor_id)
        .bind(event.actor_type.as_str())
        .bind(&event.action)
        .bind(&event.entity_type)
        .bind(event.entity_id)
        .bind(&event.before_state)
        .bind(&event.after_state)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
