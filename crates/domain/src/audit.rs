use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use taskgate_core::UserId;
use uuid::Uuid;

/// Actor attribution used when no authenticated identity is available.
pub const ANONYMOUS_ACTOR_EMAIL: &str = "anonymous";

/// Audit action kinds.
///
/// Known kinds are closed variants; [`AuditAction::Other`] keeps the trail
/// forward-compatible with kinds that are not catalogued yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuditAction {
    /// Read-style access.
    Read,
    /// Resource creation.
    Create,
    /// Resource update.
    Update,
    /// Resource deletion.
    Delete,
    /// Successful sign-in.
    Login,
    /// Rejected sign-in.
    LoginFailed,
    /// Sign-out.
    Logout,
    /// Task submitted.
    Submit,
    /// Task completed.
    Complete,
    /// Task returned.
    Return,
    /// Administrative status override.
    Override,
    /// Role granted to a user.
    Grant,
    /// Role revoked from a user.
    Revoke,
    /// Uncatalogued action kind.
    Other(String),
}

impl AuditAction {
    /// Returns the stored action value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Read => "READ",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Login => "LOGIN",
            Self::LoginFailed => "LOGIN_FAILED",
            Self::Logout => "LOGOUT",
            Self::Submit => "SUBMIT",
            Self::Complete => "COMPLETE",
            Self::Return => "RETURN",
            Self::Override => "OVERRIDE",
            Self::Grant => "GRANT",
            Self::Revoke => "REVOKE",
            Self::Other(value) => value.as_str(),
        }
    }

    /// Returns the catalogued kinds for display filters.
    #[must_use]
    pub fn known() -> Vec<Self> {
        vec![
            Self::Read,
            Self::Create,
            Self::Update,
            Self::Delete,
            Self::Login,
            Self::LoginFailed,
            Self::Logout,
            Self::Submit,
            Self::Complete,
            Self::Return,
            Self::Override,
            Self::Grant,
            Self::Revoke,
        ]
    }

    /// Parses a stored value. Unknown values are preserved as [`AuditAction::Other`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        Self::known()
            .into_iter()
            .find(|known| known.as_str().eq_ignore_ascii_case(value))
            .unwrap_or_else(|| Self::Other(value.to_owned()))
    }

    /// Infers an action from a request method.
    #[must_use]
    pub fn from_method(method: &str) -> Option<Self> {
        match method.to_ascii_uppercase().as_str() {
            "GET" | "HEAD" | "OPTIONS" => Some(Self::Read),
            "POST" => Some(Self::Create),
            "PUT" | "PATCH" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }
}

impl Serialize for AuditAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditAction {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(value.as_str()))
    }
}

/// Audited entity kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuditEntityType {
    /// Task entity.
    Task,
    /// Message attached to a task.
    TaskMessage,
    /// Role entity.
    Role,
    /// User-role assignment.
    RoleAssignment,
    /// Catalog permission.
    Permission,
    /// User account.
    User,
    /// Company record owned by an external collaborator.
    Company,
    /// Client record owned by an external collaborator.
    Client,
    /// Authentication session.
    Session,
    /// The audit trail itself.
    AuditLog,
    /// Uncatalogued entity kind.
    Other(String),
}

impl AuditEntityType {
    /// Returns the stored entity type value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Task => "task",
            Self::TaskMessage => "task_message",
            Self::Role => "role",
            Self::RoleAssignment => "role_assignment",
            Self::Permission => "permission",
            Self::User => "user",
            Self::Company => "company",
            Self::Client => "client",
            Self::Session => "session",
            Self::AuditLog => "audit_log",
            Self::Other(value) => value.as_str(),
        }
    }

    /// Returns the catalogued kinds for display filters.
    #[must_use]
    pub fn known() -> Vec<Self> {
        vec![
            Self::Task,
            Self::TaskMessage,
            Self::Role,
            Self::RoleAssignment,
            Self::Permission,
            Self::User,
            Self::Company,
            Self::Client,
            Self::Session,
            Self::AuditLog,
        ]
    }

    /// Parses a stored value. Unknown values are preserved as [`AuditEntityType::Other`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        Self::known()
            .into_iter()
            .find(|known| known.as_str() == value)
            .unwrap_or_else(|| Self::Other(value.to_owned()))
    }

    /// Infers an entity type from a path segment by stripping one trailing `s`.
    ///
    /// Naive on purpose: `companies` becomes `companie`. Call sites where this is
    /// wrong should configure the entity type explicitly.
    #[must_use]
    pub fn from_path_segment(segment: &str) -> Self {
        let segment = segment.trim().to_ascii_lowercase();
        let singular = segment.strip_suffix('s').unwrap_or(segment.as_str());
        Self::parse(singular)
    }
}

impl Serialize for AuditEntityType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditEntityType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(value.as_str()))
    }
}

/// Outcome classification of an audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// 2xx outcome.
    Success,
    /// 4xx outcome, the operation was rejected.
    Failed,
    /// Any other outcome.
    Error,
}

impl AuditStatus {
    /// Classifies a response status code.
    #[must_use]
    pub fn from_status_code(status_code: u16) -> Self {
        match status_code {
            200..=299 => Self::Success,
            400..=499 => Self::Failed,
            _ => Self::Error,
        }
    }

    /// Returns a stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }

    /// Parses a stored value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Opaque before/after snapshot attached to an audit record.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditChanges {
    /// State before the operation.
    pub before: Option<Value>,
    /// State after the operation.
    pub after: Option<Value>,
}

/// One changed top-level field computed at read time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    /// Field name, or `$` when the snapshots are not objects.
    pub field: String,
    /// Previous value.
    pub before: Option<Value>,
    /// New value.
    pub after: Option<Value>,
}

impl AuditChanges {
    /// Diffs the snapshots by top-level field.
    #[must_use]
    pub fn diff(&self) -> Vec<FieldChange> {
        match (&self.before, &self.after) {
            (Some(Value::Object(before)), Some(Value::Object(after))) => {
                diff_objects(before, after)
            }
            (Some(Value::Object(before)), None) => diff_objects(before, &Map::new()),
            (None, Some(Value::Object(after))) => diff_objects(&Map::new(), after),
            (before, after) if before != after => vec![FieldChange {
                field: "$".to_owned(),
                before: before.clone(),
                after: after.clone(),
            }],
            _ => Vec::new(),
        }
    }
}

fn diff_objects(before: &Map<String, Value>, after: &Map<String, Value>) -> Vec<FieldChange> {
    let fields: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

    fields
        .into_iter()
        .filter_map(|field| {
            let previous = before.get(field);
            let next = after.get(field);
            (previous != next).then(|| FieldChange {
                field: field.clone(),
                before: previous.cloned(),
                after: next.cloned(),
            })
        })
        .collect()
}

/// Immutable entry of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Stable record identifier.
    pub record_id: Uuid,
    /// Action kind.
    pub action: AuditAction,
    /// Entity kind.
    pub entity_type: AuditEntityType,
    /// Affected entity identifier.
    pub entity_id: Option<String>,
    /// Acting user when authenticated.
    pub actor_user_id: Option<UserId>,
    /// Acting user email, or [`ANONYMOUS_ACTOR_EMAIL`].
    pub actor_email: String,
    /// Client address.
    pub source_ip: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
    /// When the operation was observed; display ordering key.
    pub occurred_at: DateTime<Utc>,
    /// Optional before/after snapshot.
    pub changes: Option<AuditChanges>,
    /// Free-form metadata.
    pub metadata: Map<String, Value>,
    /// Outcome classification.
    pub status: AuditStatus,
    /// Error text for rejected or failed operations.
    pub error_message: Option<String>,
}

impl AuditRecord {
    /// Creates a record with a fresh identifier and empty optional fields.
    ///
    /// A blank actor email is replaced with [`ANONYMOUS_ACTOR_EMAIL`].
    #[must_use]
    pub fn new(
        action: AuditAction,
        entity_type: AuditEntityType,
        actor_email: impl Into<String>,
        status: AuditStatus,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        let actor_email = actor_email.into();
        let actor_email = if actor_email.trim().is_empty() {
            ANONYMOUS_ACTOR_EMAIL.to_owned()
        } else {
            actor_email
        };

        Self {
            record_id: Uuid::new_v4(),
            action,
            entity_type,
            entity_id: None,
            actor_user_id: None,
            actor_email,
            source_ip: None,
            user_agent: None,
            occurred_at,
            changes: None,
            metadata: Map::new(),
            status,
            error_message: None,
        }
    }

    /// Returns the read-time diff of the attached snapshot.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<FieldChange> {
        self.changes
            .as_ref()
            .map(AuditChanges::diff)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use super::{
        ANONYMOUS_ACTOR_EMAIL, AuditAction, AuditChanges, AuditEntityType, AuditRecord,
        AuditStatus,
    };

    #[test]
    fn entity_type_heuristic_strips_one_trailing_s() {
        assert_eq!(AuditEntityType::from_path_segment("tasks"), AuditEntityType::Task);
        assert_eq!(AuditEntityType::from_path_segment("roles"), AuditEntityType::Role);
    }

    #[test]
    fn entity_type_heuristic_is_naive_for_irregular_plurals() {
        assert_eq!(
            AuditEntityType::from_path_segment("companies"),
            AuditEntityType::Other("companie".to_owned())
        );
    }

    #[test]
    fn method_mapping_covers_crud_verbs() {
        assert_eq!(AuditAction::from_method("get"), Some(AuditAction::Read));
        assert_eq!(AuditAction::from_method("POST"), Some(AuditAction::Create));
        assert_eq!(AuditAction::from_method("PATCH"), Some(AuditAction::Update));
        assert_eq!(AuditAction::from_method("DELETE"), Some(AuditAction::Delete));
        assert_eq!(AuditAction::from_method("TRACE"), None);
    }

    #[test]
    fn unknown_action_values_survive_storage() {
        let action = AuditAction::parse("EXPORT_CSV");
        assert_eq!(action, AuditAction::Other("EXPORT_CSV".to_owned()));
        assert_eq!(action.as_str(), "EXPORT_CSV");
        assert_eq!(AuditAction::parse("complete"), AuditAction::Complete);
    }

    #[test]
    fn status_bands_classify_outcomes() {
        assert_eq!(AuditStatus::from_status_code(204), AuditStatus::Success);
        assert_eq!(AuditStatus::from_status_code(403), AuditStatus::Failed);
        assert_eq!(AuditStatus::from_status_code(500), AuditStatus::Error);
        assert_eq!(AuditStatus::from_status_code(302), AuditStatus::Error);
    }

    #[test]
    fn blank_actor_email_falls_back_to_anonymous() {
        let record = AuditRecord::new(
            AuditAction::LoginFailed,
            AuditEntityType::Session,
            " ",
            AuditStatus::Failed,
            Utc::now(),
        );
        assert_eq!(record.actor_email, ANONYMOUS_ACTOR_EMAIL);
    }

    #[test]
    fn diff_reports_only_changed_fields() {
        let changes = AuditChanges {
            before: Some(json!({"status": "open", "title": "Quarterly VAT"})),
            after: Some(json!({"status": "submitted", "title": "Quarterly VAT"})),
        };

        let diff = changes.diff();
        assert_eq!(diff.len(), 1);
        assert_eq!(diff[0].field, "status");
        assert_eq!(diff[0].after, Some(json!("submitted")));
    }
}
