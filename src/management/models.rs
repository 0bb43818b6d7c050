//! Request and response payloads of the management and system endpoints.
//!
//! Field names follow the InfluxDB 2.x JSON conventions (`orgID`, `userID`,
//! `retentionRules`); the Rust structs expose them as snake case. Response
//! types deserialize leniently so new server fields do not break parsing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bucket as reported by `/api/v2/buckets`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Bucket {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "orgID", skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "retentionRules")]
    pub retention_rules: Vec<RetentionRule>,
    /// `user` or `system`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub bucket_type: Option<String>,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// List wrapper returned by `GET /api/v2/buckets`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Buckets {
    pub buckets: Vec<Bucket>,
}

/// Data expiry rule attached to a bucket.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct RetentionRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    #[serde(rename = "everySeconds")]
    pub every_seconds: i64,
    #[serde(rename = "shardGroupDurationSeconds", skip_serializing_if = "Option::is_none")]
    pub shard_group_duration_seconds: Option<i64>,
}

impl RetentionRule {
    /// Expire data older than `every_seconds`; 0 keeps data forever.
    pub fn expire(every_seconds: i64) -> Self {
        Self {
            rule_type: "expire".to_owned(),
            every_seconds,
            shard_group_duration_seconds: None,
        }
    }
}

/// Body of `POST /api/v2/buckets`.
#[derive(Clone, Debug, Serialize)]
pub struct PostBucketRequest {
    #[serde(rename = "orgID")]
    pub org_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "retentionRules", skip_serializing_if = "Vec::is_empty")]
    pub retention_rules: Vec<RetentionRule>,
}

impl PostBucketRequest {
    /// A bucket with infinite retention.
    pub fn new(org_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            name: name.into(),
            description: None,
            retention_rules: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_retention(mut self, rule: RetentionRule) -> Self {
        self.retention_rules.push(rule);
        self
    }
}

/// Body of `PATCH /api/v2/buckets/{id}`; `None` fields are left unchanged.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PatchBucketRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "retentionRules", skip_serializing_if = "Option::is_none")]
    pub retention_rules: Option<Vec<RetentionRule>>,
}

/// An organization as reported by `/api/v2/orgs`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Organization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// List wrapper returned by `GET /api/v2/orgs`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Organizations {
    pub orgs: Vec<Organization>,
}

/// Body of `POST /api/v2/orgs`.
#[derive(Clone, Debug, Serialize)]
pub struct PostOrganizationRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PostOrganizationRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}

/// A user as reported by `/api/v2/users` and `/api/v2/me`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// `active` or `inactive`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// List wrapper returned by `GET /api/v2/users`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Users {
    pub users: Vec<User>,
}

/// Body of `POST /api/v2/users`.
#[derive(Clone, Debug, Serialize)]
pub struct PostUserRequest {
    pub name: String,
}

/// An API token and the permissions attached to it.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Authorization {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The token secret; only returned on creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// `active` or `inactive`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "orgID")]
    pub org_id: String,
    #[serde(rename = "userID", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub permissions: Vec<Permission>,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Authorization {
    pub fn new(org_id: impl Into<String>, permissions: Vec<Permission>) -> Self {
        Self {
            org_id: org_id.into(),
            permissions,
            ..Self::default()
        }
    }
}

/// List wrapper returned by `GET /api/v2/authorizations`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Authorizations {
    pub authorizations: Vec<Authorization>,
}

/// One granted action on a resource.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Permission {
    /// `read` or `write`.
    pub action: String,
    pub resource: PermissionResource,
}

impl Permission {
    pub fn read(resource: PermissionResource) -> Self {
        Self {
            action: "read".to_owned(),
            resource,
        }
    }

    pub fn write(resource: PermissionResource) -> Self {
        Self {
            action: "write".to_owned(),
            resource,
        }
    }
}

/// The resource a [`Permission`] applies to. Without `id` the permission
/// covers every resource of that type.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct PermissionResource {
    /// Resource type, e.g. `buckets`, `orgs`, `tasks`.
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "orgID", skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
}

impl PermissionResource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_org_id(mut self, org_id: impl Into<String>) -> Self {
        self.org_id = Some(org_id.into());
        self
    }
}

/// A task as reported by `/api/v2/tasks`.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Task {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(rename = "orgID")]
    pub org_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    /// The full Flux script, including the `option task = {...}` block.
    pub flux: String,
    /// `active` or `inactive`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub every: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// List wrapper returned by `GET /api/v2/tasks`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Tasks {
    pub tasks: Vec<Task>,
}

/// Body of `POST /api/v2/tasks`. The schedule is declared inside the Flux
/// script itself, in its `option task` block.
#[derive(Clone, Debug, Serialize)]
pub struct TaskCreateRequest {
    #[serde(rename = "orgID")]
    pub org_id: String,
    pub flux: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl TaskCreateRequest {
    pub fn new(org_id: impl Into<String>, flux: impl Into<String>) -> Self {
        Self {
            org_id: org_id.into(),
            flux: flux.into(),
            description: None,
            status: None,
        }
    }
}

/// Body of `PATCH /api/v2/tasks/{id}`; `None` fields are left unchanged.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TaskUpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flux: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub every: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One execution of a task.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Run {
    pub id: Option<String>,
    #[serde(rename = "taskID")]
    pub task_id: Option<String>,
    /// `scheduled`, `started`, `failed`, `success` or `canceled`.
    pub status: Option<String>,
    #[serde(rename = "scheduledFor")]
    pub scheduled_for: Option<DateTime<Utc>>,
    #[serde(rename = "startedAt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(rename = "finishedAt")]
    pub finished_at: Option<DateTime<Utc>>,
}

/// List wrapper returned by `GET /api/v2/tasks/{id}/runs`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Runs {
    pub runs: Vec<Run>,
}

/// Body of `POST /api/v2/tasks/{id}/runs`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct RunManually {
    #[serde(rename = "scheduledFor", skip_serializing_if = "Option::is_none")]
    pub scheduled_for: Option<DateTime<Utc>>,
}

/// Body of `POST /api/v2/delete`.
#[derive(Clone, Debug, Serialize)]
pub struct DeletePredicateRequest {
    pub start: DateTime<Utc>,
    pub stop: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicate: Option<String>,
}

/// Response of `GET /health`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct HealthCheck {
    pub name: String,
    pub message: Option<String>,
    /// `pass` or `fail`.
    pub status: String,
    pub version: Option<String>,
    pub commit: Option<String>,
}

impl HealthCheck {
    /// A failing check built client side when the server is unreachable.
    pub(crate) fn fail(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_owned(),
            message: Some(message.into()),
            status: "fail".to_owned(),
            version: None,
            commit: None,
        }
    }

    pub fn is_pass(&self) -> bool {
        self.status == "pass"
    }
}

/// Response of `GET /ready`.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Ready {
    pub status: String,
    pub started: Option<DateTime<Utc>>,
    /// Uptime as a Go duration string, e.g. `512.8090276s`.
    pub up: Option<String>,
}
