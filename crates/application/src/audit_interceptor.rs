use std::collections::BTreeMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use taskgate_core::{AppResult, UserIdentity};
use taskgate_domain::{AuditAction, AuditEntityType, AuditRecord, AuditStatus};
use tracing::warn;

use crate::AuditRecorder;

/// Extracts an entity identifier from a request.
pub type EntityIdExtractor = Arc<dyn Fn(&RequestContext) -> Option<String> + Send + Sync>;

/// Decides whether a request bypasses auditing entirely.
pub type SkipPredicate = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

/// Framework-neutral view of an inbound request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// HTTP-style method name.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Decoded query parameters.
    pub query_params: BTreeMap<String, String>,
    /// Matched route parameters.
    pub route_params: BTreeMap<String, String>,
    /// Authenticated caller, if any.
    pub identity: Option<UserIdentity>,
    /// Client address.
    pub source_ip: Option<String>,
    /// Client user agent.
    pub user_agent: Option<String>,
}

impl RequestContext {
    /// Creates a context for a method and path.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Self::default()
        }
    }

    /// Adds a query parameter.
    #[must_use]
    pub fn with_query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Adds a route parameter.
    #[must_use]
    pub fn with_route_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.route_params.insert(key.into(), value.into());
        self
    }

    /// Sets the caller identity.
    #[must_use]
    pub fn with_identity(mut self, identity: Option<UserIdentity>) -> Self {
        self.identity = identity;
        self
    }

    /// Sets the client address.
    #[must_use]
    pub fn with_source_ip(mut self, source_ip: Option<String>) -> Self {
        self.source_ip = source_ip;
        self
    }

    /// Sets the client user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// Per-call-site audit configuration. Unset fields are inferred from the request.
#[derive(Clone, Default)]
pub struct AuditConfig {
    action: Option<AuditAction>,
    entity_type: Option<AuditEntityType>,
    entity_id: Option<EntityIdExtractor>,
    skip: Option<SkipPredicate>,
    metadata: Map<String, Value>,
}

impl AuditConfig {
    /// Creates a configuration that infers everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fixes the action.
    #[must_use]
    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Fixes the entity type.
    #[must_use]
    pub fn entity_type(mut self, entity_type: AuditEntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    /// Sets an explicit entity id extractor.
    #[must_use]
    pub fn entity_id(
        mut self,
        extractor: impl Fn(&RequestContext) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.entity_id = Some(Arc::new(extractor));
        self
    }

    /// Sets a predicate that bypasses auditing.
    #[must_use]
    pub fn skip_when(
        mut self,
        predicate: impl Fn(&RequestContext) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.skip = Some(Arc::new(predicate));
        self
    }

    /// Adds a static metadata entry.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Outcome view the interceptor needs from a wrapped operation.
pub trait ResponseStatus {
    /// HTTP-style status code.
    fn status_code(&self) -> u16;

    /// Error text for non-success outcomes.
    fn error_message(&self) -> Option<String> {
        None
    }
}

impl<T> ResponseStatus for AppResult<T> {
    fn status_code(&self) -> u16 {
        match self {
            Ok(_) => 200,
            Err(error) => error.status_code(),
        }
    }

    fn error_message(&self) -> Option<String> {
        self.as_ref().err().map(ToString::to_string)
    }
}

/// Wraps operations and emits one audit record per authenticated call.
#[derive(Clone)]
pub struct AuditInterceptor {
    recorder: AuditRecorder,
}

impl AuditInterceptor {
    /// Creates an interceptor dispatching to `recorder`.
    #[must_use]
    pub fn new(recorder: AuditRecorder) -> Self {
        Self { recorder }
    }

    /// Runs `operation` and records its outcome. The operation's result is
    /// always returned unchanged, whatever happens on the audit path.
    pub async fn wrap<F, Fut, R>(&self, request: &RequestContext, config: &AuditConfig, operation: F) -> R
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = R>,
        R: ResponseStatus,
    {
        if should_skip(request, config) {
            return operation().await;
        }
        let Some(identity) = request.identity.as_ref() else {
            return operation().await;
        };

        let occurred_at = Utc::now();
        let started = Instant::now();
        let response = operation().await;
        let elapsed = started.elapsed();

        let record = panic::catch_unwind(AssertUnwindSafe(|| {
            build_record(request, config, identity, &response, occurred_at, elapsed)
        }));
        match record {
            Ok(record) => self.recorder.record(record),
            Err(_) => warn!(
                target: "taskgate::audit",
                method = %request.method,
                path = %request.path,
                "audit metadata computation panicked, no record written"
            ),
        }

        response
    }
}

fn should_skip(request: &RequestContext, config: &AuditConfig) -> bool {
    let Some(predicate) = config.skip.as_ref() else {
        return false;
    };

    panic::catch_unwind(AssertUnwindSafe(|| predicate(request))).unwrap_or_else(|_| {
        warn!(
            target: "taskgate::audit",
            path = %request.path,
            "audit skip predicate panicked, request not audited"
        );
        true
    })
}

fn build_record<R: ResponseStatus>(
    request: &RequestContext,
    config: &AuditConfig,
    identity: &UserIdentity,
    response: &R,
    occurred_at: DateTime<Utc>,
    elapsed: Duration,
) -> AuditRecord {
    let status_code = response.status_code();
    let status = AuditStatus::from_status_code(status_code);
    let action = config
        .action
        .clone()
        .or_else(|| AuditAction::from_method(&request.method))
        .unwrap_or_else(|| AuditAction::parse(&request.method));
    let entity_type = config
        .entity_type
        .clone()
        .unwrap_or_else(|| infer_entity_type(&request.path));

    let mut record = AuditRecord::new(action, entity_type, identity.email(), status, occurred_at);
    record.actor_user_id = Some(identity.user_id());
    record.entity_id = resolve_entity_id(request, config);
    record.source_ip = request.source_ip.clone();
    record.user_agent = request.user_agent.clone();
    if status != AuditStatus::Success {
        record.error_message = response.error_message();
    }

    let mut metadata = config.metadata.clone();
    metadata.insert("method".to_owned(), Value::from(request.method.as_str()));
    metadata.insert("path".to_owned(), Value::from(request.path.as_str()));
    metadata.insert(
        "duration_ms".to_owned(),
        Value::from(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)),
    );
    metadata.insert("status_code".to_owned(), Value::from(status_code));
    record.metadata = metadata;

    record
}

fn resolve_entity_id(request: &RequestContext, config: &AuditConfig) -> Option<String> {
    if let Some(extractor) = config.entity_id.as_ref() {
        return extractor(request);
    }

    request
        .route_params
        .get("id")
        .or_else(|| request.query_params.get("id"))
        .cloned()
}

/// Infers an entity type from the first resource segment of `path`.
///
/// A leading `api` segment and a version segment such as `v1` are skipped.
#[must_use]
pub fn infer_entity_type(path: &str) -> AuditEntityType {
    let mut segments = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .peekable();

    if segments
        .peek()
        .is_some_and(|segment| segment.eq_ignore_ascii_case("api"))
    {
        segments.next();
    }
    if segments.peek().is_some_and(|segment| is_version_segment(segment)) {
        segments.next();
    }

    segments.next().map_or_else(
        || AuditEntityType::Other("unknown".to_owned()),
        AuditEntityType::from_path_segment,
    )
}

fn is_version_segment(segment: &str) -> bool {
    let mut chars = segment.chars();
    matches!(chars.next(), Some('v' | 'V'))
        && !chars.as_str().is_empty()
        && chars.all(|character| character.is_ascii_digit())
}
