use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use axum::extract::{ConnectInfo, FromRequestParts, MatchedPath, Query, RawPathParams, Request, State};
use axum::http::{HeaderMap, Method, header};
use axum::middleware::Next;
use axum::response::Response;
use ipnet::IpNet;
use taskgate_application::{AuditConfig, RequestContext, ResponseStatus};
use taskgate_core::{AppError, AppResult, LegacyRole, TenantId, UserId, UserIdentity};
use taskgate_domain::{AuditAction, AuditEntityType};
use tracing::warn;

use crate::error::{ApiResult, ErrorMessage};
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_EMAIL_HEADER: &str = "x-user-email";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const TENANT_ID_HEADER: &str = "x-tenant-id";

/// Attaches the gateway-asserted identity, if any, to the request.
///
/// Requests without `x-user-id` stay anonymous; a partial or malformed header set is rejected.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    if let Some(identity) = identity_from_headers(request.headers())? {
        if let Err(error) = state.security_admin_service.sync_user(&identity).await {
            warn!(user_id = %identity.user_id(), %error, "failed to synchronize user account");
        }
        request.extensions_mut().insert(identity);
    }

    Ok(next.run(request).await)
}

pub fn identity_from_headers(headers: &HeaderMap) -> AppResult<Option<UserIdentity>> {
    let Some(user_id) = header_value(headers, USER_ID_HEADER)? else {
        return Ok(None);
    };

    let user_id = UserId::from_str(user_id).map_err(|_| invalid_header(USER_ID_HEADER))?;
    let email = required_header(headers, USER_EMAIL_HEADER)?;
    let legacy_role = LegacyRole::from_str(required_header(headers, USER_ROLE_HEADER)?)
        .map_err(|_| invalid_header(USER_ROLE_HEADER))?;
    let tenant_id = TenantId::from_str(required_header(headers, TENANT_ID_HEADER)?)
        .map_err(|_| invalid_header(TENANT_ID_HEADER))?;

    Ok(Some(UserIdentity::new(user_id, email, legacy_role, tenant_id)))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<Option<&'a str>> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map(str::trim)
                .map_err(|_| invalid_header(name))
        })
        .transpose()
        .map(|value| value.filter(|value| !value.is_empty()))
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<&'a str> {
    header_value(headers, name)?
        .ok_or_else(|| AppError::Unauthorized(format!("missing identity header '{name}'")))
}

fn invalid_header(name: &str) -> AppError {
    AppError::Unauthorized(format!("invalid identity header '{name}'"))
}

/// Resolves the client address. `x-forwarded-for` is honored only when the peer is a trusted proxy.
pub fn client_ip(headers: &HeaderMap, peer: Option<IpAddr>, trusted_proxies: &[IpNet]) -> Option<String> {
    let peer = peer?;
    let is_trusted = |address: &IpAddr| trusted_proxies.iter().any(|network| network.contains(address));
    if !is_trusted(&peer) {
        return Some(peer.to_string());
    }

    let forwarded: Vec<IpAddr> = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .filter_map(|entry| IpAddr::from_str(entry.trim()).ok())
                .collect()
        })
        .unwrap_or_default();

    // Walk back from the nearest hop; the first untrusted address is the client.
    let client = forwarded
        .iter()
        .rev()
        .find(|address| !is_trusted(address))
        .or_else(|| forwarded.first())
        .copied()
        .unwrap_or(peer);

    Some(client.to_string())
}

/// Per-route audit configuration keyed by method and matched route template.
#[derive(Default)]
pub struct AuditPolicy {
    routes: HashMap<(Method, String), AuditConfig>,
    fallback: AuditConfig,
}

impl AuditPolicy {
    pub fn with_route(mut self, method: Method, path: &str, config: AuditConfig) -> Self {
        self.routes.insert((method, path.to_owned()), config);
        self
    }

    pub fn config_for(&self, method: &Method, matched_path: Option<&str>) -> &AuditConfig {
        matched_path
            .and_then(|path| self.routes.get(&(method.clone(), path.to_owned())))
            .unwrap_or(&self.fallback)
    }

    /// Routes whose action or entity cannot be inferred from method and path.
    pub fn standard() -> Self {
        let user_id = |request: &RequestContext| request.route_params.get("user_id").cloned();

        Self::default()
            .with_route(
                Method::POST,
                "/api/tasks/{id}/submit",
                AuditConfig::new().action(AuditAction::Submit),
            )
            .with_route(
                Method::POST,
                "/api/tasks/{id}/complete",
                AuditConfig::new().action(AuditAction::Complete),
            )
            .with_route(
                Method::POST,
                "/api/tasks/{id}/return",
                AuditConfig::new().action(AuditAction::Return),
            )
            .with_route(
                Method::PUT,
                "/api/tasks/{id}/status",
                AuditConfig::new().action(AuditAction::Override),
            )
            .with_route(
                Method::GET,
                "/api/tasks/{id}/messages",
                AuditConfig::new().entity_type(AuditEntityType::TaskMessage),
            )
            .with_route(
                Method::GET,
                "/api/role-assignments",
                AuditConfig::new().entity_type(AuditEntityType::RoleAssignment),
            )
            .with_route(
                Method::POST,
                "/api/role-assignments",
                AuditConfig::new()
                    .action(AuditAction::Grant)
                    .entity_type(AuditEntityType::RoleAssignment),
            )
            .with_route(
                Method::DELETE,
                "/api/users/{user_id}/roles/{role_id}",
                AuditConfig::new()
                    .action(AuditAction::Revoke)
                    .entity_type(AuditEntityType::RoleAssignment)
                    .entity_id(|request| {
                        let user_id = request.route_params.get("user_id")?;
                        let role_id = request.route_params.get("role_id")?;
                        Some(format!("{user_id}:{role_id}"))
                    }),
            )
            .with_route(
                Method::DELETE,
                "/api/users/{user_id}/roles",
                AuditConfig::new()
                    .action(AuditAction::Revoke)
                    .entity_type(AuditEntityType::User)
                    .entity_id(user_id),
            )
            .with_route(
                Method::GET,
                "/api/users/{user_id}/roles",
                AuditConfig::new()
                    .entity_type(AuditEntityType::User)
                    .entity_id(user_id),
            )
            .with_route(
                Method::GET,
                "/api/me/permissions",
                AuditConfig::new().entity_type(AuditEntityType::Permission),
            )
            .with_route(
                Method::GET,
                "/api/audit-records",
                AuditConfig::new().entity_type(AuditEntityType::AuditLog),
            )
    }
}

struct AuditedResponse(Response);

impl ResponseStatus for AuditedResponse {
    fn status_code(&self) -> u16 {
        self.0.status().as_u16()
    }

    fn error_message(&self) -> Option<String> {
        self.0
            .extensions()
            .get::<ErrorMessage>()
            .map(|message| message.0.clone())
    }
}

/// Runs the request through the audit interceptor with the route's configuration.
pub async fn audit_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let route_params: BTreeMap<String, String> = RawPathParams::from_request_parts(&mut parts, &state)
        .await
        .map(|params| {
            params
                .iter()
                .map(|(key, value)| (key.to_owned(), value.to_owned()))
                .collect()
        })
        .unwrap_or_default();
    let query_params = Query::<BTreeMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(params)| params)
        .unwrap_or_default();
    let matched_path = parts
        .extensions
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_owned());
    let peer = parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip());
    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(ToOwned::to_owned);

    let mut context = RequestContext::new(parts.method.as_str(), parts.uri.path())
        .with_identity(parts.extensions.get::<UserIdentity>().cloned())
        .with_source_ip(client_ip(&parts.headers, peer, &state.trusted_proxies))
        .with_user_agent(user_agent);
    context.route_params = route_params;
    context.query_params = query_params;

    let config = state
        .audit_policy
        .config_for(&parts.method, matched_path.as_deref());
    let request = Request::from_parts(parts, body);

    state
        .audit_interceptor
        .wrap(&context, config, || async move {
            AuditedResponse(next.run(request).await)
        })
        .await
        .0
}
