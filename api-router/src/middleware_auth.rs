use axum::{extract::Request, middleware::Next, response::Response};

use crate::error::ApiError;

/// The caller's tenant/user identity, extracted from headers upstream
/// auth middleware is trusted to have verified. Missing tenant context is
/// fatal here: 403, never a silent default.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub tenant_id: String,
    pub user_id: String,
}

#[axum::debug_middleware]
pub async fn require_tenant(mut request: Request, next: Next) -> Result<Response, ApiError> {
    let (tenant_id, user_id) = {
        let header = |name: &str| {
            request
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_owned)
        };

        let tenant_id = header("x-tenant-id")
            .ok_or_else(|| ApiError::Forbidden("missing tenant context".to_string()))?;
        let user_id = header("x-user-id")
            .ok_or_else(|| ApiError::Forbidden("missing user context".to_string()))?;
        (tenant_id, user_id)
    };

    request
        .extensions_mut()
        .insert(CallerIdentity { tenant_id, user_id });
    Ok(next.run(request).await)
}
