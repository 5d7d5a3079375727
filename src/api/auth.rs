use axum::http::{header::AUTHORIZATION, HeaderMap, StatusCode};

pub const ADMIN_TOKEN_HEADER: &str = "x-pitchpool-admin-token";

fn extract_bearer_token(raw: &str) -> Option<&str> {
    raw.strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .map(str::trim)
}

/// Check the admin token on a control request.
///
/// With no token configured every caller is accepted.
pub fn ensure_admin_authorized(
    expected: Option<&str>,
    headers: &HeaderMap,
) -> std::result::Result<(), (StatusCode, String)> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let token = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(extract_bearer_token)
        });

    if token.is_some_and(|v| v == expected) {
        return Ok(());
    }

    Err((
        StatusCode::UNAUTHORIZED,
        "admin auth failed (missing/invalid token)".to_string(),
    ))
}
