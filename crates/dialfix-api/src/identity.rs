use axum::http::HeaderMap;

use crate::error::AppError;

/// Header carrying the caller identity, set by the trusted upstream proxy
pub const USER_HEADER: &str = "x-dialfix-user";

const MAX_USER_LEN: usize = 320;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
}

pub fn extract_user(headers: &HeaderMap) -> Result<CallerIdentity, AppError> {
    let value = headers
        .get(USER_HEADER)
        .ok_or_else(|| AppError::unauthorized(format!("Missing {USER_HEADER} header")))?
        .to_str()
        .map_err(|_| AppError::unauthorized(format!("{USER_HEADER} header is not valid UTF-8")))?;

    let user_id = value.trim();
    if user_id.is_empty() {
        return Err(AppError::unauthorized(format!(
            "{USER_HEADER} header is empty"
        )));
    }
    if user_id.len() > MAX_USER_LEN {
        return Err(AppError::unauthorized(format!(
            "{USER_HEADER} header exceeds {MAX_USER_LEN} bytes"
        )));
    }
    if user_id.chars().any(char::is_control) {
        return Err(AppError::unauthorized(format!(
            "{USER_HEADER} header contains control characters"
        )));
    }

    Ok(CallerIdentity {
        user_id: user_id.to_string(),
    })
}
