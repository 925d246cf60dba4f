use axum::Router;

use crate::errors::{AppError, AppResult};
use crate::AppState;

mod accounts;

/// Largest `limit` a caller may ask for; the ledger clamps further.
const MAX_QUERY_LIMIT: usize = 1000;

pub fn router() -> Router<AppState> {
    Router::new().nest("/accounts/:owner_id", accounts::router())
}

/// Parses an optional `limit` query value. Absent means "ledger default".
pub(crate) fn parse_limit(raw: Option<&str>) -> AppResult<usize> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(0);
    };
    match raw.parse::<usize>() {
        Ok(limit) if limit > 0 => Ok(limit.min(MAX_QUERY_LIMIT)),
        _ => Err(AppError::bad_request(format!(
            "limit must be a positive integer, got {raw}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_are_positive_and_capped() {
        assert_eq!(parse_limit(None).unwrap(), 0);
        assert_eq!(parse_limit(Some("")).unwrap(), 0);
        assert_eq!(parse_limit(Some("10")).unwrap(), 10);
        assert_eq!(parse_limit(Some("5000")).unwrap(), MAX_QUERY_LIMIT);
        assert!(parse_limit(Some("0")).is_err());
        assert!(parse_limit(Some("-3")).is_err());
        assert!(parse_limit(Some("many")).is_err());
    }
}
