//! Space-delimited scope strings (RFC 6749 Section 3.3).

/// OpenID Connect scope value.
pub const OPENID: &str = "openid";

/// Scope value requesting a refresh token.
pub const OFFLINE_ACCESS: &str = "offline_access";

/// Iterates over the scope tokens of a space-delimited scope string.
pub fn tokens(scope: &str) -> impl Iterator<Item = &str> {
    scope.split(' ').filter(|s| !s.is_empty())
}

/// Returns `true` if the scope string contains `value` as a whole token.
#[must_use]
pub fn contains(scope: &str, value: &str) -> bool {
    tokens(scope).any(|s| s == value)
}

/// Returns `true` if the scope string includes `openid`.
#[must_use]
pub fn include_openid(scope: &str) -> bool {
    contains(scope, OPENID)
}

/// Returns `true` if the scope string includes `offline_access`.
#[must_use]
pub fn include_offline_access(scope: &str) -> bool {
    contains(scope, OFFLINE_ACCESS)
}

/// Returns the scope string with `offline_access` appended, unless present.
#[must_use]
pub fn add_offline_access(scope: &str) -> String {
    if include_offline_access(scope) {
        return scope.to_string();
    }
    let trimmed = scope.trim();
    if trimmed.is_empty() {
        OFFLINE_ACCESS.to_string()
    } else {
        format!("{trimmed} {OFFLINE_ACCESS}")
    }
}

/// Returns `true` if every token of `requested` appears in `granted`.
#[must_use]
pub fn is_subset(requested: &str, granted: &str) -> bool {
    tokens(requested).all(|s| contains(granted, s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_include_openid_matches_whole_tokens() {
        assert!(include_openid("openid profile"));
        assert!(include_openid("profile  openid"));
        assert!(!include_openid("openidx profile"));
        assert!(!include_openid(""));
    }

    #[test]
    fn test_include_offline_access() {
        assert!(include_offline_access("openid profile offline_access"));
        assert!(!include_offline_access("offline"));
    }

    #[test]
    fn test_add_offline_access() {
        assert_eq!(add_offline_access(""), "offline_access");
        assert_eq!(add_offline_access("openid"), "openid offline_access");
        assert_eq!(
            add_offline_access("offline_access openid"),
            "offline_access openid"
        );
    }

    #[test]
    fn test_is_subset() {
        assert!(is_subset("profile", "openid profile offline_access"));
        assert!(is_subset("", "openid"));
        assert!(!is_subset("profile email", "openid profile"));
    }
}
