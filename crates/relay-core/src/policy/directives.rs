//! `Cache-Control` directive parsing

/// The subset of `Cache-Control` directives the proxy acts on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheDirectives {
    /// Freshness lifetime in seconds, 0 when unset
    pub max_age: u64,
    pub no_cache: bool,
    pub no_store: bool,
}

/// Parse a raw `Cache-Control` header value.
///
/// Tokens are comma separated and compared case-insensitively. Unknown
/// tokens are ignored, a later `max-age` overrides an earlier one, and a
/// `max-age` whose value is not an integer leaves the previous value alone.
/// Never fails: unparseable input yields the default (no directives).
pub fn parse_cache_control(value: &str) -> CacheDirectives {
    let mut directives = CacheDirectives::default();

    for token in value.split(',') {
        let token = token.trim().to_ascii_lowercase();

        if token == "no-cache" {
            directives.no_cache = true;
        } else if token == "no-store" {
            directives.no_store = true;
        } else if let Some(age) = token.strip_prefix("max-age=") {
            if let Ok(age) = age.parse::<i64>() {
                directives.max_age = age.max(0) as u64;
            }
        }
    }

    directives
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_cache_only() {
        assert_eq!(
            parse_cache_control("no-cache"),
            CacheDirectives {
                max_age: 0,
                no_cache: true,
                no_store: false,
            }
        );
    }

    #[test]
    fn test_combined_directives_case_and_whitespace() {
        let parsed = parse_cache_control("  Public , NO-STORE,max-age=120 ,private");
        assert!(parsed.no_store);
        assert!(!parsed.no_cache);
        assert_eq!(parsed.max_age, 120);
    }

    #[test]
    fn test_last_max_age_wins() {
        assert_eq!(parse_cache_control("max-age=30, max-age=60").max_age, 60);
        assert_eq!(parse_cache_control("max-age=60, max-age=30").max_age, 30);
    }

    #[test]
    fn test_malformed_max_age_is_ignored() {
        assert_eq!(parse_cache_control("max-age=abc"), CacheDirectives::default());
        assert_eq!(parse_cache_control("max-age=30, max-age=abc").max_age, 30);
        assert_eq!(parse_cache_control("max-age=").max_age, 0);
        assert_eq!(parse_cache_control("max-age = 30").max_age, 0);
    }

    #[test]
    fn test_negative_max_age_unsets() {
        assert_eq!(parse_cache_control("max-age=30, max-age=-5").max_age, 0);
    }

    #[test]
    fn test_empty_and_unknown_input() {
        assert_eq!(parse_cache_control(""), CacheDirectives::default());
        assert_eq!(parse_cache_control(",,, ,"), CacheDirectives::default());
        assert_eq!(
            parse_cache_control("s-maxage=10, must-revalidate, no-cache=\"set-cookie\""),
            CacheDirectives::default()
        );
    }
}
