use crate::core::locator::{self, Coordinate, Locator};

/// 能被下载的地址：坐标、包装地址、http(s)、file、绝对路径
pub fn is_valid_url(url: &str) -> bool {
    let url = locator::normalize(url);
    if url.is_empty() || url.contains(char::is_whitespace) {
        return false;
    }
    match Locator::classify(&url) {
        Locator::Coordinate(coordinate) => Coordinate::parse(&coordinate).is_ok(),
        Locator::Wrapped(wrapped) => Coordinate::parse(wrapped.inner()).is_ok(),
        Locator::Direct(direct) => is_direct(locator::unwrap_direct(&direct)),
    }
}

fn is_direct(url: &str) -> bool {
    if url.starts_with('/') {
        return true;
    }
    match url::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https" | "file"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_validation() {
        assert!(is_valid_url("https://example.com/a.jar"));
        assert!(is_valid_url("http://example.com/a.jar"));
        assert!(is_valid_url("file:///tmp/a.jar"));
        assert!(is_valid_url("/tmp/a.jar"));
        assert!(is_valid_url("mvn:org.foo/bar/1.0"));
        assert!(is_valid_url("mvn:org.foo/bar/1.0/war/tests"));
        assert!(is_valid_url("wrap:mvn:org.foo/bar/1.0$Bundle-Name=bar"));
        assert!(is_valid_url("wrap:file:///tmp/a.jar"));
        assert!(is_valid_url("  mvn:org.foo/bar/1.0 "));
    }

    #[test]
    fn test_invalid_urls() {
        assert!(!is_valid_url("invalid-url"));
        assert!(!is_valid_url(""));
        assert!(!is_valid_url("ftp://example.com/a.jar"));
        assert!(!is_valid_url("mvn:org.foo/bar"));
        assert!(!is_valid_url("wrap:mvn:org.foo"));
        assert!(!is_valid_url("a b"));
    }
}
