//! URL 检查与域名归一化

use url::Url;

use crate::errors::{GridlinkError, Result};

/// 可接受的目标 URL 字节上限
pub const MAX_URL_BYTES: usize = 8192;

/// 目标 URL 的最低要求：带协议分隔符且不超长。
///
/// 更严格的格式校验、黑名单等属于策略问题，留给外层。
pub fn validate_target(url: &str) -> Result<()> {
    if !url.contains("://") {
        return Err(GridlinkError::bad_url(
            "URL must contain a scheme separator.",
        ));
    }
    if url.len() > MAX_URL_BYTES {
        return Err(GridlinkError::bad_url(format!(
            "URL exceeds {MAX_URL_BYTES} bytes."
        )));
    }
    Ok(())
}

/// 从 URL 提取规范化域名：去端口、去开头的 `www.` 前缀、去首尾的
/// 点、统一小写。
pub fn canonical_domain(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| GridlinkError::bad_url(format!("Cannot parse URL: {e}")))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| GridlinkError::bad_url("URL has no host."))?;

    let mut domain = host.to_lowercase();
    while let Some(stripped) = domain.strip_prefix("www.") {
        domain = stripped.to_string();
    }
    Ok(domain.trim_matches('.').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_schemed_urls() {
        assert!(validate_target("http://example.com/path").is_ok());
        assert!(validate_target("ftp://example.com").is_ok());
    }

    #[test]
    fn rejects_missing_scheme_and_oversize() {
        assert!(matches!(
            validate_target("example.com/path"),
            Err(GridlinkError::BadUrl(_))
        ));
        let long = format!("http://e.com/{}", "a".repeat(MAX_URL_BYTES));
        assert!(matches!(
            validate_target(&long),
            Err(GridlinkError::BadUrl(_))
        ));
    }

    #[test]
    fn canonicalizes_domains() {
        assert_eq!(
            canonical_domain("http://WWW.Example.COM:8080/x").unwrap(),
            "example.com"
        );
        assert_eq!(
            canonical_domain("https://www.www.host.org./y?z=1").unwrap(),
            "host.org"
        );
        assert_eq!(canonical_domain("http://plain.net/").unwrap(), "plain.net");
    }

    #[test]
    fn rejects_hostless_urls() {
        assert!(canonical_domain("data:text/plain,hello").is_err());
    }
}
