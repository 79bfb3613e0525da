//! HTTP HEAD request for resource metadata.
//!
//! Fetches response headers to learn `Content-Length`, whether the server
//! honours `Range`, and the validators used as the resume identity.

use anyhow::{Context, Result};
use std::str;
use std::time::Duration;

/// Metadata needed before a segmented transfer can start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadInfo {
    pub content_length: Option<u64>,
    /// True if the server sent `Accept-Ranges: bytes`.
    pub accept_ranges: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

impl HeadInfo {
    /// Identity stored in the resume record: the URL plus the strongest validator.
    pub fn resource_identity(&self, url: &str) -> String {
        match (&self.etag, &self.last_modified) {
            (Some(etag), _) => format!("{} etag={}", url, etag),
            (None, Some(lm)) => format!("{} last-modified={}", url, lm),
            (None, None) => url.to_string(),
        }
    }
}

/// Performs a HEAD request (following redirects) and parses the final response's headers.
pub fn fetch_head(url: &str) -> Result<HeadInfo> {
    let mut headers: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.nobody(true)?;
    easy.follow_location(true)?;
    easy.connect_timeout(Duration::from_secs(15))?;
    easy.timeout(Duration::from_secs(30))?;

    {
        let mut transfer = easy.transfer();
        transfer.header_function(|data| {
            if let Ok(s) = str::from_utf8(data) {
                let line = s.trim_end();
                if line.starts_with("HTTP/") {
                    headers.clear();
                }
                headers.push(line.to_string());
            }
            true
        })?;
        transfer.perform().context("HEAD request failed")?;
    }

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("HEAD {} returned HTTP {}", url, code);
    }
    Ok(parse_headers(&headers))
}

pub(crate) fn parse_headers(lines: &[String]) -> HeadInfo {
    let mut info = HeadInfo::default();
    for line in lines {
        let Some((name, value)) = line.trim().split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            info.content_length = value.parse::<u64>().ok();
        } else if name.eq_ignore_ascii_case("accept-ranges") {
            info.accept_ranges = value.eq_ignore_ascii_case("bytes");
        } else if name.eq_ignore_ascii_case("etag") {
            info.etag = Some(value.trim_matches('"').to_string());
        } else if name.eq_ignore_ascii_case("last-modified") {
            info.last_modified = Some(value.to_string());
        }
    }
    info
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parse_length_and_ranges() {
        let r = parse_headers(&lines(&[
            "HTTP/1.1 200 OK",
            "Content-Length: 12345",
            "Accept-Ranges: bytes",
        ]));
        assert_eq!(r.content_length, Some(12345));
        assert!(r.accept_ranges);
        assert!(r.etag.is_none());
    }

    #[test]
    fn parse_validators() {
        let r = parse_headers(&lines(&[
            "ETag: \"abc-123\"",
            "Last-Modified: Wed, 21 Oct 2015 07:28:00 GMT",
            "Accept-Ranges: none",
        ]));
        assert_eq!(r.etag.as_deref(), Some("abc-123"));
        assert_eq!(r.last_modified.as_deref(), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert!(!r.accept_ranges);
    }

    #[test]
    fn identity_prefers_etag() {
        let mut info = HeadInfo {
            last_modified: Some("Wed".into()),
            ..HeadInfo::default()
        };
        assert_eq!(info.resource_identity("http://h/f"), "http://h/f last-modified=Wed");
        info.etag = Some("x1".into());
        assert_eq!(info.resource_identity("http://h/f"), "http://h/f etag=x1");
        assert_eq!(HeadInfo::default().resource_identity("u"), "u");
    }
}
