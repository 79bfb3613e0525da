//! Local filename derivation from a URL.

/// Used when the URL path yields nothing usable.
pub const DEFAULT_FILENAME: &str = "download.bin";

/// Last non-empty path segment of `url`, percent-encoding left as is.
pub fn filename_from_url_path(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path().split('/').filter(|s| !s.is_empty()).last()?;
    if segment == "." || segment == ".." {
        return None;
    }
    Some(segment.to_string())
}

/// Replace path separators, NUL and control characters with `_`; trim dots and spaces.
pub fn sanitize_filename(name: &str) -> String {
    const NAME_MAX: usize = 255;
    let replaced: String = name
        .chars()
        .map(|c| {
            if c == '/' || c == '\\' || c == '\0' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();
    let trimmed = replaced.trim_matches(|c| c == ' ' || c == '.');
    let mut take = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(take) {
        take -= 1;
    }
    trimmed[..take].to_string()
}

/// Filename to save `url` under.
pub fn derive_filename(url: &str) -> String {
    match filename_from_url_path(url).map(|n| sanitize_filename(&n)) {
        Some(n) if !n.is_empty() => n,
        _ => DEFAULT_FILENAME.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_path_segment() {
        assert_eq!(
            filename_from_url_path("https://example.com/a/b/file.iso").as_deref(),
            Some("file.iso")
        );
        assert_eq!(
            filename_from_url_path("https://example.com/file.zip?token=abc").as_deref(),
            Some("file.zip")
        );
        assert_eq!(filename_from_url_path("https://example.com/"), None);
        assert_eq!(filename_from_url_path("not a url"), None);
    }

    #[test]
    fn sanitize_strips_separators_and_dots() {
        assert_eq!(sanitize_filename("a\\b\u{7}c.txt"), "a_b_c.txt");
        assert_eq!(sanitize_filename("  ..hidden.. "), "hidden");
        assert_eq!(sanitize_filename(&"é".repeat(200)).len(), 254);
    }

    #[test]
    fn derive_falls_back() {
        assert_eq!(derive_filename("https://example.com/debian.iso"), "debian.iso");
        assert_eq!(derive_filename("https://example.com"), DEFAULT_FILENAME);
        assert_eq!(derive_filename("https://example.com/..."), DEFAULT_FILENAME);
    }
}
