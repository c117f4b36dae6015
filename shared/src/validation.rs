/// Input checks run before anything reaches yt-dlp's argument list.
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::errors::MediaError;

/// Allow-list for format identifiers passed to `yt-dlp -f`.
static FORMAT_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9+_-]+$").unwrap()
});

/// Whether `id` may be handed to yt-dlp as a format selector.
pub fn is_valid_format_id(id: &str) -> bool {
    !id.is_empty() && FORMAT_ID_RE.is_match(id)
}

/// Parse a submitted page URL. Requires an absolute http(s) URL with a host.
pub fn validate_page_url(raw: &str) -> Result<Url, MediaError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(MediaError::InvalidUrl("empty URL".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| MediaError::InvalidUrl(format!("{}: {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(MediaError::InvalidUrl(format!(
            "unsupported scheme {:?}",
            url.scheme()
        )));
    }
    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url),
        _ => Err(MediaError::InvalidUrl(format!("{}: missing host", raw))),
    }
}

/// Clean a filename hint for a `Content-Disposition` header.
pub fn sanitize_filename(hint: &str) -> String {
    let cleaned: String = hint
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' => '-',
            '"' | ';' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.').trim();

    if cleaned.is_empty() {
        "video.mp4".to_string()
    } else {
        cleaned.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_format_ids() {
        for id in ["18", "137+140", "hls-720p", "dash_audio", "bestvideo+bestaudio", "A-z_0+9"] {
            assert!(is_valid_format_id(id), "{} should be valid", id);
        }
    }

    #[test]
    fn test_rejected_format_ids() {
        for id in [
            "",
            "18; rm -rf /",
            "18 && echo hi",
            "18|cat",
            "$(id)",
            "18\n",
            "best[height<=720]",
            "--exec=id",
            "18 ",
        ] {
            assert!(!is_valid_format_id(id), "{:?} should be rejected", id);
        }
    }

    #[test]
    fn test_page_url_accepted() {
        let url = validate_page_url("  https://example.com/watch?v=abc ").unwrap();
        assert_eq!(url.host_str(), Some("example.com"));
    }

    #[test]
    fn test_page_url_rejected() {
        for raw in ["not-a-url", "", "/watch?v=abc", "file:///etc/passwd", "https://", "ftp://example.com/x"] {
            let err = validate_page_url(raw).unwrap_err();
            assert!(matches!(err, MediaError::InvalidUrl(_)), "{:?} -> {:?}", raw, err);
        }
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Demo.mp4"), "Demo.mp4");
        assert_eq!(sanitize_filename("a\"b;c.mp4"), "a_b_c.mp4");
        assert_eq!(sanitize_filename("../../etc/passwd"), "-..-etc-passwd");
        assert_eq!(sanitize_filename("line\r\nbreak.mp4"), "linebreak.mp4");
        assert_eq!(sanitize_filename("   "), "video.mp4");
        assert_eq!(sanitize_filename(""), "video.mp4");
    }
}
