//! # Utility Functions
//!
//! Helpers shared across the service: identifier generation, blob key
//! construction, lenient date parsing for filters and CORS headers.
//!
//! ## Blob Key Layout
//!
//! ```text
//! {namespace}/{owner}/{YYYYMMDD}/{category}/{unique}-{file name}
//! ```
//!
//! The layout groups uploads by owner and day, and keeps the original file
//! name readable while the unique prefix prevents collisions.

use chrono::{DateTime, Duration, NaiveDate, SecondsFormat, Utc};
use uuid::Uuid;
use worker::Headers;

use crate::constants::{CORS_ALLOW_HEADERS, CORS_ALLOW_METHODS, CORS_ALLOW_ORIGIN};

/// Generates an opaque record identifier.
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generates a request id, prefixed by the current time so ids sort by arrival.
pub fn generate_request_id() -> String {
    format!("{}-{}", Utc::now().timestamp_millis(), Uuid::new_v4().simple())
}

/// Canonical text form of a timestamp. Fixed width, so lexical order is
/// chronological order.
pub fn format_timestamp(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Which end of a range a date bound describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundKind {
    Start,
    End,
}

/// Parses a user supplied date bound.
///
/// Accepts RFC 3339 instants (inclusive) and `YYYY-MM-DD` dates. A date used
/// as an end bound covers the whole day, so it is returned as the following
/// midnight with `inclusive = false`. Returns `None` on anything else.
pub fn parse_date_bound(text: &str, kind: BoundKind) -> Option<(DateTime<Utc>, bool)> {
    let text = text.trim();
    if let Some(instant) = parse_timestamp(text) {
        return Some((instant, true));
    }
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?.and_utc();
    match kind {
        BoundKind::Start => Some((midnight, true)),
        BoundKind::End => Some((midnight.checked_add_signed(Duration::days(1))?, false)),
    }
}

/// Generates a blob key for an uploaded file.
pub fn generate_blob_key(namespace: &str, owner: &str, file_name: &str, content_type: &str) -> String {
    let owner_safe = sanitize_path_component(owner);
    let owner_safe = if owner_safe.is_empty() {
        "anonymous".to_string()
    } else {
        owner_safe
    };
    let date = Utc::now().format("%Y%m%d").to_string();
    let category = categorize_content_type(content_type, file_name);
    let unique = Uuid::new_v4().simple().to_string();

    format!(
        "{}/{}/{}/{}/{}-{}",
        sanitize_path_component(namespace),
        owner_safe,
        date,
        category,
        &unique[..12],
        sanitize_filename(file_name)
    )
}

fn sanitize_path_component(component: &str) -> String {
    component
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
        .take(50)
        .collect::<String>()
        .to_lowercase()
}

/// Strips path separators and reserved characters from a file name.
pub fn sanitize_filename(filename: &str) -> String {
    let safe_chars: String = filename
        .trim()
        .chars()
        .filter(|c| !"/\\:*?\"<>|".contains(*c) && !c.is_control())
        .take(200)
        .collect();
    let safe_chars = safe_chars.trim_start_matches('.').to_string();

    if safe_chars.is_empty() {
        "unknown".to_string()
    } else {
        safe_chars
    }
}

const MODEL_EXTENSIONS: &[&str] = &["glb", "gltf", "obj", "fbx", "stl", "ply", "usdz", "3ds", "blend"];

/// Groups a content type into a coarse storage category. 3D models are
/// recognized by extension since browsers rarely send a meaningful MIME type.
pub fn categorize_content_type(content_type: &str, file_name: &str) -> &'static str {
    let content_type = content_type.to_lowercase();
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();

    if content_type.starts_with("model/") || MODEL_EXTENSIONS.contains(&extension.as_str()) {
        "model"
    } else if content_type.starts_with("image/") {
        "image"
    } else if content_type.starts_with("video/") {
        "video"
    } else if content_type.starts_with("audio/") {
        "audio"
    } else if content_type.starts_with("text/")
        || content_type.contains("json")
        || content_type.contains("pdf")
        || content_type.contains("document")
    {
        "document"
    } else {
        "other"
    }
}

/// Creates HTTP headers for Cross-Origin Resource Sharing (CORS) support.
pub fn cors_headers() -> Headers {
    let headers = Headers::new();
    // Note: These values are known to be valid
    let _ = headers.set("Access-Control-Allow-Origin", CORS_ALLOW_ORIGIN);
    let _ = headers.set("Access-Control-Allow-Methods", CORS_ALLOW_METHODS);
    let _ = headers.set("Access-Control-Allow-Headers", CORS_ALLOW_HEADERS);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn end_bound_on_last_representable_day_is_ignored() {
        assert_eq!(parse_date_bound("+262142-12-31", BoundKind::End), None);
        assert!(parse_date_bound("+262142-12-31", BoundKind::Start).is_some());
        assert!(parse_date_bound("9999-12-31", BoundKind::End).is_some());
    }

    #[test]
    fn date_bounds_accept_plain_dates_and_instants() {
        let (start, inclusive) = parse_date_bound("2024-03-05", BoundKind::Start).unwrap();
        assert_eq!(start, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
        assert!(inclusive);

        let (end, inclusive) = parse_date_bound("2024-03-05", BoundKind::End).unwrap();
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap());
        assert!(!inclusive);

        let (instant, inclusive) = parse_date_bound("2024-03-05T10:00:00+02:00", BoundKind::End).unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2024, 3, 5, 8, 0, 0).unwrap());
        assert!(inclusive);
    }

    #[test]
    fn malformed_date_bounds_are_none() {
        assert_eq!(parse_date_bound("05/03/2024", BoundKind::Start), None);
        assert_eq!(parse_date_bound("", BoundKind::End), None);
        assert_eq!(parse_date_bound("2024-13-40", BoundKind::Start), None);
    }

    #[test]
    fn timestamps_sort_lexically() {
        let a = format_timestamp(&Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        let b = format_timestamp(&Utc.with_ymd_and_hms(2024, 11, 2, 3, 4, 5).unwrap());
        assert!(a < b);
        assert_eq!(a, "2024-01-02T03:04:05.000Z");
        assert_eq!(parse_timestamp(&a), Some(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()));
    }

    #[test]
    fn blob_key_is_sanitized_and_categorized() {
        let key = generate_blob_key("uploads", "User/42", "../../etc/chair.glb", "application/octet-stream");
        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0], "uploads");
        assert_eq!(parts[1], "user42");
        assert_eq!(parts[3], "model");
        assert!(parts[4].ends_with("-etcchair.glb"));
        assert!(!key.contains(".."));
    }

    #[test]
    fn content_categories() {
        assert_eq!(categorize_content_type("image/png", "a.png"), "image");
        assert_eq!(categorize_content_type("application/pdf", "a.pdf"), "document");
        assert_eq!(categorize_content_type("model/gltf-binary", "a.bin"), "model");
        assert_eq!(categorize_content_type("application/zip", "a.zip"), "other");
    }
}
