//! Click-identifier helpers for the platform's first-party cookies.
//!
//! `fbc` carries the click id captured from an ad click-through, `fbp`
//! identifies the browser. Both follow the same dotted layout:
//! `fb.<subdomain_index>.<creation_time_millis>.<payload>`.

const COOKIE_PREFIX: &str = "fb";

/// Index of the subdomain the cookie was set on: `com` -> 0,
/// `example.com` -> 1, `www.example.com` -> 2.
fn subdomain_index(domain: Option<&str>) -> u32 {
    match domain.map(|d| d.split('.').filter(|part| !part.is_empty()).count()) {
        Some(1) => 0,
        Some(n) if n >= 3 => 2,
        // One dot, or no usable domain at all.
        _ => 1,
    }
}

/// Build the composite `fbc` value from a raw click id.
///
/// Returns `None` for an empty click id. The creation-time segment is in
/// epoch milliseconds; the platform silently drops click attribution when
/// it is given seconds instead.
pub fn format_click_id(raw_click_id: &str, domain: Option<&str>, now_millis: i64) -> Option<String> {
    let raw_click_id = raw_click_id.trim();
    if raw_click_id.is_empty() {
        return None;
    }

    Some(format!(
        "{}.{}.{}.{}",
        COOKIE_PREFIX,
        subdomain_index(domain),
        now_millis,
        raw_click_id
    ))
}

/// Check the shape of a browser-supplied `fbp`/`fbc` cookie value: four
/// dot-separated segments, `fb` prefix, numeric subdomain-index and
/// creation-time segments. Malformed values must be dropped rather than
/// forwarded, one bad optional field can get the whole event rejected.
pub fn is_valid_browser_cookie(value: &str) -> bool {
    let segments: Vec<&str> = value.split('.').collect();
    if segments.len() != 4 {
        return false;
    }

    segments[0] == COOKIE_PREFIX
        && segments[1].parse::<u32>().is_ok()
        && segments[2].parse::<i64>().is_ok_and(|millis| millis > 0)
        && !segments[3].is_empty()
}
