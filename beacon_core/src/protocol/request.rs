/**
 * Request construction — turns a package into the URL and body the
 * transport sends.
 *
 * - POST: `base_url + path`, form-urlencoded body of the package
 *   parameters plus `sent_at` and (when non-zero) `queue_size`.
 * - GET (attribution): `attribution_url` with the package path, every
 *   parameter as a query pair, plus `sent_at`.
 */
use chrono::{DateTime, Local, TimeZone};
use url::form_urlencoded;
use url::Url;

use super::constants::{QUEUE_SIZE_PARAM, SENT_AT_PARAM};
use super::types::Event;
use crate::error::TransportError;

/**
 * Formats a send timestamp as `yyyy-MM-dd'T'HH:mm:ss.SSS'Z'Z`,
 * e.g. `2024-03-01T10:15:30.123Z+0100`.
 */
pub fn format_sent_at<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y-%m-%dT%H:%M:%S%.3fZ%z").to_string()
}

/// `sent_at` for a request leaving right now, in local time.
pub fn sent_at_now() -> String {
    format_sent_at(&Local::now())
}

/**
 * Full POST target for a package. The path is appended verbatim, so a
 * malformed path surfaces as an encoding failure.
 */
pub fn post_target(base_url: &str, event: &Event) -> Result<Url, TransportError> {
    let raw = format!("{}{}", base_url.trim_end_matches('/'), event.path);
    Url::parse(&raw).map_err(|e| TransportError::encoding(format!("{raw}: {e}")))
}

/// Form-urlencoded POST body.
pub fn post_body(event: &Event, queue_size: usize, sent_at: &str) -> String {
    let mut body = form_urlencoded::Serializer::new(String::new());
    body.extend_pairs(event.parameters.iter());
    body.append_pair(SENT_AT_PARAM, sent_at);
    if queue_size > 0 {
        body.append_pair(QUEUE_SIZE_PARAM, &queue_size.to_string());
    }
    body.finish()
}

/**
 * Attribution query URL: scheme and authority from `attribution_url`,
 * the package path, all parameters as query pairs, then `sent_at`.
 */
pub fn attribution_target(attribution_url: &Url, event: &Event, sent_at: &str) -> Url {
    let mut url = attribution_url.clone();
    url.set_path(&event.path);
    url.set_query(None);
    {
        let mut query = url.query_pairs_mut();
        query.extend_pairs(event.parameters.iter());
        query.append_pair(SENT_AT_PARAM, sent_at);
    }
    url
}
