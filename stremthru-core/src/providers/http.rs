//! Response classification shared by HTTP-backed provider clients.

use std::time::{Duration, SystemTime};

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

use super::error::ProviderError;

/// Parses a `Retry-After` value, either delta-seconds or an HTTP-date.
/// Dates in the past yield zero.
pub fn parse_retry_after(value: &HeaderValue, now: SystemTime) -> Option<Duration> {
    let raw = value.to_str().ok()?.trim();
    if let Ok(seconds) = raw.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = httpdate::parse_http_date(raw).ok()?;
    Some(at.duration_since(now).unwrap_or(Duration::ZERO))
}

pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| parse_retry_after(value, SystemTime::now()))
}

/// Maps a non-success status to the matching [`ProviderError`].
pub fn classify_status(status: StatusCode, headers: &HeaderMap, body: &str) -> Option<ProviderError> {
    if status.is_success() {
        return None;
    }
    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
            retry_after: retry_after(headers),
        },
        StatusCode::NOT_FOUND => ProviderError::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderError::InvalidCredentials,
        // Some upstreams signal overload with 503 and a Retry-After.
        StatusCode::SERVICE_UNAVAILABLE if headers.contains_key(RETRY_AFTER) => {
            ProviderError::RateLimited {
                retry_after: retry_after(headers),
            }
        }
        other => ProviderError::Api {
            status: other.as_u16(),
            message: body.chars().take(512).collect(),
        },
    })
}

/// Passes successful responses through and converts the rest.
pub async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &headers, &body).unwrap_or(ProviderError::Api {
        status: status.as_u16(),
        message: body,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_seconds() {
        let value = HeaderValue::from_static("120");
        assert_eq!(
            parse_retry_after(&value, SystemTime::now()),
            Some(Duration::from_secs(120))
        );
    }

    #[test]
    fn http_date_relative_to_now() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_445_412_480);
        let value = HeaderValue::from_static("Wed, 21 Oct 2015 07:28:30 GMT");
        assert_eq!(parse_retry_after(&value, now), Some(Duration::from_secs(30)));

        let later = now + Duration::from_secs(3600);
        assert_eq!(parse_retry_after(&value, later), Some(Duration::ZERO));
    }

    #[test]
    fn garbage_is_ignored() {
        let value = HeaderValue::from_static("soon");
        assert_eq!(parse_retry_after(&value, SystemTime::now()), None);
    }

    #[test]
    fn status_mapping() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

        assert!(classify_status(StatusCode::OK, &headers, "").is_none());
        match classify_status(StatusCode::TOO_MANY_REQUESTS, &headers, "") {
            Some(ProviderError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)))
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, &HeaderMap::new(), ""),
            Some(ProviderError::InvalidCredentials)
        ));
        assert!(matches!(
            classify_status(StatusCode::SERVICE_UNAVAILABLE, &HeaderMap::new(), "down"),
            Some(ProviderError::Api { status: 503, .. })
        ));
    }
}
