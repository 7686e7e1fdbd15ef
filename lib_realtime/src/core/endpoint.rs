//! Primary and fallback feed URLs.
//!
//! The primary endpoint is a WebSocket URL built from a configured path and the
//! dashboard origin. The fallback is the same location spoken over HTTP, with
//! a trailing `ws` segment replaced by `/events`.

use url::Url;

use super::error::RealtimeError;
use super::transport::TransportMode;

/// Feed path used when none is configured.
pub const DEFAULT_ENDPOINT: &str = "/api/ws";

/// The pair of URLs the manager alternates between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// WebSocket URL.
    pub primary: Url,
    /// SSE URL.
    pub fallback: Url,
}

impl Endpoints {
    /// Resolves `endpoint` against the dashboard `origin` and derives the
    /// fallback from the result.
    pub fn resolve(endpoint: &str, origin: &Url) -> Result<Self, RealtimeError> {
        let primary = resolve_primary(endpoint, origin)?;
        let fallback = derive_fallback(&primary)?;
        Ok(Self { primary, fallback })
    }

    /// The URL used in `mode`.
    pub fn for_mode(&self, mode: TransportMode) -> &Url {
        match mode {
            TransportMode::Primary => &self.primary,
            TransportMode::Fallback => &self.fallback,
        }
    }
}

/// Builds the WebSocket URL.
///
/// Endpoints that already start with `ws` are taken as given. Anything else is
/// a path on the origin's host, with `wss` for an `https` origin and `ws`
/// otherwise.
pub fn resolve_primary(endpoint: &str, origin: &Url) -> Result<Url, RealtimeError> {
    if endpoint.starts_with("ws") {
        return parse(endpoint);
    }

    let scheme = if origin.scheme() == "https" { "wss" } else { "ws" };
    let host = origin
        .host_str()
        .ok_or_else(|| RealtimeError::MissingHost(origin.to_string()))?;
    let authority = match origin.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let path = if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{endpoint}")
    };

    parse(&format!("{scheme}://{authority}{path}"))
}

/// Maps a WebSocket URL onto its SSE counterpart.
pub fn derive_fallback(primary: &Url) -> Result<Url, RealtimeError> {
    let scheme = match primary.scheme() {
        "wss" => "https",
        "ws" => "http",
        other => return Err(RealtimeError::UnsupportedScheme(other.to_string())),
    };

    let mut fallback = primary.clone();
    fallback
        .set_scheme(scheme)
        .map_err(|()| RealtimeError::UnsupportedScheme(scheme.to_string()))?;

    let path = fallback.path().to_string();
    if let Some(stem) = path.strip_suffix("ws") {
        let stem = stem.strip_suffix('/').unwrap_or(stem);
        fallback.set_path(&format!("{stem}/events"));
    }
    Ok(fallback)
}

fn parse(raw: &str) -> Result<Url, RealtimeError> {
    Url::parse(raw).map_err(|source| RealtimeError::InvalidEndpoint {
        endpoint: raw.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn default_path_on_plain_origin() {
        let endpoints = Endpoints::resolve(DEFAULT_ENDPOINT, &origin("http://localhost:8000")).unwrap();
        assert_eq!(endpoints.primary.as_str(), "ws://localhost:8000/api/ws");
        assert_eq!(endpoints.fallback.as_str(), "http://localhost:8000/api/events");
    }

    #[test]
    fn secure_origin_maps_to_secure_schemes() {
        let endpoints = Endpoints::resolve("/api/ws", &origin("https://dash.example.com")).unwrap();
        assert_eq!(endpoints.primary.as_str(), "wss://dash.example.com/api/ws");
        assert_eq!(endpoints.fallback.as_str(), "https://dash.example.com/api/events");
    }

    #[test]
    fn absolute_ws_endpoint_is_used_as_given() {
        let endpoints = Endpoints::resolve("ws://feed.local:9000/live/ws", &origin("https://ignored.example")).unwrap();
        assert_eq!(endpoints.primary.as_str(), "ws://feed.local:9000/live/ws");
        assert_eq!(endpoints.fallback.as_str(), "http://feed.local:9000/live/events");
    }

    #[test]
    fn relative_path_gets_leading_slash() {
        let primary = resolve_primary("api/ws", &origin("http://127.0.0.1:8000")).unwrap();
        assert_eq!(primary.as_str(), "ws://127.0.0.1:8000/api/ws");
    }

    #[test]
    fn ws_suffix_without_separator_is_replaced() {
        let fallback = derive_fallback(&Url::parse("ws://host/feedws").unwrap()).unwrap();
        assert_eq!(fallback.as_str(), "http://host/feed/events");
    }

    #[test]
    fn path_without_ws_suffix_keeps_its_path() {
        let fallback = derive_fallback(&Url::parse("wss://host/stream").unwrap()).unwrap();
        assert_eq!(fallback.as_str(), "https://host/stream");
    }

    #[test]
    fn mode_selects_url() {
        let endpoints = Endpoints::resolve(DEFAULT_ENDPOINT, &origin("http://localhost:8000")).unwrap();
        assert_eq!(endpoints.for_mode(TransportMode::Primary).scheme(), "ws");
        assert_eq!(endpoints.for_mode(TransportMode::Fallback).scheme(), "http");
    }

    #[test]
    fn rejects_unusable_inputs() {
        assert!(matches!(
            Endpoints::resolve("wsx://host/ws", &origin("http://localhost")),
            Err(RealtimeError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            Endpoints::resolve("ws://", &origin("http://localhost")),
            Err(RealtimeError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            resolve_primary("/api/ws", &origin("data:text/plain,hello")),
            Err(RealtimeError::MissingHost(_))
        ));
    }
}
