//! Duplex endpoint resolution.
//!
//! The endpoint is derived from the dashboard's origin: same host and port,
//! `https` becomes `wss`, `http` becomes `ws`, at a fixed path.

use url::Url;

use crate::errors::EndpointError;

/// Default path of the realtime endpoint.
pub const DEFAULT_PATH: &str = "/ws";

/// Resolve the duplex endpoint for `origin` at `path`.
///
/// Origins already using `ws`/`wss` keep their scheme. Any path, query or
/// fragment on the origin is replaced.
pub fn resolve_endpoint(origin: &str, path: &str) -> Result<Url, EndpointError> {
    let mut url = Url::parse(origin).map_err(|source| EndpointError::InvalidOrigin {
        origin: origin.to_owned(),
        source,
    })?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => return Err(EndpointError::UnsupportedScheme(other.to_owned())),
    };
    if url.host_str().is_none_or(str::is_empty) {
        return Err(EndpointError::MissingHost(origin.to_owned()));
    }

    // http(s) and ws(s) are all special schemes, so switching between them
    // cannot fail.
    let _ = url.set_scheme(scheme);
    url.set_path(path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn https_upgrades_to_wss() {
        let url = resolve_endpoint("https://boot.example.com", DEFAULT_PATH).unwrap();
        assert_eq!(url.as_str(), "wss://boot.example.com/ws");
    }

    #[test]
    fn http_upgrades_to_ws_and_keeps_port() {
        let url = resolve_endpoint("http://10.0.0.5:8080", DEFAULT_PATH).unwrap();
        assert_eq!(url.as_str(), "ws://10.0.0.5:8080/ws");
    }

    #[test]
    fn page_path_and_query_are_replaced() {
        let url = resolve_endpoint("http://localhost:3000/clients?page=2#top", "/ws").unwrap();
        assert_eq!(url.as_str(), "ws://localhost:3000/ws");
    }

    #[test]
    fn ws_origin_is_kept() {
        let url = resolve_endpoint("wss://boot.local", "/realtime").unwrap();
        assert_eq!(url.as_str(), "wss://boot.local/realtime");
    }

    #[test]
    fn relative_path_is_rooted() {
        let url = resolve_endpoint("http://localhost", "ws").unwrap();
        assert_eq!(url.path(), "/ws");
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        assert_matches!(
            resolve_endpoint("ftp://boot.local", DEFAULT_PATH),
            Err(EndpointError::UnsupportedScheme(s)) if s == "ftp"
        );
    }

    #[test]
    fn garbage_origin_is_rejected() {
        assert_matches!(
            resolve_endpoint("not a url", DEFAULT_PATH),
            Err(EndpointError::InvalidOrigin { .. })
        );
    }
}
