//! A single HTTP round-trip against one directory endpoint.
//!
//! Kept separate from [`super::Fetcher`]'s retry/batching logic so that the
//! retry loop can stay agnostic to the HTTP client details, the same
//! separation `tor_dirclient` draws between `request.rs` (what to ask for)
//! and the lower-level connection handling.

use std::time::Duration;

use http::Uri;
use hyper::client::HttpConnector;
use hyper::Client;

use super::err::RequestError;

/// A plain (non-TLS) HTTP/1.1 client, matching `arti_hyper`'s use of
/// `hyper::Client` for requests that do not need to run over a Tor circuit
/// (directory documents are fetched in the clear, over plain TCP, by
/// design — see `SPEC_FULL.md` §10's note on the Fetcher's transport).
pub type HttpClient = Client<HttpConnector>;

/// Build a plain HTTP client suitable for directory requests.
pub fn build_client() -> HttpClient {
    Client::builder().build_http()
}

/// Issue a single `GET` request against `uri` and return the response body
/// bytes, subject to `timeout`.
///
/// Any non-2xx status, network error, or timeout is reported as a
/// [`RequestError`]; the caller (the retry loop in
/// [`super::Fetcher`]) decides whether to advance to the next endpoint.
pub async fn get(client: &HttpClient, uri: Uri, timeout: Duration) -> Result<Vec<u8>, RequestError> {
    let request_fut = client.get(uri);
    let response = match tokio::time::timeout(timeout, request_fut).await {
        Ok(Ok(resp)) => resp,
        Ok(Err(e)) => return Err(RequestError::Network(e)),
        Err(_elapsed) => return Err(RequestError::Timeout(timeout)),
    };

    if !response.status().is_success() {
        return Err(RequestError::HttpStatus(response.status()));
    }

    let body_fut = hyper::body::to_bytes(response.into_body());
    let body = match tokio::time::timeout(timeout, body_fut).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => return Err(RequestError::Body(e)),
        Err(_elapsed) => return Err(RequestError::Timeout(timeout)),
    };

    Ok(body.to_vec())
}

/// Build a `Uri` for `path` against `host:port`.
pub fn build_uri(host: &str, port: u16, path: &str) -> Uri {
    format!("http://{host}:{port}{path}")
        .parse()
        .expect("host/port/path always form a well-formed URI")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn build_uri_formats_correctly() {
        let uri = build_uri("127.0.0.1", 9030, "/tor/server/d/ABCD");
        assert_eq!(uri.to_string(), "http://127.0.0.1:9030/tor/server/d/ABCD");
    }
}
