//! Query and origin-cookie validation shared by the relay endpoints.

use axum_extra::extract::CookieJar;
use http::{HeaderMap, header};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::errors::Error;

/// Returns the validated value of the origin cookie from a request.
///
/// The value must contain `"://"` as a syntactic sanity check.
// TODO: Improve validation, current logic is just a Proof of Concept.
pub(crate) fn origin(jar: &CookieJar, name: &str) -> Result<String, Error> {
    if name.is_empty() {
        return Err(Error::BadOrigin);
    }
    let cookie = jar.get(name).ok_or(Error::BadOrigin)?;
    if !cookie.value().contains("://") {
        return Err(Error::BadOrigin);
    }
    Ok(cookie.value().to_owned())
}

/// Whether the request's `Origin` header matches the validated cookie value.
///
/// WebSocket upgrades are pinned to the origin the cookie was minted for.
pub(crate) fn origin_matches(headers: &HeaderMap, origin: &str) -> bool {
    headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
        == Some(origin)
}

/// Raw query parameters of `/proxy` and `/v4/connect`.
#[derive(Debug, Deserialize)]
pub(crate) struct DialQuery {
    pub(crate) host: String,
    pub(crate) port: String,
}

impl DialQuery {
    /// Validates the parameters and joins them into a dialable address.
    pub(crate) fn addr(&self) -> Result<String, Error> {
        if self.host.is_empty() || self.port.is_empty() {
            return Err(Error::BadRequest);
        }
        Ok(join_host_port(&self.host, &self.port))
    }
}

/// Joins a host and port, bracketing IPv6 literals.
fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// Raw query parameters of `/connect`.
///
/// Session resumption is not supported: `ack` and `pos` must be zero. `try`
/// is validated as unsigned but otherwise reserved.
#[derive(Debug, Deserialize)]
pub(crate) struct ConnectQuery {
    pub(crate) sid: String,
    pub(crate) ack: String,
    pub(crate) pos: String,
    #[serde(rename = "try")]
    pub(crate) retry: String,
}

impl ConnectQuery {
    /// Validates the parameters, returning the requested session id.
    pub(crate) fn sid(&self) -> Result<Uuid, Error> {
        let sid = Uuid::try_parse(&self.sid).map_err(|_| Error::BadRequest)?;
        if self.ack.parse::<u64>().map_err(|_| Error::BadRequest)? != 0 {
            return Err(Error::BadRequest);
        }
        if self.pos.parse::<u64>().map_err(|_| Error::BadRequest)? != 0 {
            return Err(Error::BadRequest);
        }
        self.retry.parse::<u64>().map_err(|_| Error::BadRequest)?;
        Ok(sid)
    }
}

#[cfg(test)]
mod tests {
    use axum_extra::extract::cookie::Cookie;

    use super::*;

    fn jar(name: &str, value: &str) -> CookieJar {
        CookieJar::new().add(Cookie::new(name.to_owned(), value.to_owned()))
    }

    #[test]
    fn valid_origin_cookie_is_returned() {
        let jar = jar("origin", "chrome-extension://foo");
        assert_eq!(origin(&jar, "origin").unwrap(), "chrome-extension://foo");
    }

    #[test]
    fn missing_cookie_is_rejected() {
        let jar = jar("other", "chrome-extension://foo");
        assert_eq!(origin(&jar, "origin").unwrap_err(), Error::BadOrigin);
    }

    #[test]
    fn empty_cookie_name_is_rejected() {
        let jar = jar("origin", "chrome-extension://foo");
        assert_eq!(origin(&jar, "").unwrap_err(), Error::BadOrigin);
    }

    #[test]
    fn origin_without_scheme_separator_is_rejected() {
        let jar = jar("origin", "foo.example.org");
        assert_eq!(origin(&jar, "origin").unwrap_err(), Error::BadOrigin);
    }

    #[test]
    fn dial_query_requires_host_and_port() {
        let query = DialQuery {
            host: String::new(),
            port: "22".to_owned(),
        };
        assert_eq!(query.addr().unwrap_err(), Error::BadRequest);
        let query = DialQuery {
            host: "127.0.0.1".to_owned(),
            port: String::new(),
        };
        assert_eq!(query.addr().unwrap_err(), Error::BadRequest);
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        assert_eq!(join_host_port("::1", "22"), "[::1]:22");
        assert_eq!(join_host_port("127.0.0.1", "22"), "127.0.0.1:22");
    }

    fn connect_query(sid: &str, ack: &str, pos: &str, retry: &str) -> ConnectQuery {
        ConnectQuery {
            sid: sid.to_owned(),
            ack: ack.to_owned(),
            pos: pos.to_owned(),
            retry: retry.to_owned(),
        }
    }

    #[test]
    fn connect_query_accepts_fresh_sessions() {
        let sid = Uuid::new_v4();
        let query = connect_query(&sid.to_string(), "0", "0", "1");
        assert_eq!(query.sid().unwrap(), sid);
    }

    #[test]
    fn connect_query_rejects_resumption() {
        let sid = Uuid::new_v4().to_string();
        assert!(connect_query(&sid, "1", "0", "1").sid().is_err());
        assert!(connect_query(&sid, "0", "1", "1").sid().is_err());
    }

    #[test]
    fn connect_query_rejects_malformed_params() {
        let sid = Uuid::new_v4().to_string();
        assert!(connect_query("not-a-uuid", "0", "0", "1").sid().is_err());
        assert!(connect_query(&sid, "x", "0", "1").sid().is_err());
        assert!(connect_query(&sid, "0", "0", "-1").sid().is_err());
    }
}
