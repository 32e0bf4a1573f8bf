//! Cookie Server client.
//!
//! Fetches the relay endpoint this client is steered to, together with the
//! cookies the relay expects on the WebSocket upgrade.

use relay_types::redirect::Redirect;
use reqwest::header::SET_COOKIE;

use crate::Error;

/// The relay endpoint and cookies a Cookie Server steered us to.
#[derive(Clone, Debug)]
pub struct Steering {
    /// The relay to connect to, as `host:port`.
    pub endpoint: String,
    /// A `Cookie` header value carrying the cookies the Cookie Server set.
    pub cookies: Option<String>,
}

/// Asks the Cookie Server where to connect.
///
/// The response body is an XSSI-guarded JSON [`Redirect`]; the response's
/// `Set-Cookie` headers are folded into a single `Cookie` header value for
/// the later upgrade request.
pub async fn fetch_steering(url: &str) -> Result<Steering, Error> {
    tracing::debug!("requesting relay endpoint from {url}");
    let response = reqwest::get(url).await?.error_for_status()?;
    let cookies = cookie_header(
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok()),
    );
    let redirect = Redirect::from_xssi_json(&response.bytes().await?)?;
    if let Some(err) = redirect.error {
        return Err(Error::CookieServer(err));
    }
    tracing::debug!("steered to relay {}", redirect.endpoint);
    Ok(Steering {
        endpoint: redirect.endpoint,
        cookies,
    })
}

/// Folds `Set-Cookie` values into a single `Cookie` header value, dropping
/// the cookie attributes.
fn cookie_header<'a>(set_cookies: impl Iterator<Item = &'a str>) -> Option<String> {
    let pairs: Vec<&str> = set_cookies
        .filter_map(|cookie| cookie.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}
