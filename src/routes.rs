//! HTTP front-door (§4.7, C7). A single wildcard path carries every public
//! action: `/{passkey}/{action}`. Dispatch on `action` rather than giving
//! each verb its own route, since all four share the same passkey-in-path
//! shape and none of them are safe to expose as separate axum extractors
//! without duplicating the parse.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, RawQuery, State};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::tracker::passkey::Passkey;
use crate::tracker::Tracker;
use crate::{announce, control, report, scrape};

pub fn routes() -> Router<Arc<Tracker>> {
    Router::new()
        .route("/", get(|| async { "Nothing to see here." }))
        .route("/{passkey}/{action}", get(dispatch))
}

async fn dispatch(
    State(tracker): State<Arc<Tracker>>,
    Path((passkey, action)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Response {
    let query = query.unwrap_or_default();

    if query.is_empty() {
        return "Nothing to see here.".into_response();
    }

    match action.as_str() {
        "announce" => {
            let Ok(passkey) = passkey.parse::<Passkey>() else {
                return "Invalid action.".into_response();
            };
            announce::handle(&tracker, passkey, &query, addr.ip())
                .await
                .into_response()
        }
        "scrape" => scrape::handle(&tracker, &query).into_response(),
        "update" => {
            if !authorized(&tracker, &passkey) {
                return "Invalid action.".into_response();
            }
            let params = parse_params(&query);
            control::dispatch(&tracker, &params).await.into_response()
        }
        "report" => {
            if !authorized(&tracker, &passkey) {
                return "Invalid action.".into_response();
            }
            let params = parse_params(&query);
            report::handle(&tracker, &params).into_response()
        }
        _ => "Invalid action.".into_response(),
    }
}

/// The control and report surfaces aren't per-user: they're gated on the
/// `gazelle.site_password` shared secret instead of a minted per-user
/// announce/scrape passkey, so it's compared as a plain string.
fn authorized(tracker: &Arc<Tracker>, passkey: &str) -> bool {
    !tracker.config.site_password.is_empty() && passkey == tracker.config.site_password
}

fn parse_params(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&') {
        let mut parts = pair.splitn(2, '=');
        let Some(key) = parts.next() else { continue };
        if key.is_empty() {
            continue;
        }
        let value = parts.next().unwrap_or("");
        params.insert(key.to_owned(), value.to_owned());
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_params_splits_on_ampersand_and_equals() {
        let params = parse_params("action=add_token&info_hash=abc&empty");
        assert_eq!(params.get("action").map(String::as_str), Some("add_token"));
        assert_eq!(params.get("info_hash").map(String::as_str), Some("abc"));
        assert_eq!(params.get("empty").map(String::as_str), Some(""));
    }
}
