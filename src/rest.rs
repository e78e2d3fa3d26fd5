//! One-shot HTTP fetches: the snapshot pulls that reconcile the streaming
//! state, and the signed private calls.

use anyhow::Result;

use crate::error::ApiError;
use crate::message::{ApiReply, FullDepth, HistoryTrade, RawFullDepth, RawTradeList};
use crate::signer::Signer;
use crate::utils::config::Config;

/// Host of the HTTP API.
pub const HTTP_HOST: &str = "mtgox.com";

fn http_base(config: &Config) -> String {
    let scheme = if config.get_bool("gox", "use_ssl") {
        "https"
    } else {
        "http"
    };

    format!("{scheme}://{HTTP_HOST}")
}

/// Fetch the full market depth snapshot for one currency pair.
///
/// # Errors
///
/// Will return [`reqwest::Error`] if the request fails or the reply is not
/// the expected JSON shape.
pub async fn fetch_fulldepth(config: &Config, currency: &str) -> Result<FullDepth> {
    let client = reqwest::Client::new();

    let raw = client
        .get(format!("{}/api/1/BTC{currency}/fulldepth", http_base(config)))
        .send()
        .await?
        .json::<RawFullDepth>()
        .await?;

    Ok(FullDepth::try_from(&raw)?)
}

/// Fetch the recent public trades for one currency pair, oldest first.
///
/// # Errors
///
/// Will return [`reqwest::Error`] if the request fails, or
/// [`ApiError::CallFailed`] if the exchange reports a non-success result.
pub async fn fetch_history(config: &Config, currency: &str) -> Result<Vec<HistoryTrade>> {
    let client = reqwest::Client::new();

    let raw = client
        .get(format!("{}/api/1/BTC{currency}/trades", http_base(config)))
        .send()
        .await?
        .json::<RawTradeList>()
        .await?;

    if raw.result != "success" {
        anyhow::bail!(ApiError::CallFailed(raw.result));
    }

    Ok(raw
        .ret
        .iter()
        .map(HistoryTrade::try_from)
        .collect::<Result<_, _>>()?)
}

/// Send a signed request to the HTTP API and return the `return` payload
/// of its reply. The form body gets a fresh nonce appended and is
/// HMAC-SHA-512 signed as raw bytes.
///
/// # Errors
///
/// Will return [`ApiError::InvalidCredential`] without a loaded secret,
/// [`reqwest::Error`] on transport failure, or [`ApiError::CallFailed`]
/// when the exchange reports a non-success result.
pub async fn http_signed_call(
    config: &Config,
    signer: &Signer,
    api_endpoint: &str,
    params: &[(&str, String)],
) -> Result<serde_json::Value> {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in params {
        form.append_pair(key, value);
    }
    form.append_pair("nonce", &signer.next_nonce().to_string());
    let body = form.finish();

    let (rest_key, rest_sign) = signer.sign_request(&body)?;

    let client = reqwest::Client::new();
    let reply = client
        .post(format!("{}/api/1/{api_endpoint}", http_base(config)))
        .header(reqwest::header::USER_AGENT, "goxtool")
        .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("Rest-Key", rest_key)
        .header("Rest-Sign", rest_sign)
        .body(body)
        .send()
        .await?
        .json::<ApiReply>()
        .await?;

    if reply.result != "success" {
        anyhow::bail!(ApiError::CallFailed(
            reply.error.unwrap_or(reply.result)
        ));
    }

    reply
        .ret
        .ok_or_else(|| ApiError::MissingField("return").into())
}
