use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::config::ServerConfig;

/// Claims the agent cares about; everything else rides along unchecked.
#[derive(Debug, Deserialize)]
struct AgentClaims {
    #[allow(dead_code)]
    sub: Option<String>,
    iss: String,
    #[allow(dead_code)]
    aud: JsonValue,
    #[allow(dead_code)]
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<JwkKey>,
}

#[derive(Debug, Deserialize)]
struct JwkKey {
    #[serde(default)]
    kid: Option<String>,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

/// Authenticate an RPC request: shared dev secret (constant-time) or an OIDC
/// bearer token validated against the issuer's JWKS.
pub async fn authenticate(headers: &HeaderMap, config: &ServerConfig) -> bool {
    if let Some(candidate) = headers
        .get("x-a2a-dev-secret")
        .and_then(|value| value.to_str().ok())
    {
        if let Some(expected) = config.dev_secret.as_deref() {
            if candidate.as_bytes().ct_eq(expected.as_bytes()).into() {
                info!(target: "app::rpc::auth", "authenticated via dev secret");
                return true;
            }
        }
        warn!(target: "app::rpc::auth", "dev secret mismatch");
        return false;
    }

    if let Some(token) = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    {
        return validate_oidc_token(token, config).await;
    }

    warn!(target: "app::rpc::auth", "no credentials presented");
    false
}

async fn validate_oidc_token(token: &str, config: &ServerConfig) -> bool {
    // Peek at the unverified payload for issuer routing; the signature is
    // verified below against that issuer's JWKS.
    let Some(issuer) = unverified_issuer(token) else {
        warn!(target: "app::rpc::auth", "token payload unreadable");
        return false;
    };
    let issuer = issuer.trim_end_matches('/').to_string();
    if !config.allowed_issuers.iter().any(|allowed| *allowed == issuer) {
        warn!(target: "app::rpc::auth", %issuer, "issuer not allow-listed");
        return false;
    }

    let header = match decode_header(token) {
        Ok(header) => header,
        Err(err) => {
            warn!(target: "app::rpc::auth", error = %err, "token header unreadable");
            return false;
        }
    };
    if header.alg != Algorithm::RS256 {
        warn!(target: "app::rpc::auth", alg = ?header.alg, "unsupported signing algorithm");
        return false;
    }

    let jwks_url = format!("{issuer}/.well-known/jwks.json");
    let jwks: Jwks = match reqwest::Client::new()
        .get(&jwks_url)
        .timeout(std::time::Duration::from_secs(10))
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
    {
        Ok(resp) => match resp.json().await {
            Ok(jwks) => jwks,
            Err(err) => {
                warn!(target: "app::rpc::auth", error = %err, "JWKS unparsable");
                return false;
            }
        },
        Err(err) => {
            warn!(target: "app::rpc::auth", error = %err, %jwks_url, "JWKS fetch failed");
            return false;
        }
    };

    let Some(key) = jwks
        .keys
        .iter()
        .find(|key| key.kid == header.kid && key.n.is_some() && key.e.is_some())
    else {
        warn!(target: "app::rpc::auth", kid = ?header.kid, "no matching JWK");
        return false;
    };

    let decoding_key = match DecodingKey::from_rsa_components(
        key.n.as_deref().unwrap_or_default(),
        key.e.as_deref().unwrap_or_default(),
    ) {
        Ok(key) => key,
        Err(err) => {
            warn!(target: "app::rpc::auth", error = %err, "JWK does not form a key");
            return false;
        }
    };

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[config.agent_id.as_str()]);
    validation.set_issuer(&[issuer.as_str()]);
    validation.validate_exp = true;

    match decode::<AgentClaims>(token, &decoding_key, &validation) {
        Ok(data) => {
            info!(
                target: "app::rpc::auth",
                subject = data.claims.sub.as_deref().unwrap_or("unknown"),
                "OIDC token validated"
            );
            true
        }
        Err(err) => {
            warn!(target: "app::rpc::auth", error = %err, "OIDC validation failed");
            false
        }
    }
}

fn unverified_issuer(token: &str) -> Option<String> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: JsonValue = serde_json::from_slice(&decoded).ok()?;
    claims
        .get("iss")
        .and_then(|iss| iss.as_str())
        .map(|iss| iss.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unverified_issuer_reads_payload() {
        let payload = URL_SAFE_NO_PAD.encode(r#"{"iss":"https://auth.example.com"}"#);
        let token = format!("aGVhZGVy.{payload}.c2ln");
        assert_eq!(
            unverified_issuer(&token).as_deref(),
            Some("https://auth.example.com")
        );
    }

    #[test]
    fn malformed_token_yields_none() {
        assert!(unverified_issuer("not-a-token").is_none());
        assert!(unverified_issuer("a.!!!.c").is_none());
    }
}
