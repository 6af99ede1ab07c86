use anyhow::Result;
use axum::http::HeaderMap;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use fleetcore::platform::{AccountId, Balance, CallContext, PublicKey};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const SECRET_ENV: &str = "FLEET_JWT_SECRET";
pub const DEPOSIT_HEADER: &str = "x-attached-deposit";
const TOKEN_TTL_SECS: i64 = 3600;

/// Token payload: `sub` is the caller's account, `pk` its signing key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub pk: String,
    pub exp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingToken,
    InvalidToken,
    Expired,
    BadDeposit,
}

impl AuthFailure {
    pub fn message(&self) -> &'static str {
        match self {
            AuthFailure::MissingToken => "bearer token required",
            AuthFailure::InvalidToken => "invalid bearer token",
            AuthFailure::Expired => "bearer token expired",
            AuthFailure::BadDeposit => "x-attached-deposit must be a yocto amount",
        }
    }
}

fn secret() -> Option<String> {
    std::env::var(SECRET_ENV).ok().filter(|s| !s.is_empty())
}

pub fn hs256_generate(sub: &str, public_key: &str) -> Result<String> {
    let Some(secret) = secret() else {
        anyhow::bail!("{SECRET_ENV} not set");
    };
    AccountId::parse(sub)?;
    PublicKey::parse(public_key)?;
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let claims = Claims {
        sub: sub.to_string(),
        pk: public_key.to_string(),
        exp: chrono::Utc::now().timestamp() + TOKEN_TTL_SECS,
    };
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signing_input = format!("{header}.{payload}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(signing_input.as_bytes());
    let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{signing_input}.{sig}"))
}

/// Checks shape, algorithm and signature. Does not look at the claims.
pub fn hs256_validate(token: &str) -> Result<bool> {
    let mut parts = token.split('.');
    let (header_b64, payload_b64, sig_b64) = match (parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s)) => (h, p, s),
        _ => return Ok(false),
    };
    if parts.next().is_some() {
        return Ok(false);
    }
    let header_json = URL_SAFE_NO_PAD.decode(header_b64)?;
    if !header_json.windows(5).any(|w| w == b"HS256") {
        return Ok(false);
    }
    let Some(secret) = secret() else {
        return Ok(false);
    };
    let signing_input = format!("{header_b64}.{payload_b64}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())?;
    mac.update(signing_input.as_bytes());
    let sig = mac.finalize().into_bytes();
    let provided = URL_SAFE_NO_PAD.decode(sig_b64).unwrap_or_default();
    Ok(provided.len() == sig.len()
        && ConstantTimeEq::ct_eq(provided.as_slice(), sig.as_slice()).into())
}

fn decode_claims(token: &str) -> Result<Claims> {
    let payload_b64 = token
        .split('.')
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("invalid token"))?;
    let bytes = URL_SAFE_NO_PAD.decode(payload_b64)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Builds the call context for a mutating request: who signed the token and
/// how much value the request carries.
pub fn caller_from_headers(headers: &HeaderMap) -> Result<CallContext, AuthFailure> {
    let token = bearer(headers).ok_or(AuthFailure::MissingToken)?;
    if !hs256_validate(token).unwrap_or(false) {
        return Err(AuthFailure::InvalidToken);
    }
    let claims = decode_claims(token).map_err(|_| AuthFailure::InvalidToken)?;
    if claims.exp <= chrono::Utc::now().timestamp() {
        return Err(AuthFailure::Expired);
    }
    let predecessor = AccountId::parse(claims.sub).map_err(|_| AuthFailure::InvalidToken)?;
    let signer = PublicKey::parse(claims.pk).map_err(|_| AuthFailure::InvalidToken)?;
    let deposit = match headers.get(DEPOSIT_HEADER) {
        None => Balance::ZERO,
        Some(value) => value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<Balance>().ok())
            .ok_or(AuthFailure::BadDeposit)?,
    };
    Ok(CallContext::new(predecessor, signer).with_deposit(deposit))
}
