// src/services/api_server.rs
//! API Server for the consent vault
//!
//! A thin JSON surface over [`ConsentVault`]. Handlers only parse requests,
//! call one vault operation and render the outcome; every rule lives in the
//! vault and its services.
//!
//! Endpoints:
//! - identity: signup, challenge login, DID resolution
//! - credential submission
//! - disclosure requests (value, predicate, file) and token redemption
//! - token table and revocation
//! - share recovery and blob retrieval
//! - verifiable credential signing and verification

use crate::error::{AuthFailure, ConsentError, DenialReason};
use crate::models::credential::{Credential, VerifiableCredential};
use crate::models::token::{AccessToken, Disclosure, Operator};
use crate::services::authenticator::VerifiedSubject;
use crate::services::consent::{ConsentVault, FileUpload};
use crate::services::disclosure::parse_comparand;
use crate::services::session::SessionIssuer;
use crate::services::token_ledger::parse_ttl_field;
use crate::sharing::SecretShare;
use crate::utils::serialization::{decode_base64, encode_base64};
use axum::{
    extract::{Json, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{NaiveDate, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

// API request and response structures

/// Request payload for starting a login
#[derive(Serialize, Deserialize)]
struct LoginRequest {
    did: String,
}

/// Request payload for answering a login challenge.
///
/// Either `signature` (hex, produced client-side over the nonce) or
/// `private_key` (hex, self-custody demo) must be present.
#[derive(Serialize, Deserialize)]
struct VerifyRequest {
    did: String,
    nonce: String,
    #[serde(default)]
    signature: Option<String>,
    #[serde(default)]
    private_key: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct VerifyResponse {
    did: String,
    session: String,
}

/// Request payload for submitting the subject's attested attributes
#[derive(Serialize, Deserialize)]
struct UserDataRequest {
    name: String,
    /// `YYYY-MM-DD`
    date_of_birth: String,
    gender: String,
    national_id: String,
}

/// TTL as sent by a form: a number or a string. Blank means the default,
/// `0` means never.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum TtlField {
    Seconds(i64),
    Raw(String),
}

impl TtlField {
    fn raw(&self) -> String {
        match self {
            TtlField::Seconds(s) => s.to_string(),
            TtlField::Raw(s) => s.clone(),
        }
    }
}

/// Request payload for a disclosure, tagged by `mode`
#[derive(Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
enum AccessRequest {
    Value {
        field: String,
        #[serde(default)]
        ttl_seconds: Option<TtlField>,
    },
    Predicate {
        op: String,
        field: String,
        value: String,
        #[serde(default)]
        ttl_seconds: Option<TtlField>,
    },
    File {
        #[serde(default)]
        file_name: Option<String>,
        content_base64: String,
        #[serde(default)]
        encrypt: bool,
        #[serde(default)]
        ttl_seconds: Option<TtlField>,
    },
}

#[derive(Serialize, Deserialize)]
struct TokenRequest {
    token: String,
}

/// Request payload for share recovery. With `content_address`, the blob is
/// also decrypted and returned.
#[derive(Serialize, Deserialize)]
struct ShamirRecoverRequest {
    shares: Vec<String>,
    #[serde(default)]
    content_address: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct VcSignRequest {
    subject: String,
    claims: Value,
}

/// Wraps a [`ConsentError`] so handlers can use `?`.
pub struct ApiError(ConsentError);

impl From<ConsentError> for ApiError {
    fn from(e: ConsentError) -> Self {
        ApiError(e)
    }
}

/// Stable machine-readable reason for an error.
pub fn reason_code(error: &ConsentError) -> &'static str {
    match error {
        ConsentError::NotFound(_) => "not_found",
        ConsentError::Forbidden(_) => "field_not_allowed",
        ConsentError::TypeMismatch(_) => "comparison_error",
        ConsentError::UnsupportedOperator(_) => "unsupported_op",
        ConsentError::Denied(DenialReason::Revoked) => "token_revoked",
        ConsentError::Denied(DenialReason::Expired) => "token_expired",
        ConsentError::InsufficientShares { .. } => "insufficient_shares",
        ConsentError::InvalidThreshold(_) => "invalid_threshold",
        ConsentError::MalformedShare(_) => "malformed_share",
        ConsentError::AuthFailed(AuthFailure::KeyMismatch) => "key_mismatch",
        ConsentError::AuthFailed(AuthFailure::BadSignature) => "bad_signature",
        ConsentError::AuthFailed(AuthFailure::UnknownChallenge) => "unknown_challenge",
        ConsentError::AuthFailed(AuthFailure::ChallengeExpired) => "challenge_expired",
        ConsentError::AuthFailed(AuthFailure::SessionInvalid) => "session_invalid",
        ConsentError::InvalidInput(_) => "invalid_input",
        ConsentError::Crypto(_) | ConsentError::Storage(_) | ConsentError::Serialization(_) => {
            "internal_error"
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ConsentError::NotFound(_) => StatusCode::NOT_FOUND,
            ConsentError::Forbidden(_) | ConsentError::Denied(_) => StatusCode::FORBIDDEN,
            ConsentError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            ConsentError::Crypto(_) | ConsentError::Storage(_) | ConsentError::Serialization(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("request failed: {}", self.0);
            "internal error".to_string()
        } else {
            self.0.to_string()
        };
        (
            status,
            Json(json!({ "error": message, "reason": reason_code(&self.0) })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// API server state containing all service dependencies
#[derive(Clone)]
pub struct ApiServer {
    /// Identity, credential, token and blob operations
    vault: Arc<ConsentVault>,

    /// Mints and checks bearer sessions after login
    sessions: Arc<SessionIssuer>,

    /// TTL applied when a disclosure request leaves the field blank
    default_ttl: TimeDelta,
}

impl ApiServer {
    /// Creates a new instance of the API server
    ///
    /// # Arguments
    /// * `vault` - The consent engine
    /// * `sessions` - Session token issuer
    /// * `default_ttl` - Lifetime of tokens requested with a blank TTL
    pub fn new(vault: Arc<ConsentVault>, sessions: SessionIssuer, default_ttl: TimeDelta) -> Self {
        ApiServer {
            vault,
            sessions: Arc::new(sessions),
            default_ttl,
        }
    }

    /// Builds the router with every endpoint and a CORS layer.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/signup", post(Self::signup_handler))
            .route("/login", post(Self::login_handler))
            .route("/verify", post(Self::verify_handler))
            .route("/resolve-did/:did", get(Self::resolve_did_handler))
            .route("/userdata", post(Self::userdata_handler))
            .route("/access-request", post(Self::access_request_handler))
            .route("/verify-access", post(Self::verify_access_handler))
            .route("/revoke-token", post(Self::revoke_token_handler))
            .route("/tokens", get(Self::tokens_handler))
            .route("/shamir/recover", post(Self::shamir_recover_handler))
            .route("/vc/sign", post(Self::vc_sign_handler))
            .route("/vc/verify", post(Self::vc_verify_handler))
            .route("/blobs/:address", get(Self::blob_handler))
            .layer(CorsLayer::permissive())
            .with_state(Arc::new(self.clone()))
    }

    /// Starts the API server and serves until the listener fails.
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:4000")
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        log::info!("API server listening on {}", addr);
        axum::serve(listener, self.router()).await
    }

    /// Resolves the bearer session on protected routes.
    fn authenticate(&self, headers: &HeaderMap) -> ApiResult<VerifiedSubject> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ConsentError::AuthFailed(AuthFailure::SessionInvalid))?;
        Ok(self.sessions.validate(token)?)
    }

    // =====================
    // Identity Handlers
    // =====================

    /// Registers a new identity
    ///
    /// # Endpoint
    /// POST /signup
    ///
    /// # Responses
    /// - 200 OK: `{did, public_key, private_key}` (hex keys)
    async fn signup_handler(State(state): State<Arc<ApiServer>>) -> ApiResult<impl IntoResponse> {
        let identity = state.vault.register()?;
        Ok(Json(identity))
    }

    /// Issues a login challenge
    ///
    /// # Endpoint
    /// POST /login
    ///
    /// # Responses
    /// - 200 OK: `{did, nonce, issued_at}`
    /// - 404 Not Found: unregistered DID
    async fn login_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<LoginRequest>,
    ) -> ApiResult<impl IntoResponse> {
        let challenge = state.vault.begin_login(&payload.did)?;
        Ok(Json(challenge))
    }

    /// Answers a login challenge and returns a bearer session
    ///
    /// # Endpoint
    /// POST /verify
    ///
    /// # Responses
    /// - 200 OK: `{did, session}`
    /// - 401 Unauthorized: key mismatch, bad signature, unknown or expired challenge
    async fn verify_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<VerifyRequest>,
    ) -> ApiResult<impl IntoResponse> {
        let subject = match (&payload.signature, &payload.private_key) {
            (Some(signature), _) => {
                let signature = hex::decode(signature.trim())
                    .map_err(|_| ConsentError::AuthFailed(AuthFailure::BadSignature))?;
                state
                    .vault
                    .verify_login(&payload.did, &payload.nonce, &signature)?
            }
            (None, Some(private_key)) => {
                let private_key = zeroize::Zeroizing::new(
                    hex::decode(private_key.trim())
                        .map_err(|_| ConsentError::AuthFailed(AuthFailure::KeyMismatch))?,
                );
                state.vault.verify_login_with_private_key(
                    &payload.did,
                    &payload.nonce,
                    &private_key,
                )?
            }
            (None, None) => {
                return Err(ConsentError::InvalidInput(
                    "either signature or private_key is required".into(),
                )
                .into())
            }
        };

        let session = state.sessions.issue(&subject)?;
        Ok(Json(VerifyResponse {
            did: subject.did().to_string(),
            session,
        }))
    }

    /// Resolves a DID to its public document
    ///
    /// # Endpoint
    /// GET /resolve-did/:did
    async fn resolve_did_handler(
        Path(did): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> ApiResult<impl IntoResponse> {
        Ok(Json(state.vault.resolve(&did)?))
    }

    // =====================
    // Credential Handlers
    // =====================

    /// Stores the authenticated subject's attribute record
    ///
    /// # Endpoint
    /// POST /userdata (bearer session)
    ///
    /// The raw national identifier is hashed before storage and never echoed.
    async fn userdata_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Json(payload): Json<UserDataRequest>,
    ) -> ApiResult<impl IntoResponse> {
        let subject = state.authenticate(&headers)?;

        let date_of_birth = NaiveDate::parse_from_str(payload.date_of_birth.trim(), "%Y-%m-%d")
            .map_err(|_| {
                ConsentError::InvalidInput(format!(
                    "date_of_birth must be YYYY-MM-DD, got '{}'",
                    payload.date_of_birth
                ))
            })?;
        if payload.name.trim().is_empty() || payload.national_id.trim().is_empty() {
            return Err(ConsentError::InvalidInput("name and national_id are required".into()).into());
        }

        let credential = Credential::from_submission(
            payload.name.trim(),
            date_of_birth,
            payload.gender.trim(),
            &payload.national_id,
        );
        state.vault.submit_credential(subject.did(), credential.clone())?;
        Ok(Json(json!({ "did": subject.did(), "credential": credential })))
    }

    // =====================
    // Disclosure Handlers
    // =====================

    /// Issues an access token over one disclosure
    ///
    /// # Endpoint
    /// POST /access-request (bearer session)
    ///
    /// # Request Body
    /// `{"mode": "value" | "predicate" | "file", ...}` with an optional
    /// `ttl_seconds`: blank means the default lifetime, `0` means never expires.
    ///
    /// # Responses
    /// - 200 OK: token id, label, expiry, and for encrypted files the key shares
    /// - 403 Forbidden: field outside the allow-list
    /// - 400 Bad Request: bad operator, type mismatch, bad TTL, bad upload
    async fn access_request_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Json(payload): Json<AccessRequest>,
    ) -> ApiResult<impl IntoResponse> {
        let subject = state.authenticate(&headers)?;
        let ttl = |field: &Option<TtlField>| {
            let raw = field.as_ref().map(TtlField::raw);
            parse_ttl_field(raw.as_deref(), state.default_ttl)
        };

        let token = match payload {
            AccessRequest::Value { field, ttl_seconds } => {
                state
                    .vault
                    .request_value(subject.did(), &field, ttl(&ttl_seconds)?)?
            }
            AccessRequest::Predicate {
                op,
                field,
                value,
                ttl_seconds,
            } => {
                let operator: Operator = op.parse()?;
                let comparand = parse_comparand(field.trim(), operator, &value);
                state.vault.request_predicate(
                    subject.did(),
                    operator,
                    &field,
                    comparand,
                    ttl(&ttl_seconds)?,
                )?
            }
            AccessRequest::File {
                file_name,
                content_base64,
                encrypt,
                ttl_seconds,
            } => {
                let ttl = ttl(&ttl_seconds)?;
                let upload = FileUpload {
                    name: file_name,
                    bytes: decode_base64(&content_base64)?,
                };
                state
                    .vault
                    .request_file(subject.did(), upload, encrypt, ttl)?
            }
        };

        Ok(Json(issued_token_body(&token)))
    }

    /// Redeems a token on behalf of a relying party
    ///
    /// # Endpoint
    /// POST /verify-access
    ///
    /// # Responses
    /// - 200 OK: `{allowed: true, mode, ...payload}` or
    ///   `{allowed: false, reason: invalid_token | token_revoked | token_expired}`
    async fn verify_access_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<TokenRequest>,
    ) -> ApiResult<impl IntoResponse> {
        match state.vault.redeem(&payload.token) {
            Ok(disclosure) => {
                let mut body = serde_json::to_value(&disclosure).map_err(ConsentError::from)?;
                if let Some(fields) = body.as_object_mut() {
                    fields.insert("allowed".into(), Value::Bool(true));
                }
                Ok(Json(body))
            }
            Err(ConsentError::NotFound(_)) => {
                Ok(Json(json!({ "allowed": false, "reason": "invalid_token" })))
            }
            Err(e @ ConsentError::Denied(_)) => {
                Ok(Json(json!({ "allowed": false, "reason": reason_code(&e) })))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Revokes one of the session subject's tokens
    ///
    /// # Endpoint
    /// POST /revoke-token (bearer session)
    ///
    /// # Responses
    /// - 200 OK: `{token_id, revoked, revoked_at}`
    /// - 404 Not Found: unknown token, or one granted by another subject
    async fn revoke_token_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Json(payload): Json<TokenRequest>,
    ) -> ApiResult<impl IntoResponse> {
        let subject = state.authenticate(&headers)?;
        let token = state.vault.revoke(subject.did(), &payload.token)?;
        Ok(Json(json!({
            "token_id": token.token_id,
            "revoked": token.revoked,
            "revoked_at": token.revoked_at,
        })))
    }

    /// Lists the session subject's tokens with their remaining lifetime
    ///
    /// # Endpoint
    /// GET /tokens (bearer session)
    async fn tokens_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
    ) -> ApiResult<impl IntoResponse> {
        let subject = state.authenticate(&headers)?;
        Ok(Json(state.vault.tokens(subject.did())))
    }

    // =====================
    // File Handlers
    // =====================

    /// Recovers a file key from shares, and optionally opens the file
    ///
    /// # Endpoint
    /// POST /shamir/recover
    ///
    /// # Responses
    /// - 200 OK: `{secret_hex}` plus `content_base64` when an address was given
    /// - 400 Bad Request: too few or malformed shares
    async fn shamir_recover_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<ShamirRecoverRequest>,
    ) -> ApiResult<impl IntoResponse> {
        let shares = payload
            .shares
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(str::parse::<SecretShare>)
            .collect::<Result<Vec<_>, _>>()?;

        let key = state.vault.recover_file_key(&shares)?;
        let mut body = json!({ "secret_hex": hex::encode(key.as_slice()) });
        if let Some(address) = payload.content_address {
            let plaintext = state.vault.open_file(&address, &shares)?;
            body["content_base64"] = Value::String(encode_base64(&plaintext));
        }
        Ok(Json(body))
    }

    /// Serves stored bytes by content address
    ///
    /// # Endpoint
    /// GET /blobs/:address
    async fn blob_handler(
        Path(address): Path<String>,
        State(state): State<Arc<ApiServer>>,
    ) -> ApiResult<impl IntoResponse> {
        let bytes = state.vault.fetch_blob(&address)?;
        Ok(([(header::CONTENT_TYPE, "application/octet-stream")], bytes))
    }

    // =====================
    // Verifiable Credential Handlers
    // =====================

    /// Signs a credential with the session subject's key
    ///
    /// # Endpoint
    /// POST /vc/sign (bearer session)
    async fn vc_sign_handler(
        State(state): State<Arc<ApiServer>>,
        headers: HeaderMap,
        Json(payload): Json<VcSignRequest>,
    ) -> ApiResult<impl IntoResponse> {
        let subject = state.authenticate(&headers)?;
        let vc = state
            .vault
            .sign_credential(&subject, &payload.subject, payload.claims)?;
        Ok(Json(vc))
    }

    /// Verifies a credential against its issuer's registered key
    ///
    /// # Endpoint
    /// POST /vc/verify
    async fn vc_verify_handler(
        State(state): State<Arc<ApiServer>>,
        Json(payload): Json<VerifiableCredential>,
    ) -> ApiResult<impl IntoResponse> {
        let valid = state.vault.verify_credential(&payload)?;
        Ok(Json(json!({ "valid": valid })))
    }
}

/// Response body for a freshly issued token. Value and predicate payloads stay
/// out of it; only redemption discloses them.
fn issued_token_body(token: &AccessToken) -> Value {
    let mut body = json!({
        "token_id": token.token_id,
        "mode": token.mode(),
        "label": token.payload.label(),
        "issued_at": token.issued_at,
        "expiry": token.expiry,
    });
    if let Disclosure::File(file) = &token.payload {
        body["content_address"] = json!(file.content_address);
        body["retrieval_locator"] = json!(file.retrieval_locator);
        body["encrypted"] = json!(file.encrypted);
        body["key_shares"] = json!(file.key_shares);
    }
    body
}
