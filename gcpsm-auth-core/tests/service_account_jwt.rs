//! Integration tests for service account key token sources.
//!
//! These tests verify that a parsed service account key:
//! - Signs an RS256 assertion for the configured token endpoint
//! - Exchanges it with the JWT-bearer grant
//! - Surfaces token endpoint failures without retrying

use gcpsm_auth_core::{
    CLOUD_PLATFORM_ROLE, CredentialParser, JsonCredentialParser, SharedTokenSource, TokenError,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

const SERVICE_ACCOUNT_JSON: &str = include_str!("fixtures/service-account.json");
const SERVICE_ACCOUNT_PUBLIC_KEY: &str = include_str!("fixtures/service-account.pub.pem");
const CLIENT_EMAIL: &str = "secret-reader@example-project.iam.gserviceaccount.com";

#[derive(Debug, Deserialize)]
struct AssertionClaims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

/// Point the fixture key at `token_uri` and parse it.
fn token_source(token_uri: &str) -> SharedTokenSource {
    let mut key: serde_json::Value = serde_json::from_str(SERVICE_ACCOUNT_JSON).unwrap();
    key["token_uri"] = serde_json::Value::String(token_uri.to_string());
    let json = serde_json::to_vec(&key).unwrap();

    JsonCredentialParser::new(reqwest::Client::new())
        .parse_service_account_json(&json, CLOUD_PLATFORM_ROLE)
        .unwrap()
}

#[tokio::test]
async fn test_jwt_bearer_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains(
            "grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer",
        ))
        .and(body_string_contains("assertion="))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.service-account",
            "token_type": "Bearer",
            "expires_in": 3599
        })))
        .expect(1)
        .mount(&server)
        .await;

    let token_uri = format!("{}/token", server.uri());
    let token = token_source(&token_uri).token().await.unwrap();

    assert_eq!(token.access_token.expose(), "ya29.service-account");
    assert_eq!(token.token_type, "Bearer");
    assert!(token.expires_at.is_some());
    assert!(!token.is_expired());
}

#[tokio::test]
async fn test_assertion_is_signed_by_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.service-account",
            "expires_in": 3599
        })))
        .mount(&server)
        .await;

    let token_uri = format!("{}/token", server.uri());
    token_source(&token_uri).token().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let assertion = url::form_urlencoded::parse(&requests[0].body)
        .find(|(name, _)| name == "assertion")
        .map(|(_, value)| value.into_owned())
        .unwrap();

    let header = jsonwebtoken::decode_header(&assertion).unwrap();
    assert_eq!(header.alg, Algorithm::RS256);
    assert_eq!(header.kid.as_deref(), Some("0123456789abcdef"));

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[token_uri.as_str()]);
    validation.set_issuer(&[CLIENT_EMAIL]);
    let decoding_key = DecodingKey::from_rsa_pem(SERVICE_ACCOUNT_PUBLIC_KEY.as_bytes()).unwrap();
    let claims = jsonwebtoken::decode::<AssertionClaims>(&assertion, &decoding_key, &validation)
        .unwrap()
        .claims;

    assert_eq!(claims.iss, CLIENT_EMAIL);
    assert_eq!(claims.scope, CLOUD_PLATFORM_ROLE);
    assert_eq!(claims.aud, token_uri);
    assert_eq!(claims.exp - claims.iat, 3600);
}

#[tokio::test]
async fn test_token_endpoint_rejection() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = token_source(&format!("{}/token", server.uri()))
        .token()
        .await;

    match result {
        Err(TokenError::Endpoint { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected endpoint error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_token_endpoint_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let result = token_source(&format!("{}/token", server.uri()))
        .token()
        .await;

    assert!(matches!(result, Err(TokenError::MalformedResponse { .. })));
}
