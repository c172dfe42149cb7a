/// REST + SSE endpoints served by Axum.
///
/// All handlers receive `Arc<AppState>` via Axum's state extraction and
/// forward to the agent's modules.
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::agent::AppState;
use crate::connections::{ConnectionState, CreateInvitationOptions};
use crate::credentials::{CredentialAttributes, OfferCredentialOptions};
use crate::dids::{DidCreateOptions, ResolutionError};
use crate::error::{AgentError, RouteError, WithStep, api_error};
use crate::flows::issue_credential::{IssueCredentialRequest, create_verifiable_credential};
use crate::flows::verify_credential::verify_credential;
use crate::openid4vc::{CreateAuthorizationRequestOptions, CreateCredentialOfferOptions};

/// Message id returned by the unimplemented `/send-message` route.
pub const STUB_MESSAGE_ID: &str = "12345";

// ─── Request types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResolveDidParams {
    pub did: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCredentialBody {
    pub connection_id: Option<String>,
    pub attributes: Option<CredentialAttributes>,
    pub subject: Option<String>,
    pub claims: Option<Value>,
    pub issuer: Option<String>,
    pub expiration_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VerifyCredentialBody {
    pub credential: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiveInvitationBody {
    pub invitation_url: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageBody {
    pub connection_id: Option<String>,
    pub message: Option<String>,
}

fn required<T>(value: Option<T>, name: &str) -> Result<T, AgentError> {
    value.ok_or_else(|| AgentError::InvalidRequest(format!("{name} is required")))
}

/// A JSON request body as extracted, before it is decoded into a request type.
pub type JsonBody = Result<Option<Json<Value>>, JsonRejection>;

/// Decode a request body. An absent or `null` body is `T::default()`; every
/// other failure is a bad request.
fn parse_body<T: Default + DeserializeOwned>(body: JsonBody) -> Result<T, AgentError> {
    match body {
        Ok(None | Some(Json(Value::Null))) => Ok(T::default()),
        Ok(Some(Json(value))) => {
            serde_json::from_value(value).map_err(|e| AgentError::InvalidRequest(e.to_string()))
        }
        Err(rejection) => Err(AgentError::InvalidRequest(rejection.body_text())),
    }
}

// ─── Router ─────────────────────────────────────────────────────────────────

/// Build the application router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/create-did", post(create_did))
        .route("/resolve-did", get(resolve_did))
        .route("/dids", get(list_dids))
        .route("/create-invitation", get(create_invitation).post(create_invitation))
        .route("/receive-invitation", post(receive_invitation))
        .route("/connections", get(get_connections))
        .route("/issue-credential", post(issue_credential))
        .route("/credentials", get(list_credentials))
        .route("/verify-credential", post(verify_credential_handler))
        .route("/send-message", post(send_message))
        .route("/oid4vci/offers", post(create_credential_offer))
        .route(
            "/oid4vci/{issuer_id}/.well-known/openid-credential-issuer",
            get(issuer_metadata),
        )
        .route("/siop/authorization-requests", post(create_authorization_request))
        .route("/events/stream", get(event_stream))
        .with_state(state)
}

// ─── GET / ──────────────────────────────────────────────────────────────────

pub async fn index() -> &'static str {
    "Server is running"
}

// ─── POST /create-did ───────────────────────────────────────────────────────

pub async fn create_did(
    State(state): State<Arc<AppState>>,
    body: JsonBody,
) -> Result<Response, RouteError> {
    let options: DidCreateOptions = parse_body(body).step("create_did")?;
    let created = state.agent.dids.create(options).await.step("create_did")?;
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

// ─── GET /resolve-did?did= ──────────────────────────────────────────────────

pub async fn resolve_did(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ResolveDidParams>,
) -> Result<Response, RouteError> {
    let did = required(params.did.filter(|d| !d.trim().is_empty()), "did").step("resolve_did")?;
    let resolution = state.agent.dids.resolve(&did).await;
    let status = match resolution.did_resolution_metadata.error {
        None => StatusCode::OK,
        Some(ResolutionError::NotFound) => StatusCode::NOT_FOUND,
        Some(ResolutionError::InvalidDid | ResolutionError::UnsupportedDidMethod) => {
            StatusCode::BAD_REQUEST
        }
    };
    Ok((status, Json(resolution)).into_response())
}

// ─── GET /dids ──────────────────────────────────────────────────────────────

pub async fn list_dids(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.agent.dids.created_dids().await)
}

// ─── GET|POST /create-invitation ────────────────────────────────────────────

pub async fn create_invitation(
    State(state): State<Arc<AppState>>,
    body: JsonBody,
) -> Result<Response, RouteError> {
    let options: CreateInvitationOptions = parse_body(body).step("create_invitation")?;
    let created = state
        .agent
        .connections
        .create_invitation(options)
        .await
        .step("create_invitation")?;
    Ok(Json(created).into_response())
}

// ─── POST /receive-invitation ───────────────────────────────────────────────

pub async fn receive_invitation(
    State(state): State<Arc<AppState>>,
    body: JsonBody,
) -> Result<Response, RouteError> {
    let body: ReceiveInvitationBody = parse_body(body).step("receive_invitation")?;
    let url = required(body.invitation_url, "invitationUrl").step("receive_invitation")?;
    let connection = state
        .agent
        .connections
        .receive_invitation(&url, body.alias)
        .await
        .step("receive_invitation")?;
    Ok(Json(connection).into_response())
}

// ─── GET /connections ───────────────────────────────────────────────────────

pub async fn get_connections(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let states: HashMap<String, ConnectionState> = state.connection_states.read().await.clone();
    Json(states)
}

// ─── POST /issue-credential ─────────────────────────────────────────────────

/// `{connectionId, attributes}` sends a credential offer over a connection;
/// `{subject, claims}` issues a JWT-VC directly.
pub async fn issue_credential(
    State(state): State<Arc<AppState>>,
    body: JsonBody,
) -> Result<Response, RouteError> {
    let body: IssueCredentialBody = parse_body(body).step("issue_credential")?;
    match body {
        IssueCredentialBody {
            connection_id: Some(connection_id),
            attributes: Some(attributes),
            ..
        } => {
            debug!("Offering credential on connection {connection_id}");
            let record = state
                .agent
                .credentials
                .offer_credential(OfferCredentialOptions {
                    connection_id,
                    attributes: attributes.into_preview(),
                })
                .await
                .step("offer_credential")?;
            Ok(Json(record).into_response())
        }
        IssueCredentialBody {
            subject: Some(subject),
            claims: Some(claims),
            issuer,
            expiration_date,
            ..
        } => {
            let credential = create_verifiable_credential(
                &state.agent.dids,
                IssueCredentialRequest {
                    subject,
                    claims,
                    issuer,
                    expiration_date,
                },
            )
            .await
            .step("issue_credential")?;
            Ok(Json(credential).into_response())
        }
        _ => Err(AgentError::InvalidRequest(
            "connectionId and attributes (or subject and claims) are required".to_string(),
        ))
        .step("issue_credential"),
    }
}

// ─── GET /credentials ───────────────────────────────────────────────────────

pub async fn list_credentials(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.agent.credentials.credential_exchanges().await)
}

// ─── POST /verify-credential ────────────────────────────────────────────────

pub async fn verify_credential_handler(
    State(state): State<Arc<AppState>>,
    body: JsonBody,
) -> Result<Response, RouteError> {
    let body: VerifyCredentialBody = parse_body(body).step("verify_credential")?;
    let credential = required(body.credential, "credential").step("verify_credential")?;
    let result = verify_credential(&state.agent.dids, &credential)
        .await
        .step("verify_credential")?;
    Ok(Json(result).into_response())
}

// ─── POST /send-message ─────────────────────────────────────────────────────

/// Placeholder: basic messaging needs a DIDComm transport, so nothing is sent.
pub async fn send_message(body: JsonBody) -> Result<Response, RouteError> {
    let body: SendMessageBody = parse_body(body).step("send_message")?;
    if body.connection_id.is_none() {
        return Ok(api_error(StatusCode::BAD_REQUEST, "connectionId is required", Some("send_message")));
    }
    if body.message.as_deref().is_none_or(|m| m.trim().is_empty()) {
        return Ok(api_error(StatusCode::BAD_REQUEST, "message cannot be empty", Some("send_message")));
    }
    Ok(Json(json!({ "messageId": STUB_MESSAGE_ID, "status": "not_implemented" })).into_response())
}

// ─── POST /oid4vci/offers ───────────────────────────────────────────────────

pub async fn create_credential_offer(
    State(state): State<Arc<AppState>>,
    body: JsonBody,
) -> Result<Response, RouteError> {
    let options: CreateCredentialOfferOptions = parse_body(body).step("create_credential_offer")?;
    let created = state
        .agent
        .openid4vc_issuer
        .create_credential_offer(options)
        .await
        .step("create_credential_offer")?;
    Ok(Json(created).into_response())
}

// ─── GET /oid4vci/{issuer_id}/.well-known/openid-credential-issuer ──────────

pub async fn issuer_metadata(
    State(state): State<Arc<AppState>>,
    Path(issuer_id): Path<String>,
) -> Result<Response, RouteError> {
    let metadata = state
        .agent
        .openid4vc_issuer
        .issuer_metadata(&issuer_id)
        .await
        .step("issuer_metadata")?;
    Ok(Json(metadata).into_response())
}

// ─── POST /siop/authorization-requests ──────────────────────────────────────

pub async fn create_authorization_request(
    State(state): State<Arc<AppState>>,
    body: JsonBody,
) -> Result<Response, RouteError> {
    let options: CreateAuthorizationRequestOptions =
        parse_body(body).step("create_authorization_request")?;
    let created = state
        .agent
        .openid4vc_verifier
        .create_authorization_request(options)
        .await
        .step("create_authorization_request")?;
    Ok(Json(created).into_response())
}

// ─── GET /events/stream (SSE) ───────────────────────────────────────────────

pub async fn event_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.agent.events.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| match result {
        Ok(event) => {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some(Ok(Event::default().data(data).event(event.kind())))
        }
        Err(_) => None, // lagged receiver, skip
    });
    Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)).text("ping"))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::agent::initialise;
    use crate::config::AgentConfig;

    async fn app() -> (Router, Arc<AppState>) {
        let state = initialise(AgentConfig::default()).await.unwrap();
        (router(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        (status, value)
    }

    #[tokio::test]
    async fn test_index() {
        let (app, _) = app().await;
        let (status, body) = send(&app, "GET", "/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Server is running");
    }

    #[tokio::test]
    async fn test_not_found() {
        let (app, _) = app().await;
        let (status, _) = send(&app, "GET", "/nonexistent-path", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_resolve_did_requires_param() {
        let (app, _) = app().await;
        let (status, body) = send(&app, "GET", "/resolve-did", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "did is required");

        let (status, _) = send(&app, "GET", "/resolve-did?did=", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_create_and_resolve_did() {
        let (app, _) = app().await;
        let (status, created) = send(&app, "POST", "/create-did", None).await;
        assert_eq!(status, StatusCode::CREATED);
        let did = created["didState"]["did"].as_str().unwrap().to_string();

        let (status, resolved) = send(&app, "GET", &format!("/resolve-did?did={did}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved["didDocument"]["id"], did.as_str());

        let (status, dids) = send(&app, "GET", "/dids", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(dids.as_array().unwrap().len(), 1);

        let (status, resolved) = send(
            &app,
            "GET",
            "/resolve-did?did=did:indy:bcovrin:test:Th7MpTaRZVRYnPiabds81Y",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(resolved["didResolutionMetadata"]["error"], "notFound");
    }

    #[tokio::test]
    async fn test_create_did_unsupported_method() {
        let (app, _) = app().await;
        let (status, body) =
            send(&app, "POST", "/create-did", Some(json!({ "method": "indy" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["step"], "create_did");
    }

    #[tokio::test]
    async fn test_create_invitation() {
        let (app, _) = app().await;
        for method in ["GET", "POST"] {
            let (status, body) = send(&app, method, "/create-invitation", None).await;
            assert_eq!(status, StatusCode::OK);
            let url = url::Url::parse(body["invitationUrl"].as_str().unwrap()).unwrap();
            assert!(url.query_pairs().any(|(k, _)| k == "oob"));
            assert!(body["outOfBandRecord"].is_object());
            assert_eq!(body["outOfBandRecord"]["state"], "await-response");
        }
    }

    #[tokio::test]
    async fn test_connections_follow_events() {
        let (app, _) = app().await;
        let (_, invitation) = send(&app, "POST", "/create-invitation", None).await;
        let (status, connection) = send(
            &app,
            "POST",
            "/receive-invitation",
            Some(json!({ "invitationUrl": invitation["invitationUrl"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let connection_id = connection["id"].as_str().unwrap().to_string();

        // the map is filled asynchronously by the event tracker
        let mut connections = Value::Null;
        for _ in 0..50 {
            (_, connections) = send(&app, "GET", "/connections", None).await;
            if connections.get(&connection_id).is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(connections[&connection_id], "invitation-received");
    }

    #[tokio::test]
    async fn test_issue_credential_validation() {
        let (app, _) = app().await;
        for body in [
            json!({}),
            json!({ "connectionId": "abc" }),
            json!({ "attributes": { "name": "Alice" } }),
            json!({ "subject": "did:example:holder" }),
        ] {
            let (status, _) = send(&app, "POST", "/issue-credential", Some(body.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        }

        let (status, _) = send(
            &app,
            "POST",
            "/issue-credential",
            Some(json!({ "connectionId": "unknown", "attributes": { "name": "Alice" } })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bodyless_posts_are_bad_requests() {
        let (app, _) = app().await;
        for (uri, step) in [
            ("/issue-credential", "issue_credential"),
            ("/verify-credential", "verify_credential"),
            ("/send-message", "send_message"),
        ] {
            let (status, body) = send(&app, "POST", uri, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["step"], step, "{uri}");
        }

        // a body that is not declared as JSON
        let request = Request::builder()
            .method("POST")
            .uri("/issue-credential")
            .header(header::CONTENT_TYPE, "text/plain")
            .body(Body::from("subject=did:example:holder"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_wrongly_typed_fields_are_bad_requests() {
        let (app, _) = app().await;
        for body in [
            json!({ "connectionId": 7, "attributes": { "name": "Alice" } }),
            json!({ "connectionId": "c-1", "attributes": 42 }),
            json!({ "subject": "did:example:holder", "claims": {}, "expirationDate": "tomorrow" }),
        ] {
            let (status, response) = send(&app, "POST", "/issue-credential", Some(body.clone())).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(response["step"], "issue_credential");
        }

        let (status, _) = send(&app, "POST", "/send-message", Some(json!({ "connectionId": [] }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_offer_credential_over_connection() {
        let (app, _) = app().await;
        let (_, invitation) = send(&app, "POST", "/create-invitation", None).await;
        let (_, connection) = send(
            &app,
            "POST",
            "/receive-invitation",
            Some(json!({ "invitationUrl": invitation["invitationUrl"] })),
        )
        .await;

        let (status, record) = send(
            &app,
            "POST",
            "/issue-credential",
            Some(json!({
                "connectionId": connection["id"],
                "attributes": [{ "name": "name", "value": "Alice" }],
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["state"], "offer-sent");
        assert_eq!(record["protocolVersion"], "v2");

        let (_, records) = send(&app, "GET", "/credentials", None).await;
        assert_eq!(records.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_issue_and_verify_jwt_credential() {
        let (app, _) = app().await;

        // the first issuance creates the issuer DID
        let claims = json!({ "subject": "did:example:holder", "claims": { "degree": "BSc" } });
        let (status, credential) = send(&app, "POST", "/issue-credential", Some(claims)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(credential["proof"]["jwt"].is_string());
        let (_, dids) = send(&app, "GET", "/dids", None).await;
        assert_eq!(dids[0]["did"], credential["issuer"]["id"]);

        let (status, result) = send(
            &app,
            "POST",
            "/verify-credential",
            Some(json!({ "credential": credential })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["verified"], true);

        let (status, result) = send(
            &app,
            "POST",
            "/verify-credential",
            Some(json!({ "credential": "a.b.c" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(result["verified"], false);

        let (status, _) = send(&app, "POST", "/verify-credential", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_send_message_stub() {
        let (app, _) = app().await;
        let (status, _) = send(&app, "POST", "/send-message", Some(json!({ "message": "hi" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            "/send-message",
            Some(json!({ "connectionId": "c-1", "message": "hi" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messageId"], STUB_MESSAGE_ID);
    }

    #[tokio::test]
    async fn test_openid4vci_offer_and_metadata() {
        let (app, state) = app().await;
        let issuer = state.agent.openid4vc_issuer.default_issuer().await.unwrap();

        let (status, offer) = send(
            &app,
            "POST",
            "/oid4vci/offers",
            Some(json!({ "offeredCredentials": ["Test Issuer"] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(
            offer["credentialOffer"]
                .as_str()
                .unwrap()
                .starts_with("openid-credential-offer://")
        );
        assert_eq!(offer["issuanceSession"]["state"], "OfferCreated");

        let uri = format!(
            "/oid4vci/{}/.well-known/openid-credential-issuer",
            issuer.issuer_id
        );
        let (status, metadata) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            metadata["credential_issuer"],
            format!("http://127.0.0.1:3000/oid4vci/{}", issuer.issuer_id)
        );

        let (status, _) = send(
            &app,
            "GET",
            "/oid4vci/missing/.well-known/openid-credential-issuer",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_openid4vp_authorization_request() {
        let (app, state) = app().await;
        let verifier = state.agent.openid4vc_verifier.default_verifier().await.unwrap();

        let (status, created) = send(
            &app,
            "POST",
            "/siop/authorization-requests",
            Some(json!({ "presentationDefinition": { "id": "degree", "input_descriptors": [] } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let request = created["authorizationRequest"].as_str().unwrap();
        assert!(request.starts_with("openid4vp://?"));
        assert!(request.contains(&verifier.verifier_id));
        assert_eq!(created["verificationSession"]["state"], "RequestCreated");

        let (status, body) = send(&app, "POST", "/siop/authorization-requests", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["step"], "create_authorization_request");

        let (status, _) = send(
            &app,
            "POST",
            "/siop/authorization-requests",
            Some(json!({ "verifierId": "missing", "presentationDefinition": {} })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_event_stream_announces_created_did() {
        let (app, _) = app().await;
        let response = app
            .clone()
            .oneshot(Request::get("/events/stream").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let (status, created) = send(&app, "POST", "/create-did", Some(json!({}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let did = created["didState"]["did"].as_str().unwrap().to_string();

        let mut body = response.into_body();
        let mut text = String::new();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !(text.contains("event: DidCreated") && text.contains(&did)) {
                let frame = body.frame().await.unwrap().unwrap();
                if let Ok(data) = frame.into_data() {
                    text.push_str(&String::from_utf8_lossy(&data));
                }
            }
        })
        .await
        .unwrap();
    }
}
