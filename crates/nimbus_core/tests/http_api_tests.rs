//! Integration tests for the HTTP API client.

use nimbus_core::{AgentStage, ConsoleApi, ConsoleConfig, ConversationRequest, CoreError, HttpApi};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn api_for(server: &MockServer) -> HttpApi {
    let config = ConsoleConfig::default().with_api_url(server.uri());
    HttpApi::new(&config).unwrap()
}

#[tokio::test]
async fn test_current_user_sends_bearer_token() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .and(header("authorization", "Bearer tok-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "username": "ops",
            "email": "ops@example.com",
            "roles": ["admin"]
        })))
        .mount(&server)
        .await;

    let api = api_for(&server);
    api.set_auth_token(Some("tok-123".to_string()));

    let user = api.current_user().await.unwrap();
    assert_eq!(user.username, "ops");
    assert_eq!(user.roles, vec!["admin".to_string()]);
}

#[tokio::test]
async fn test_expired_token_maps_to_unauthorized() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/auth/me"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "Token expired"})))
        .mount(&server)
        .await;

    let err = api_for(&server).current_user().await.unwrap_err();
    assert!(matches!(err, CoreError::Unauthorized(ref m) if m == "Token expired"));
}

#[tokio::test]
async fn test_conversation_body() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/agents/conversation"))
        .and(body_json(json!({"message": "hello", "session_id": "s-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Hi there"})))
        .mount(&server)
        .await;

    let reply = api_for(&server)
        .conversation(&ConversationRequest {
            message: "hello".to_string(),
            session_id: "s-1".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(reply.response, "Hi there");
}

#[tokio::test]
async fn test_list_agents_accepts_wrapped_list() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/agents/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agents": [{"agent_type": "aws", "name": "AWS", "capabilities": ["analyze"]}]
        })))
        .mount(&server)
        .await;

    let agents = api_for(&server).list_agents().await.unwrap();
    assert_eq!(agents.len(), 1);
    assert_eq!(agents[0].agent_type, "aws");
}

#[tokio::test]
async fn test_stage_error_is_verbatim() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/agents/aws/generate"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"detail": "analysis is missing 'region'"})),
        )
        .mount(&server)
        .await;

    let err = api_for(&server)
        .run_stage("aws", AgentStage::Generate, &json!({}))
        .await
        .unwrap_err();
    match err {
        CoreError::Backend { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "analysis is missing 'region'");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_unreachable_backend_is_transport_error() {
    let config = ConsoleConfig::default().with_api_url("http://127.0.0.1:9");
    let api = HttpApi::new(&config).unwrap();

    let err = api.api_status().await.unwrap_err();
    assert!(err.is_transient());
}
