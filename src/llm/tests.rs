use super::*;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(base_url: &str) -> Config {
    let mut config = Config::default();
    config.llm.base_url = base_url.to_string();
    config.llm.api_key = "sk-llm".to_string();
    config.llm.model = "test-chat".to_string();
    config
}

#[test]
fn roles_serialize_lowercase() {
    let message = ChatMessage::assistant("hi");
    let value = serde_json::to_value(&message).expect("should serialize");
    assert_eq!(value, json!({"role": "assistant", "content": "hi"}));

    let parsed: ChatMessage =
        serde_json::from_value(json!({"role": "user", "content": "hello"})).expect("parse");
    assert_eq!(parsed, ChatMessage::user("hello"));
}

#[test]
fn unknown_role_is_rejected() {
    let parsed: std::result::Result<ChatMessage, _> =
        serde_json::from_value(json!({"role": "tool", "content": "x"}));
    assert!(parsed.is_err());
}

#[tokio::test]
async fn completion_against_mock_provider() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chat/completions"))
        .and(header("Authorization", "Bearer sk-llm"))
        .and(header("X-Title", "rag-app"))
        .and(body_partial_json(json!({
            "model": "test-chat",
            "max_tokens": 1024,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "What did the cat do?"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "  The cat sat.\n"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&test_config(&format!("{}/api/v1", server.uri())))
        .expect("should create client");
    let answer = client
        .complete(&[
            ChatMessage::system("be brief"),
            ChatMessage::user("What did the cat do?"),
        ])
        .await
        .expect("completion should succeed");

    assert_eq!(answer, "The cat sat.");
}

#[tokio::test]
async fn empty_choices_is_language_model_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let client = ChatClient::new(&test_config(&server.uri())).expect("client");
    assert!(matches!(
        client.complete(&[ChatMessage::user("hi")]).await,
        Err(RagError::LanguageModel(_))
    ));
}

#[tokio::test]
async fn server_error_is_language_model_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let client = ChatClient::new(&test_config(&server.uri())).expect("client");
    let err = client
        .complete(&[ChatMessage::user("hi")])
        .await
        .expect_err("503 should fail");
    assert!(matches!(err, RagError::LanguageModel(ref msg) if msg.contains("503")));
}

async fn chat_health(client: &ChatClient) -> Result<()> {
    let client = client.clone();
    tokio::task::spawn_blocking(move || client.health_check())
        .await
        .expect("health check task should not panic")
}

#[tokio::test]
async fn health_check_succeeds_when_models_listed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/models"))
        .and(header("Authorization", "Bearer sk-llm"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&test_config(&format!("{}/api/v1", server.uri())))
        .expect("should create client");
    chat_health(&client)
        .await
        .expect("healthy provider should pass");
}

#[tokio::test]
async fn health_check_fails_on_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(500).set_body_string("down"))
        .mount(&server)
        .await;

    let client = ChatClient::new(&test_config(&server.uri())).expect("client");
    assert!(matches!(
        chat_health(&client).await,
        Err(RagError::LanguageModel(_))
    ));
}
