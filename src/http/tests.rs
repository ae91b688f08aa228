use super::*;

#[test]
fn endpoint_keeps_api_prefix() {
    assert_eq!(
        endpoint("https://openrouter.ai/api/v1", "embeddings"),
        "https://openrouter.ai/api/v1/embeddings"
    );
    assert_eq!(
        endpoint("http://localhost:8080/v1/", "/chat/completions"),
        "http://localhost:8080/v1/chat/completions"
    );
}

#[test]
fn non_success_status_is_an_error() {
    let err = check_status("http://x", 429, "slow down".to_string())
        .expect_err("429 should be an error");
    match err {
        HttpError::Status { status, body } => {
            assert_eq!(status, 429);
            assert_eq!(body, "slow down");
        }
        HttpError::Transport(e) => panic!("unexpected transport error: {e}"),
    }
}

#[test]
fn error_body_is_truncated() {
    let err = check_status("http://x", 500, "e".repeat(2000)).expect_err("500 is an error");
    assert!(matches!(err, HttpError::Status { body, .. } if body.len() == MAX_ERROR_BODY_CHARS));
}
