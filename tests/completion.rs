//! Completion client integration tests against a mock HTTP server

use context_press::llm::ClientOptions;
use context_press::{
    CompletionClient, CompletionRequest, Error, HttpCompletionClient, Message, StreamEvent, Usage,
};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod common;
use common::{delta_chunk, sse_body};

fn client_for(server: &MockServer) -> HttpCompletionClient {
    HttpCompletionClient::new(
        ClientOptions::new("test-key").with_base_url(format!("{}/v1", server.uri())),
    )
    .unwrap()
}

fn request(stream: bool) -> CompletionRequest {
    CompletionRequest::new(
        "test-model",
        vec![Message::system("be brief"), Message::user("hi")],
    )
    .with_stream(stream)
}

#[tokio::test]
async fn streamed_completion_is_accumulated() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        delta_chunk("Hel"),
        delta_chunk("lo"),
        json!({"choices": [{"delta": {}, "finish_reason": "stop"}]}),
        json!({"choices": [], "usage": {"prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11}}),
    ]);

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(header("accept", "text/event-stream"))
        .and(body_partial_json(json!({
            "model": "test-model",
            "stream": true,
            "messages": [
                {"role": "system", "content": "be brief"},
                {"role": "user", "content": "hi"}
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut tokens = Vec::new();
    let completion = client_for(&server)
        .complete_with(&request(true), &mut |event| {
            if let StreamEvent::Token(token) = event {
                tokens.push(token.clone());
            }
        })
        .await
        .unwrap();

    assert_eq!(tokens, vec!["Hel", "lo"]);
    assert_eq!(completion.text, "Hello");
    assert_eq!(completion.finish_reason.as_str(), "stop");
    assert_eq!(
        completion.usage,
        Some(Usage {
            prompt_tokens: 9,
            completion_tokens: 2,
            total_tokens: 11
        })
    );
}

#[tokio::test]
async fn non_streamed_completion_reads_first_choice() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("accept", "application/json"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "message": {"role": "assistant", "content": "Whole answer"},
                "finish_reason": "content_filter"
            }],
            "usage": {"input_tokens": 4, "output_tokens": 2}
        })))
        .mount(&server)
        .await;

    let completion = client_for(&server).complete(&request(false)).await.unwrap();

    assert_eq!(completion.text, "Whole answer");
    assert_eq!(completion.finish_reason.as_str(), "content-filter");
    assert_eq!(completion.usage.map(|u| u.total_tokens), Some(6));
}

#[tokio::test]
async fn rejected_request_surfaces_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "invalid api key"}})),
        )
        .mount(&server)
        .await;

    let err = client_for(&server).complete(&request(true)).await.unwrap_err();
    assert!(matches!(err, Error::Completion(ref m) if m == "invalid api key"));
}

#[tokio::test]
async fn rejected_request_without_json_quotes_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream overloaded"))
        .mount(&server)
        .await;

    let err = client_for(&server).complete(&request(true)).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "completion request failed with status 503. upstream overloaded"
    );
}

#[tokio::test]
async fn error_chunk_aborts_stream() {
    let server = MockServer::start().await;
    let body = sse_body(&[
        delta_chunk("partial"),
        json!({"error": {"message": "model overloaded"}}),
        delta_chunk("never seen"),
    ]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let err = client_for(&server).complete(&request(true)).await.unwrap_err();
    assert_eq!(err.to_string(), "model overloaded");
}

#[tokio::test]
async fn stream_without_text_is_empty_response() {
    let server = MockServer::start().await;
    let body = sse_body(&[json!({"choices": [{"delta": {"role": "assistant"}, "finish_reason": "stop"}]})]);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let err = client_for(&server).complete(&request(true)).await.unwrap_err();
    assert!(matches!(err, Error::EmptyResponse));
}

#[tokio::test]
async fn raw_json_reply_to_streamed_request_is_accepted() {
    let server = MockServer::start().await;
    let body = json!({"choices": [{"message": {"content": "proxied"}, "finish_reason": "stop"}]}).to_string();
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "application/json"))
        .mount(&server)
        .await;

    let completion = client_for(&server).complete(&request(true)).await.unwrap();
    assert_eq!(completion.text, "proxied");
}

#[tokio::test]
async fn max_tokens_and_available_models_are_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "max_tokens": 128,
            "available_models": ["a", "b"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse_body(&[delta_chunk("ok")]), "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let request = request(true)
        .with_max_tokens(Some(128))
        .with_available_models(vec!["a".into(), "b".into()]);
    let completion = client_for(&server).complete(&request).await.unwrap();
    assert_eq!(completion.text, "ok");
}

#[tokio::test]
async fn unreadable_rejection_body_still_reports_status() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();

        // read the whole request so closing the socket does not reset it
        let mut request = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let read = socket.read(&mut chunk).await.unwrap();
            if read == 0 {
                break;
            }
            request.extend_from_slice(&chunk[..read]);
            let text = String::from_utf8_lossy(&request);
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if request.len() >= end + 4 + length {
                    break;
                }
            }
        }

        // promise more body than is sent, then hang up
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\ncontent-length: 100\r\n\r\npartial")
            .await
            .unwrap();
        socket.shutdown().await.unwrap();
    });

    let client = HttpCompletionClient::new(
        ClientOptions::new("test-key").with_base_url(format!("http://{address}/v1")),
    )
    .unwrap();
    let err = client.complete(&request(true)).await.unwrap_err();

    assert_eq!(err.to_string(), "completion request failed with status 500.");
    server.await.unwrap();
}
