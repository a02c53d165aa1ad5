use std::pin::Pin;
use std::time::Duration;

use anyhow::{Error, Result, anyhow, bail};
use async_stream::try_stream;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub enum Role {
    #[serde(rename = "system")]
    System,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "user")]
    User,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
        }
    }
}

/// Anything that can turn a list of messages into the next assistant
/// reply. The relay only ever sees the final joined text.
#[async_trait]
pub trait ChatCompletion {
    async fn complete(&self, messages: &[Message]) -> Result<String, Error>;
}

pub type BoxedChatCompletion = std::sync::Arc<dyn ChatCompletion + Send + Sync + 'static>;

fn completions_url(api_hostname: &str) -> String {
    format!("{}/v1/chat/completions", api_hostname.trim_end_matches("/"))
}

// Turn a non-2xx response into an error, preferring the message
// OpenAI puts in `{"error": {"message": ...}}`
async fn api_error(response: reqwest::Response) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(String::from))
        .unwrap_or(body);
    anyhow!("Completion request failed with status {}: {}", status, detail)
}

async fn send(
    payload: &Value,
    api_hostname: &str,
    api_key: &str,
    timeout: Duration,
) -> Result<reqwest::Response, Error> {
    let response = reqwest::Client::new()
        .post(completions_url(api_hostname))
        .bearer_auth(api_key)
        .header("Content-Type", "application/json")
        .timeout(timeout)
        .json(payload)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(api_error(response).await);
    }

    Ok(response)
}

/// Request a single, non-streamed completion and return the content
/// of the first choice.
pub async fn completion(
    messages: &[Message],
    api_hostname: &str,
    api_key: &str,
    model: &str,
    timeout: Duration,
) -> Result<String, Error> {
    let payload = json!({
        "model": model,
        "messages": messages,
        "stream": false,
    });
    let resp: Value = send(&payload, api_hostname, api_key, timeout)
        .await?
        .json()
        .await?;

    match resp["choices"][0]["message"]["content"].as_str() {
        Some(content) => Ok(content.to_string()),
        None => bail!("No message received. Resp:\n\n {}", resp),
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Delta {
    Content { content: String },

    Reasoning { reasoning: String },

    // Role-only openers and empty closing deltas
    Empty {},
}

#[derive(Debug, Deserialize)]
struct CompletionChunkChoice {
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionChunk {
    #[serde(default)]
    choices: Vec<CompletionChunkChoice>,
}

/// Text fragments of a streamed completion.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, Error>> + Send>>;

fn find_event_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

/// Request a streamed completion. The returned stream yields the
/// content fragments in the order they arrive and ends at `[DONE]`
/// or the first choice carrying a finish reason. It can only be
/// consumed once.
pub async fn completion_stream(
    messages: &[Message],
    api_hostname: &str,
    api_key: &str,
    model: &str,
    timeout: Duration,
) -> Result<FragmentStream, Error> {
    let payload = json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });
    let response = send(&payload, api_hostname, api_key, timeout).await?;

    Ok(Box::pin(fragments(response)))
}

// What one SSE event adds to the stream
#[derive(Debug, Default, PartialEq)]
struct ParsedEvent {
    fragment: Option<String>,
    done: bool,
}

fn parse_event(event: &[u8]) -> Result<ParsedEvent, Error> {
    let event_data = std::str::from_utf8(event)?.trim();

    let Some(data) = event_data.strip_prefix("data:") else {
        return Ok(ParsedEvent::default());
    };
    let data = data.trim();

    // Data can sometimes be empty
    if data.is_empty() {
        return Ok(ParsedEvent::default());
    }
    if data == "[DONE]" {
        return Ok(ParsedEvent {
            fragment: None,
            done: true,
        });
    }

    let chunk = serde_json::from_str::<CompletionChunk>(data).inspect_err(|e| {
        tracing::error!("Parsing completion chunk failed for {}\nError:{}", data, e)
    })?;
    // Usage-only chunks have no choices
    let Some(choice) = chunk.choices.first() else {
        return Ok(ParsedEvent::default());
    };

    let fragment = match &choice.delta {
        Delta::Content { content } if !content.is_empty() => Some(content.clone()),
        Delta::Content { .. } | Delta::Empty {} => None,
        Delta::Reasoning { reasoning } => {
            tracing::debug!("Skipping reasoning fragment: {}", reasoning);
            None
        }
    };

    Ok(ParsedEvent {
        fragment,
        done: choice.finish_reason.is_some(),
    })
}

fn fragments(response: reqwest::Response) -> impl Stream<Item = Result<String, Error>> {
    try_stream! {
        let bytes = response.bytes_stream();
        futures::pin_mut!(bytes);
        // Raw bytes are buffered so that SSE events and multi-byte
        // characters split across frames are reassembled first
        let mut buffer: Vec<u8> = Vec::new();
        let mut finished = false;

        'outer: while let Some(chunk) = bytes.next().await {
            buffer.extend_from_slice(&chunk?);

            while let Some(event_end) = find_event_end(&buffer) {
                let event: Vec<u8> = buffer.drain(..event_end + 2).collect();
                let parsed = parse_event(&event)?;
                if let Some(fragment) = parsed.fragment {
                    yield fragment;
                }
                if parsed.done {
                    finished = true;
                    break 'outer;
                }
            }
        }

        // The body can end without a blank line after the last event
        if !finished && !buffer.is_empty() {
            if let Some(fragment) = parse_event(&buffer)?.fragment {
                yield fragment;
            }
        }
    }
}

/// Drain a fragment stream into a single string, in arrival order.
pub async fn collect_fragments<S>(fragments: S) -> Result<String, Error>
where
    S: Stream<Item = Result<String, Error>>,
{
    futures::pin_mut!(fragments);
    let mut content_buf = String::new();
    while let Some(fragment) = fragments.next().await {
        content_buf.push_str(&fragment?);
    }
    Ok(content_buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), r#""system""#);
        assert_eq!(
            serde_json::to_string(&Role::Assistant).unwrap(),
            r#""assistant""#
        );
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), r#""user""#);
    }

    #[test]
    fn test_role_rejects_unknown() {
        assert!(serde_json::from_str::<Role>(r#""tool""#).is_err());
    }

    #[test]
    fn test_message_new() {
        let msg = Message::new(Role::User, "Hello world");
        assert_eq!(
            serde_json::to_string(&msg).unwrap(),
            r#"{"role":"user","content":"Hello world"}"#
        );
    }

    #[test]
    fn test_delta_deserialization() {
        match serde_json::from_str::<Delta>(r#"{"content":"Hello"}"#).unwrap() {
            Delta::Content { content } => assert_eq!(content, "Hello"),
            _ => panic!("Expected Content variant"),
        }
        match serde_json::from_str::<Delta>(r#"{"role":"assistant"}"#).unwrap() {
            Delta::Empty {} => {}
            _ => panic!("Expected Empty variant"),
        }
        match serde_json::from_str::<Delta>(r#"{"content":null}"#).unwrap() {
            Delta::Empty {} => {}
            _ => panic!("Expected Empty variant"),
        }
    }

    #[test]
    fn test_find_event_end() {
        assert_eq!(find_event_end(b"data: x\n\nrest"), Some(7));
        assert_eq!(find_event_end(b"data: x\n"), None);
    }

    #[tokio::test]
    async fn test_completion_basic() {
        let mut server = mockito::Server::new_async().await;

        let response_body = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "created": 1694268190,
            "model": "gpt-3.5-turbo",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello!"
                },
                "finish_reason": "stop"
            }]
        }"#;

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .match_header("authorization", "Bearer test-key")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(response_body)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Hi")];
        let result = completion(
            &messages,
            server.url().as_str(),
            "test-key",
            "gpt-3.5-turbo",
            TIMEOUT,
        )
        .await;

        mock.assert_async().await;
        assert_eq!(result.unwrap(), "Hello!");
    }

    #[tokio::test]
    async fn test_completion_error_status() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": {"message": "Incorrect API key provided"}}"#)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Hi")];
        let result = completion(
            &messages,
            server.url().as_str(),
            "bad-key",
            "gpt-3.5-turbo",
            TIMEOUT,
        )
        .await;

        mock.assert_async().await;
        let err = result.unwrap_err().to_string();
        assert!(err.contains("401"));
        assert!(err.contains("Incorrect API key provided"));
    }

    #[tokio::test]
    async fn test_completion_missing_content() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices": []}"#)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Hi")];
        let result = completion(
            &messages,
            server.url().as_str(),
            "test-key",
            "gpt-3.5-turbo",
            TIMEOUT,
        )
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_completion_stream_content() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = r#"data: {"id":"chunk0","choices":[{"index":0,"delta":{"role":"assistant"},"finish_reason":null}]}

data: {"id":"chunk1","choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}

data: {"id":"chunk2","choices":[{"index":0,"delta":{"content":" World"},"finish_reason":null}]}

data: {"id":"chunk3","choices":[{"index":0,"delta":{"content":"!"},"finish_reason":"stop"}]}

data: [DONE]

"#;

        let mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Say hello")];
        let fragments = completion_stream(
            &messages,
            server.url().as_str(),
            "test-key",
            "gpt-3.5-turbo",
            TIMEOUT,
        )
        .await
        .unwrap();
        let fragments: Vec<String> = fragments.map(|f| f.unwrap()).collect().await;

        mock.assert_async().await;
        assert_eq!(fragments, vec!["Hello", " World", "!"]);
    }

    #[tokio::test]
    async fn test_completion_stream_skips_reasoning() {
        let mut server = mockito::Server::new_async().await;

        let sse_response = r#"data: {"choices":[{"index":0,"delta":{"reasoning":"Thinking"},"finish_reason":null}]}

data: {"choices":[{"index":0,"delta":{"content":"Done!"},"finish_reason":null}]}

data: {"choices":[],"usage":{"total_tokens":10}}

data: [DONE]

"#;

        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Think about this")];
        let fragments = completion_stream(
            &messages,
            server.url().as_str(),
            "test-key",
            "gpt-3.5-turbo",
            TIMEOUT,
        )
        .await
        .unwrap();

        assert_eq!(collect_fragments(fragments).await.unwrap(), "Done!");
    }

    #[test]
    fn test_parse_event() {
        assert_eq!(
            parse_event(br#"data: {"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#)
                .unwrap(),
            ParsedEvent {
                fragment: Some(String::from("Hi")),
                done: false
            }
        );
        assert!(parse_event(b"data: [DONE]\n\n").unwrap().done);
        assert_eq!(parse_event(b": keep-alive\n\n").unwrap(), ParsedEvent::default());
        assert!(parse_event(b"data: {oops").is_err());
    }

    #[tokio::test]
    async fn test_completion_stream_flushes_last_event() {
        let mut server = mockito::Server::new_async().await;

        // No `[DONE]` and no blank line after the final event
        let sse_response = r#"data: {"choices":[{"index":0,"delta":{"content":"Hello"},"finish_reason":null}]}

data: {"choices":[{"index":0,"delta":{"content":" there"},"finish_reason":null}]}"#;

        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_response)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Hi")];
        let fragments = completion_stream(
            &messages,
            server.url().as_str(),
            "test-key",
            "gpt-3.5-turbo",
            TIMEOUT,
        )
        .await
        .unwrap();

        assert_eq!(collect_fragments(fragments).await.unwrap(), "Hello there");
    }

    #[tokio::test]
    async fn test_completion_stream_error_status() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/v1/chat/completions")
            .with_status(429)
            .with_body(r#"{"error": {"message": "Rate limit reached"}}"#)
            .create_async()
            .await;

        let messages = vec![Message::new(Role::User, "Hi")];
        let result = completion_stream(
            &messages,
            server.url().as_str(),
            "test-key",
            "gpt-3.5-turbo",
            TIMEOUT,
        )
        .await;

        match result {
            Ok(_) => panic!("Expected an error for a 429 response"),
            Err(e) => assert!(e.to_string().contains("Rate limit reached")),
        }
    }

    #[tokio::test]
    async fn test_collect_fragments_in_order() {
        let fragments = futures::stream::iter(vec![
            Ok("a".to_string()),
            Ok("b".to_string()),
            Ok("c".to_string()),
        ]);
        assert_eq!(collect_fragments(fragments).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn test_collect_fragments_propagates_error() {
        let fragments = futures::stream::iter(vec![Ok("a".to_string()), Err(anyhow!("boom"))]);
        assert!(collect_fragments(fragments).await.is_err());
    }
}
