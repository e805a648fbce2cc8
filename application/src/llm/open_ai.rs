//! [OpenAI]-compatible [`Llm`] implementation.
//!
//! [OpenAI]: https://platform.openai.com/docs/api-reference/chat

use std::{pin::pin, time};

use common::operations::Perform;
use futures::{channel::mpsc, Stream, StreamExt as _};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use tracerr::Traced;
use tracing as log;

use super::{
    nullable, Completion, Error, Llm, Message, Role, ToolCall, ToolSchema,
};

/// Payload of a server-sent event finishing a streamed response.
const DONE: &str = "[DONE]";

/// [`OpenAi`] client configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the API (like `https://api.groq.com/openai/v1`).
    pub base_url: String,

    /// API key to authorize with.
    pub api_key: SecretString,

    /// Model to complete chats with.
    pub model: String,

    /// Sampling temperature.
    pub temperature: f32,

    /// Timeout of a single API request.
    pub timeout: time::Duration,
}

/// Client of an [OpenAI]-compatible chat completions API.
///
/// [OpenAI]: https://platform.openai.com/docs/api-reference/chat
#[derive(Clone, Debug)]
pub struct OpenAi {
    /// HTTP client to perform requests with.
    http: reqwest::Client,

    /// [`Config`] of this [`OpenAi`] client.
    config: Config,
}

impl OpenAi {
    /// Creates a new [`OpenAi`] client with the provided [`Config`].
    ///
    /// # Errors
    ///
    /// If failed to initialize the HTTP client.
    pub fn new(config: Config) -> Result<Self, Traced<Error>> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(tracerr::from_and_wrap!(=> Error))?;
        Ok(Self { http, config })
    }
}

/// Chat completions request body.
#[derive(Serialize)]
struct Request<'a> {
    /// Model to complete the chat with.
    model: &'a str,

    /// Sampling temperature.
    temperature: f32,

    /// Chat to complete.
    messages: &'a [Message],

    /// Tools the model may call.
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ToolSchema],

    /// Tool choice strategy, if any tools are provided.
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,

    /// Whether the response is streamed as server-sent events.
    #[serde(skip_serializing_if = "<&bool as std::ops::Not>::not")]
    stream: bool,
}

/// Chat completions response body.
#[derive(Deserialize)]
struct Response {
    /// Completed choices.
    #[serde(default)]
    choices: Vec<Choice>,
}

/// Single completed choice.
#[derive(Deserialize)]
struct Choice {
    /// Completed [`Message`].
    message: Message,
}

/// Streamed chunk of a chat completions response.
#[derive(Deserialize)]
struct Chunk {
    /// Deltas of the completed choices.
    #[serde(default)]
    choices: Vec<ChunkChoice>,

    /// Error reported instead of the deltas.
    #[serde(default)]
    error: Option<ApiError>,
}

/// Error reported by the API.
#[derive(Deserialize)]
struct ApiError {
    /// Description of the error.
    #[serde(default)]
    message: String,
}

/// Delta of a single completed choice.
#[derive(Deserialize)]
struct ChunkChoice {
    /// [`Delta`] of the completed [`Message`].
    #[serde(default)]
    delta: Delta,
}

/// Part of a completed [`Message`].
#[derive(Default, Deserialize)]
struct Delta {
    /// Next piece of the text content.
    #[serde(default)]
    content: Option<String>,

    /// Pieces of the [`ToolCall`]s.
    #[serde(default, deserialize_with = "nullable")]
    tool_calls: Vec<ToolCallDelta>,
}

/// Part of a [`ToolCall`].
#[derive(Deserialize)]
struct ToolCallDelta {
    /// Position of the [`ToolCall`] in the completed [`Message`].
    #[serde(default)]
    index: usize,

    /// ID of the [`ToolCall`], sent with its first piece.
    #[serde(default)]
    id: Option<String>,

    /// Pieces of the called function.
    #[serde(default)]
    function: Option<FunctionDelta>,
}

/// Part of a function called by a [`ToolCall`].
#[derive(Deserialize)]
struct FunctionDelta {
    /// Name of the function, sent with its first piece.
    #[serde(default)]
    name: Option<String>,

    /// Next piece of the JSON-encoded arguments.
    #[serde(default)]
    arguments: Option<String>,
}

/// Splitter of a byte stream into the payloads of its `data:` lines.
#[derive(Debug, Default)]
struct Lines {
    /// Bytes of the last incomplete line.
    buffer: Vec<u8>,
}

impl Lines {
    /// Appends the provided `bytes`, returning the payloads of the `data:`
    /// lines they complete.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let Some(end) = self.buffer.iter().rposition(|b| *b == b'\n') else {
            return vec![];
        };
        let complete = self.buffer.drain(..=end).collect::<Vec<_>>();

        String::from_utf8_lossy(&complete)
            .lines()
            .filter_map(|l| l.strip_prefix("data:"))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(ToOwned::to_owned)
            .collect()
    }
}

/// [`Message`] assembled out of streamed [`Chunk`]s.
#[derive(Debug, Default)]
struct Assembly {
    /// Text content received so far.
    content: String,

    /// [`ToolCall`]s received so far.
    tool_calls: Vec<ToolCall>,

    /// Whether any choice has been received.
    has_choices: bool,
}

impl Assembly {
    /// Applies the provided [`Chunk`], returning the text delta it carries,
    /// if any.
    fn apply(&mut self, chunk: Chunk) -> Result<Option<String>, Error> {
        if let Some(e) = chunk.error {
            return Err(Error::Stream(e.message));
        }

        let mut text = String::new();
        for ChunkChoice { delta } in chunk.choices {
            self.has_choices = true;
            if let Some(content) = delta.content {
                text.push_str(&content);
            }
            for call in delta.tool_calls {
                self.apply_call(call);
            }
        }

        self.content.push_str(&text);
        Ok((!text.is_empty()).then_some(text))
    }

    /// Applies the provided [`ToolCallDelta`] to the [`ToolCall`] at its
    /// index.
    fn apply_call(&mut self, delta: ToolCallDelta) {
        // Gaps are closed, so a bogus index can't grow the calls unbounded.
        let index = delta.index.min(self.tool_calls.len());
        if index == self.tool_calls.len() {
            self.tool_calls.push(ToolCall::default());
        }
        let Some(call) = self.tool_calls.get_mut(index) else {
            return;
        };

        if let Some(id) = delta.id {
            call.id = id;
        }
        if let Some(function) = delta.function {
            if let Some(name) = function.name {
                call.name.push_str(&name);
            }
            if let Some(arguments) = function.arguments {
                call.arguments.push_str(&arguments);
            }
        }
    }

    /// Finishes this [`Assembly`] into the completed [`Message`].
    fn finish(self) -> Result<Message, Error> {
        if !self.has_choices {
            return Err(Error::NoChoices);
        }
        Ok(Message {
            role: Role::Assistant,
            content: (!self.content.is_empty()).then_some(self.content),
            tool_calls: self.tool_calls,
            tool_call_id: None,
        })
    }
}

/// Assembles a [`Message`] out of the provided server-sent events `body`,
/// forwarding its text deltas to the provided sink as they arrive.
async fn assemble<B>(
    body: impl Stream<Item = Result<B, reqwest::Error>>,
    deltas: &mpsc::UnboundedSender<String>,
) -> Result<Message, Traced<Error>>
where
    B: AsRef<[u8]>,
{
    let mut body = pin!(body);
    let mut lines = Lines::default();
    let mut assembly = Assembly::default();

    'stream: while let Some(bytes) = body.next().await {
        let bytes = bytes.map_err(tracerr::from_and_wrap!(=> Error))?;
        for payload in lines.push(bytes.as_ref()) {
            if payload == DONE {
                break 'stream;
            }
            let chunk = serde_json::from_str::<Chunk>(&payload)
                .map_err(tracerr::from_and_wrap!(=> Error))?;
            if let Some(text) =
                assembly.apply(chunk).map_err(|e| tracerr::new!(e))?
            {
                // The receiver may be gone already.
                _ = deltas.unbounded_send(text);
            }
        }
    }

    assembly.finish().map_err(|e| tracerr::new!(e))
}

impl Llm<Perform<Completion>> for OpenAi {
    type Ok = Message;
    type Err = Traced<Error>;

    async fn execute(
        &self,
        Perform(completion): Perform<Completion>,
    ) -> Result<Self::Ok, Self::Err> {
        let Completion {
            messages,
            tools,
            deltas,
        } = completion;
        let body = Request {
            model: &self.config.model,
            temperature: self.config.temperature,
            messages: &messages,
            tools: &tools,
            tool_choice: (!tools.is_empty()).then_some("auto"),
            stream: deltas.is_some(),
        };

        log::debug!(
            "completing chat of {} messages with `{}`",
            messages.len(),
            self.config.model,
        );
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(tracerr::new!(Error::Status { status, body }));
        }

        if let Some(deltas) = &deltas {
            return assemble(resp.bytes_stream(), deltas).await;
        }
        resp.json::<Response>()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))?
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| tracerr::new!(Error::NoChoices))
    }
}

#[cfg(test)]
mod spec {
    use futures::{channel::mpsc, stream, StreamExt as _};
    use serde_json::json;

    use crate::llm::{Error, Message, Role, ToolCall, ToolSchema};

    use super::{assemble, Lines, Request, Response};

    /// Assembles the provided server-sent events `body` delivered in pieces
    /// of `size` bytes, returning the result along with the text deltas.
    async fn assemble_in_pieces(
        body: &str,
        size: usize,
    ) -> (Result<Message, Error>, Vec<String>) {
        let pieces = body
            .as_bytes()
            .chunks(size)
            .map(|p| Ok::<_, reqwest::Error>(p.to_vec()))
            .collect::<Vec<_>>();
        let (tx, rx) = mpsc::unbounded();

        let res = assemble(stream::iter(pieces), &tx)
            .await
            .map_err(tracerr::Traced::into_inner);
        drop(tx);

        (res, rx.collect().await)
    }

    #[test]
    fn writes_request_without_tools() {
        let messages = [Message::system("Be nice."), Message::user("Hi")];
        let body = Request {
            model: "llama-3.3-70b-versatile",
            temperature: 0.5,
            messages: &messages,
            tools: &[],
            tool_choice: None,
            stream: false,
        };

        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "model": "llama-3.3-70b-versatile",
                "temperature": 0.5,
                "messages": [
                    { "role": "system", "content": "Be nice." },
                    { "role": "user", "content": "Hi" },
                ],
            }),
        );
    }

    #[test]
    fn writes_request_with_tools() {
        let tools = [ToolSchema {
            name: "search_projects",
            description: "Searches projects.",
            parameters: json!({ "type": "object" }),
        }];
        let body = Request {
            model: "m",
            temperature: 0.5,
            messages: &[],
            tools: &tools,
            tool_choice: Some("auto"),
            stream: true,
        };

        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["stream"], true);
        assert_eq!(value["tool_choice"], "auto");
        assert_eq!(value["tools"][0]["function"]["name"], "search_projects");
    }

    #[test]
    fn reads_response() {
        let resp: Response = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": "Hello!" },
                "finish_reason": "stop",
            }],
        }))
        .unwrap();

        assert_eq!(
            resp.choices.into_iter().next().unwrap().message,
            Message::assistant("Hello!"),
        );
    }

    #[tokio::test]
    async fn assembles_streamed_message() {
        let body = [
            r#"data: {"choices":[{"index":0,"delta":{"role":"assistant","content":"Looking "}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"for ₹90 L"}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":null,"tool_calls":[{"index":0,"id":"call_1","type":"function","function":{"name":"search_projects","arguments":""}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"city\":"}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Pune\"}"}}]}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{},"finish_reason":"tool_calls"}]}"#,
            "data: [DONE]",
        ]
        .map(|line| format!("{line}\n\n"))
        .concat();

        // Pieces split lines and multi-byte characters alike.
        for size in [1, 7, body.len()] {
            let (msg, deltas) = assemble_in_pieces(&body, size).await;

            assert_eq!(deltas.concat(), "Looking for ₹90 L", "size {size}");
            assert_eq!(
                msg.unwrap(),
                Message {
                    role: Role::Assistant,
                    content: Some("Looking for ₹90 L".into()),
                    tool_calls: vec![ToolCall {
                        id: "call_1".into(),
                        name: "search_projects".into(),
                        arguments: r#"{"city":"Pune"}"#.into(),
                    }],
                    tool_call_id: None,
                },
                "size {size}",
            );
        }
    }

    #[tokio::test]
    async fn forwards_each_text_delta() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\n\
                    : keep-alive\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\r\n\r\n\
                    data: [DONE]\n\n\
                    data: {\"choices\":[{\"delta\":{\"content\":\"!\"}}]}\n\n";

        let (msg, deltas) = assemble_in_pieces(body, body.len()).await;

        assert_eq!(deltas, ["Hi", " there"]);
        assert_eq!(msg.unwrap(), Message::assistant("Hi there"));
    }

    #[tokio::test]
    async fn fails_on_streamed_errors() {
        let (msg, _) = assemble_in_pieces(
            "data: {\"error\":{\"message\":\"rate limited\"}}\n\n",
            64,
        )
        .await;
        assert!(matches!(msg, Err(Error::Stream(m)) if m == "rate limited"));

        let (msg, _) = assemble_in_pieces("data: {oops\n\n", 64).await;
        assert!(matches!(msg, Err(Error::Decode(_))));
    }

    #[tokio::test]
    async fn fails_on_stream_without_choices() {
        let (msg, deltas) = assemble_in_pieces("data: [DONE]\n\n", 64).await;

        assert!(matches!(msg, Err(Error::NoChoices)));
        assert!(deltas.is_empty());
    }

    #[test]
    fn keeps_incomplete_lines() {
        let mut lines = Lines::default();

        assert!(lines.push(b"data: {\"a\"").is_empty());
        assert_eq!(lines.push(b":1}\nda"), [r#"{"a":1}"#]);
        assert_eq!(lines.push(b"ta: [DONE]\n"), ["[DONE]"]);
    }
}
