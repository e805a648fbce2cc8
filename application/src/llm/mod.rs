//! Language model definitions.

pub mod open_ai;

use derive_more::{Display, Error as StdError, From};
use futures::channel::mpsc;
use serde::{Deserialize, Deserializer, Serialize};

pub use self::open_ai::{Config, OpenAi};

/// Language model completing chats.
pub use common::Handler as Llm;

/// Chat [`Completion`] request to a language model.
#[derive(Clone, Debug)]
pub struct Completion {
    /// [`Message`]s of the chat to complete.
    pub messages: Vec<Message>,

    /// [`ToolSchema`]s of the tools the model may call.
    ///
    /// Empty if the model must respond with text.
    pub tools: Vec<ToolSchema>,

    /// Sink of the text deltas of the completed [`Message`], streamed as
    /// soon as the model produces them.
    ///
    /// [`None`] if the [`Message`] is only needed as a whole.
    pub deltas: Option<mpsc::UnboundedSender<String>>,
}

/// Author of a chat [`Message`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model.
    System,

    /// Human talking to the model.
    User,

    /// Model itself.
    Assistant,

    /// Output of a tool called by the model.
    Tool,
}

/// Message of a chat.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Message {
    /// [`Role`] of this [`Message`] author.
    pub role: Role,

    /// Text content of this [`Message`], if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// [`ToolCall`]s requested by an [`Role::Assistant`].
    #[serde(
        default,
        deserialize_with = "nullable",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tool_calls: Vec<ToolCall>,

    /// ID of the [`ToolCall`] a [`Role::Tool`] message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    /// Creates a new [`Message`] of the provided [`Role`] with text `content`.
    #[must_use]
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: vec![],
            tool_call_id: None,
        }
    }

    /// Creates a new [`Role::System`] [`Message`].
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    /// Creates a new [`Role::User`] [`Message`].
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    /// Creates a new [`Role::Assistant`] [`Message`].
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// Creates a new [`Role::Tool`] [`Message`] answering the [`ToolCall`]
    /// with the provided `id`.
    #[must_use]
    pub fn tool(id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(id.into()),
            ..Self::text(Role::Tool, output)
        }
    }

    /// Returns the non-blank text content of this [`Message`], if any.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_deref().filter(|c| !c.trim().is_empty())
    }

    /// Indicates whether this [`Message`] has neither text content nor
    /// [`ToolCall`]s.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text_content().is_none() && self.tool_calls.is_empty()
    }
}

/// Call of a tool requested by a language model.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(from = "wire::ToolCall", into = "wire::ToolCall")]
pub struct ToolCall {
    /// ID of this [`ToolCall`], referred by its output [`Message`].
    pub id: String,

    /// Name of the tool to call.
    pub name: String,

    /// JSON-encoded arguments of the call.
    pub arguments: String,
}

/// Schema of a tool a language model may call.
#[derive(Clone, Debug, Serialize)]
#[serde(into = "wire::ToolSchema")]
pub struct ToolSchema {
    /// Name of the tool.
    pub name: &'static str,

    /// Description of what the tool does.
    pub description: &'static str,

    /// [JSON Schema] of the tool arguments.
    ///
    /// [JSON Schema]: https://json-schema.org
    pub parameters: serde_json::Value,
}

/// Wire representations of a function calling API.
mod wire {
    use serde::{Deserialize, Serialize};

    /// Kind of every tool (the only one supported).
    const FUNCTION: &str = "function";

    /// Function of a [`ToolCall`].
    #[derive(Deserialize, Serialize)]
    pub(super) struct Function {
        /// Name of the function.
        name: String,

        /// JSON-encoded arguments of the function.
        #[serde(default)]
        arguments: String,
    }

    /// [`super::ToolCall`] as transferred.
    #[derive(Deserialize, Serialize)]
    pub(super) struct ToolCall {
        /// ID of the call.
        id: String,

        /// Kind of the call.
        #[serde(rename = "type", default = "function")]
        kind: String,

        /// Called [`Function`].
        function: Function,
    }

    impl From<ToolCall> for super::ToolCall {
        fn from(call: ToolCall) -> Self {
            Self {
                id: call.id,
                name: call.function.name,
                arguments: call.function.arguments,
            }
        }
    }

    impl From<super::ToolCall> for ToolCall {
        fn from(call: super::ToolCall) -> Self {
            Self {
                id: call.id,
                kind: function(),
                function: Function {
                    name: call.name,
                    arguments: call.arguments,
                },
            }
        }
    }

    /// [`super::ToolSchema`] as transferred.
    #[derive(Serialize)]
    pub(super) struct ToolSchema {
        /// Kind of the tool.
        #[serde(rename = "type")]
        kind: &'static str,

        /// Described function.
        function: FunctionSchema,
    }

    /// Function of a [`ToolSchema`].
    #[derive(Serialize)]
    struct FunctionSchema {
        /// Name of the function.
        name: &'static str,

        /// Description of the function.
        description: &'static str,

        /// Parameters of the function.
        parameters: serde_json::Value,
    }

    impl From<super::ToolSchema> for ToolSchema {
        fn from(schema: super::ToolSchema) -> Self {
            Self {
                kind: FUNCTION,
                function: FunctionSchema {
                    name: schema.name,
                    description: schema.description,
                    parameters: schema.parameters,
                },
            }
        }
    }

    /// Returns the default kind of a [`ToolCall`].
    fn function() -> String {
        FUNCTION.to_owned()
    }
}

/// [`Llm`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// Failed to reach the language model API.
    #[display("language model request failed: {_0}")]
    #[from]
    Transport(reqwest::Error),

    /// Language model API responded with an error.
    #[display("language model API responded with `{status}`: {body}")]
    Status {
        /// HTTP status of the response.
        status: http::StatusCode,

        /// Body of the response.
        body: String,
    },

    /// Language model API responded without any choices.
    #[display("language model responded without choices")]
    NoChoices,

    /// Streamed chunk of a response failed to decode.
    #[display("failed to decode language model response chunk: {_0}")]
    #[from]
    Decode(serde_json::Error),

    /// Language model API reported an error in the middle of a stream.
    #[display("language model stream failed: {_0}")]
    Stream(#[error(not(source))] String),
}

/// Deserializes `null` as the default value of `T`.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
