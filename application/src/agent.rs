//! Conversational [`Agent`] answering with the help of tools.

use std::{
    collections::HashMap,
    iter,
    sync::Arc,
    time::{self, Instant},
};

use common::{operations::Perform, Handler};
use derive_more::{Display, Error as StdError, From};
use futures::channel::mpsc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracerr::Traced;
use tracing as log;
use uuid::Uuid;

use crate::{
    llm::{self, Completion, Llm, Message, ToolCall, ToolSchema},
    tool,
};

/// Instructions the language model follows in every conversation.
pub const SYSTEM_PROMPT: &str = "\
You are a smart real estate assistant helping people buy homes in India.
Call the `search_projects` tool only when the user explicitly mentions a \
city. Pass that city along with any locality, unit type, budget (in lakhs, \
1 crore = 100 lakhs), status, amenities, developer or RERA preference the \
user mentions.
Once you get the results, show the top 3-5 listings in a user-friendly \
format. For each project display:
- project name
- location (locality and city)
- unit types with their carpet area
- price range
- status and possession date
- RERA ID, if any
If nothing matches, suggest relaxing some of the filters.
Never mention where the data is sourced from or refer to external websites.";

/// Prompt asking the language model to retry after an empty response.
const RETRY_PROMPT: &str = "Respond with a real output.";

/// Suffix of a failed tool call output.
const TOOL_ERROR_HINT: &str = "Please check the city name or try again later.";

/// [`Agent`] configuration.
#[derive(Clone, Copy, Debug)]
pub struct Config {
    /// Maximum number of language model responses with tool calls in a
    /// single [`Turn`].
    ///
    /// Once reached, the model is asked to answer without tools.
    pub max_iterations: usize,

    /// Maximum number of retries of an empty language model response.
    pub max_empty_retries: usize,

    /// Time a conversation thread is kept for since its last [`Turn`].
    ///
    /// Expired threads are forgotten once a new thread is started.
    pub thread_ttl: time::Duration,
}

/// ID of a conversation thread.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[serde(transparent)]
pub struct ThreadId(Uuid);

impl ThreadId {
    /// Generates a new random [`ThreadId`].
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Conversation thread.
#[derive(Debug)]
struct Thread {
    /// [`Message`]s of the conversation, without the system prompt.
    history: Vec<Message>,

    /// Time of the last activity in the conversation.
    touched: Instant,
}

impl Thread {
    /// Creates a new empty [`Thread`].
    fn new() -> Self {
        Self {
            history: vec![],
            touched: Instant::now(),
        }
    }
}

/// [`Thread`] shared between the [`Turn`]s in it.
type SharedThread = Arc<Mutex<Thread>>;

/// Conversational agent calling tools on behalf of a language model.
#[derive(Debug)]
pub struct Agent<L, T> {
    /// Language model to converse with.
    llm: L,

    /// Tools to execute [`ToolCall`]s with.
    tools: T,

    /// [`ToolSchema`]s of the `tools`.
    schemas: Vec<ToolSchema>,

    /// [`Config`] of this [`Agent`].
    config: Config,

    /// Conversation threads.
    threads: RwLock<HashMap<ThreadId, SharedThread>>,
}

impl<L, T> Agent<L, T> {
    /// Creates a new [`Agent`] offering the tools described by the provided
    /// `schemas`.
    #[must_use]
    pub fn new(
        config: Config,
        llm: L,
        tools: T,
        schemas: Vec<ToolSchema>,
    ) -> Self {
        Self {
            llm,
            tools,
            schemas,
            config,
            threads: RwLock::default(),
        }
    }

    /// Returns the tools of this [`Agent`].
    #[must_use]
    pub fn tools(&self) -> &T {
        &self.tools
    }

    /// Starts a new empty conversation thread, forgetting the expired ones.
    pub async fn start_thread(&self) -> ThreadId {
        let id = ThreadId::random();
        let ttl = self.config.thread_ttl;

        let mut threads = self.threads.write().await;
        let before = threads.len();
        // Locked threads are in the middle of a `Turn`.
        threads.retain(|_, t| {
            !t.try_lock().is_ok_and(|t| t.touched.elapsed() >= ttl)
        });
        let expired = before - threads.len();
        if expired > 0 {
            log::debug!("forgot {expired} expired threads");
        }
        _ = threads.insert(id, Arc::new(Mutex::new(Thread::new())));
        drop(threads);

        log::debug!("started thread `{id}`");
        id
    }

    /// Indicates whether a conversation thread with the provided `id` exists.
    pub async fn has_thread(&self, id: ThreadId) -> bool {
        self.threads.read().await.contains_key(&id)
    }

    /// Returns the conversation [`Thread`] with the provided `id`.
    async fn thread(
        &self,
        id: ThreadId,
    ) -> Result<SharedThread, Traced<Error>> {
        self.threads
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| tracerr::new!(Error::UnknownThread(id)))
    }
}

impl<L, T> Agent<L, T>
where
    L: Llm<Perform<Completion>, Ok = Message, Err = Traced<llm::Error>> + Sync,
    T: Handler<Perform<ToolCall>, Ok = String, Err = Traced<tool::Error>>
        + Sync,
{
    /// Completes the provided `messages`, streaming the text of the reply
    /// into the provided `replies` and retrying empty responses.
    ///
    /// Without `tools` offered, a reply with no text is empty too.
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        replies: &mpsc::UnboundedSender<String>,
    ) -> Result<Message, Traced<Error>> {
        let mut completion = Completion {
            messages: iter::once(Message::system(SYSTEM_PROMPT))
                .chain(messages.iter().cloned())
                .collect(),
            tools: tools.to_vec(),
            deltas: Some(replies.clone()),
        };

        for _ in 0..=self.config.max_empty_retries {
            let reply = self
                .llm
                .execute(Perform(completion.clone()))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> Error))?;
            let is_empty = if tools.is_empty() {
                reply.text_content().is_none()
            } else {
                reply.is_empty()
            };
            if !is_empty {
                return Ok(reply);
            }

            log::warn!("language model responded with nothing, retrying");
            completion.messages.push(Message::user(RETRY_PROMPT));
        }

        Err(tracerr::new!(Error::EmptyResponse))
    }

    /// Executes the provided [`ToolCall`], reporting its failure as output.
    async fn call(&self, call: ToolCall) -> String {
        let name = call.name.clone();
        match self.tools.execute(Perform(call)).await {
            Ok(output) => output,
            Err(e) => {
                log::warn!("`{name}` tool failed: {e}");
                format!("Error: {e}\n{TOOL_ERROR_HINT}")
            }
        }
    }
}

/// User turn in a conversation thread.
#[derive(Debug)]
pub struct Turn {
    /// [`ThreadId`] of the conversation thread.
    pub thread: ThreadId,

    /// Text of the user message.
    pub content: String,

    /// Sink of the assistant text produced during this [`Turn`], streamed
    /// in order as the language model produces it.
    pub replies: mpsc::UnboundedSender<String>,
}

impl<L, T> Handler<Perform<Turn>> for Agent<L, T>
where
    L: Llm<Perform<Completion>, Ok = Message, Err = Traced<llm::Error>> + Sync,
    T: Handler<Perform<ToolCall>, Ok = String, Err = Traced<tool::Error>>
        + Sync,
{
    /// Final answer of the assistant.
    type Ok = String;
    type Err = Traced<Error>;

    async fn execute(
        &self,
        Perform(turn): Perform<Turn>,
    ) -> Result<Self::Ok, Self::Err> {
        let Turn {
            thread,
            content,
            replies,
        } = turn;

        let shared = self.thread(thread).await?;
        let mut conversation = shared.lock().await;
        conversation.touched = Instant::now();

        // Committed only once the turn succeeds.
        let mut messages = conversation.history.clone();
        messages.push(Message::user(content));

        let mut iterations = 0;
        let answer = loop {
            let tools: &[ToolSchema] =
                if iterations < self.config.max_iterations {
                    &self.schemas
                } else {
                    log::warn!(
                        "thread `{thread}` reached {iterations} tool \
                         iterations, answering without tools",
                    );
                    &[]
                };

            let reply = self.complete(&messages, tools, &replies).await?;
            if tools.is_empty() || reply.tool_calls.is_empty() {
                let answer = reply.text_content().unwrap_or_default().to_owned();
                messages.push(Message::assistant(answer.clone()));
                break answer;
            }

            log::debug!(
                "thread `{thread}` requested {} tool calls",
                reply.tool_calls.len(),
            );
            let calls = reply.tool_calls.clone();
            messages.push(reply);
            for call in calls {
                let id = call.id.clone();
                let output = self.call(call).await;
                messages.push(Message::tool(id, output));
            }
            iterations += 1;
        };

        conversation.history = messages;
        conversation.touched = Instant::now();
        Ok(answer)
    }
}

/// [`Agent`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// Conversation thread doesn't exist.
    #[display("conversation thread `{_0}` doesn't exist")]
    UnknownThread(#[error(not(source))] ThreadId),

    /// [`Llm`] failed to complete the chat.
    #[display("{_0}")]
    #[from]
    Llm(llm::Error),

    /// [`Llm`] kept responding with empty messages.
    #[display("language model keeps responding with nothing")]
    EmptyResponse,
}

#[cfg(test)]
mod spec {
    use std::{collections::VecDeque, sync::Mutex, time};

    use common::{operations::Perform, Handler};
    use futures::{channel::mpsc, StreamExt as _};
    use serde_json::json;
    use service::{infra::Memory, Service};
    use tracerr::Traced;

    use crate::{
        llm::{self, Completion, Llm, Message, Role, ToolCall},
        tool::{self, spec::Unreachable, Toolbox},
    };

    use super::{Agent, Config, Error, ThreadId, Turn, RETRY_PROMPT};

    /// Language model replying with scripted [`Message`]s, streaming their
    /// text word by word.
    #[derive(Debug, Default)]
    struct Script {
        replies: Mutex<VecDeque<Message>>,
        requests: Mutex<Vec<Completion>>,
    }

    impl Script {
        fn new(replies: Vec<Message>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                requests: Mutex::default(),
            }
        }
    }

    impl Llm<Perform<Completion>> for Script {
        type Ok = Message;
        type Err = Traced<llm::Error>;

        async fn execute(
            &self,
            Perform(mut completion): Perform<Completion>,
        ) -> Result<Self::Ok, Self::Err> {
            let deltas = completion.deltas.take();
            self.requests.lock().unwrap().push(completion);

            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| tracerr::new!(llm::Error::NoChoices))?;
            if let (Some(deltas), Some(text)) = (deltas, &reply.content) {
                for word in text.split_inclusive(' ') {
                    deltas.unbounded_send(word.to_owned()).unwrap();
                }
            }
            Ok(reply)
        }
    }

    type TestAgent = Agent<Script, Toolbox<Service<Memory>>>;

    const CONFIG: Config = Config {
        max_iterations: 10,
        max_empty_retries: 2,
        thread_ttl: time::Duration::from_secs(60 * 60),
    };

    fn agent(config: Config, replies: Vec<Message>) -> TestAgent {
        let tools = Toolbox::new(
            Service::new(Memory::new([json!({
                "project_name": "Skyline Heights",
                "location": { "city": "Pune", "locality": "Baner" },
                "price_info": {
                    "all_inclusive_price_range": { "min": "₹90 L", "max": "₹95 L" },
                },
                "configuration": [{ "type": "2 BHK", "carpet_area_sqft": 850 }],
            })])),
            None,
        );
        let schemas = tools.schemas();
        Agent::new(config, Script::new(replies), tools, schemas)
    }

    fn calls(calls: &[(&str, &str)]) -> Message {
        Message {
            role: Role::Assistant,
            content: None,
            tool_calls: calls
                .iter()
                .enumerate()
                .map(|(n, (name, arguments))| ToolCall {
                    id: format!("call_{n}"),
                    name: (*name).into(),
                    arguments: (*arguments).into(),
                })
                .collect(),
            tool_call_id: None,
        }
    }

    async fn turn<T>(
        agent: &Agent<Script, T>,
        thread: ThreadId,
        content: &str,
    ) -> (Result<String, Traced<Error>>, Vec<String>)
    where
        T: Handler<Perform<ToolCall>, Ok = String, Err = Traced<tool::Error>>
            + Sync,
    {
        let (replies, rx) = mpsc::unbounded();
        let res = agent
            .execute(Perform(Turn {
                thread,
                content: content.into(),
                replies,
            }))
            .await;
        (res, rx.collect().await)
    }

    async fn history(agent: &TestAgent, thread: ThreadId) -> Vec<Message> {
        agent.threads.read().await[&thread].lock().await.history.clone()
    }

    fn requests<T>(agent: &Agent<Script, T>) -> Vec<Completion> {
        agent.llm.requests.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn answers_without_tools() {
        let agent = agent(CONFIG, vec![Message::assistant("Hi there!")]);
        let thread = agent.start_thread().await;

        let (res, replies) = turn(&agent, thread, "Hello").await;

        assert_eq!(res.unwrap(), "Hi there!");
        assert_eq!(replies, ["Hi ", "there!"]);
        assert_eq!(
            history(&agent, thread).await,
            [Message::user("Hello"), Message::assistant("Hi there!")],
        );

        let requests = requests(&agent);
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].tools[0].name, "search_projects");
    }

    #[tokio::test]
    async fn feeds_tool_outputs_back() {
        let agent = agent(
            CONFIG,
            vec![
                calls(&[("search_projects", r#"{"city":"Pune"}"#)]),
                Message::assistant("Skyline Heights in Baner fits."),
            ],
        );
        let thread = agent.start_thread().await;

        let (res, _) = turn(&agent, thread, "2 BHK flats in Pune?").await;

        assert_eq!(res.unwrap(), "Skyline Heights in Baner fits.");
        let output = requests(&agent)[1].messages.last().cloned().unwrap();
        assert_eq!(output.role, Role::Tool);
        assert_eq!(output.tool_call_id.as_deref(), Some("call_0"));
        assert!(output.content.unwrap().contains("Skyline Heights"));
        assert_eq!(history(&agent, thread).await.len(), 4);
    }

    #[tokio::test]
    async fn reports_tool_errors_to_model() {
        let agent = agent(
            CONFIG,
            vec![
                calls(&[("search_projects", r#"{"city":"#)]),
                Message::assistant("Which city are you looking in?"),
            ],
        );
        let thread = agent.start_thread().await;

        let (res, _) = turn(&agent, thread, "Any flats?").await;

        assert_eq!(res.unwrap(), "Which city are you looking in?");
        let output = requests(&agent)[1]
            .messages
            .last()
            .and_then(|m| m.content.clone())
            .unwrap();
        assert!(output.starts_with("Error: "));
        assert!(
            output.ends_with("\nPlease check the city name or try again later.")
        );
    }

    #[tokio::test]
    async fn streams_every_assistant_text() {
        let mut lookup = calls(&[("search_projects", r#"{"city":"Pune"}"#)]);
        lookup.content = Some("Let me look.".into());
        let agent = agent(CONFIG, vec![lookup, Message::assistant("Found one.")]);
        let thread = agent.start_thread().await;

        let (_, replies) = turn(&agent, thread, "Flats in Pune").await;

        assert_eq!(replies, ["Let ", "me ", "look.", "Found ", "one."]);
    }

    #[tokio::test]
    async fn reports_store_failures_to_model() {
        let tools = Toolbox::new(Service::new(Unreachable), None);
        let schemas = tools.schemas();
        let agent = Agent::new(
            CONFIG,
            Script::new(vec![
                calls(&[("search_projects", r#"{"city":"Pune"}"#)]),
                Message::assistant("Search is down, sorry."),
            ]),
            tools,
            schemas,
        );
        let thread = agent.start_thread().await;

        let (res, _) = turn(&agent, thread, "Flats in Pune").await;

        assert_eq!(res.unwrap(), "Search is down, sorry.");
        let output = requests(&agent)[1].messages.last().cloned().unwrap();
        assert_eq!(output.role, Role::Tool);
        let output = output.content.unwrap();
        assert!(output.starts_with("Error: search failed: "), "{output}");
        assert!(
            output.ends_with("\nPlease check the city name or try again later.")
        );
    }

    #[tokio::test]
    async fn retries_empty_responses() {
        let agent = agent(
            CONFIG,
            vec![Message::assistant(""), Message::assistant("Sure.")],
        );
        let thread = agent.start_thread().await;

        let (res, _) = turn(&agent, thread, "Hello").await;

        assert_eq!(res.unwrap(), "Sure.");
        assert_eq!(
            requests(&agent)[1].messages.last(),
            Some(&Message::user(RETRY_PROMPT)),
        );
        assert_eq!(
            history(&agent, thread).await,
            [Message::user("Hello"), Message::assistant("Sure.")],
        );
    }

    #[tokio::test]
    async fn gives_up_on_empty_responses() {
        let config = Config {
            max_empty_retries: 1,
            ..CONFIG
        };
        let agent = agent(
            config,
            vec![
                Message::assistant(""),
                Message::assistant(" "),
                Message::assistant("Too late."),
            ],
        );
        let thread = agent.start_thread().await;

        let (res, _) = turn(&agent, thread, "Hello").await;

        assert!(matches!(res.unwrap_err().as_ref(), Error::EmptyResponse));
        assert!(history(&agent, thread).await.is_empty());
    }

    #[tokio::test]
    async fn answers_without_tools_after_max_iterations() {
        let config = Config {
            max_iterations: 1,
            ..CONFIG
        };
        let agent = agent(
            config,
            vec![
                calls(&[("search_projects", r#"{"city":"Pune"}"#)]),
                Message::assistant("Here is what I found."),
            ],
        );
        let thread = agent.start_thread().await;

        let (res, _) = turn(&agent, thread, "Flats in Pune").await;

        assert_eq!(res.unwrap(), "Here is what I found.");
        let requests = requests(&agent);
        assert!(!requests[0].tools.is_empty());
        assert!(requests[1].tools.is_empty());
    }

    #[tokio::test]
    async fn retries_final_answer_without_text() {
        let config = Config {
            max_iterations: 1,
            ..CONFIG
        };
        let agent = agent(
            config,
            vec![
                calls(&[("search_projects", r#"{"city":"Pune"}"#)]),
                calls(&[("search_projects", r#"{"city":"Mumbai"}"#)]),
                Message::assistant("Here is what I found."),
            ],
        );
        let thread = agent.start_thread().await;

        let (res, replies) = turn(&agent, thread, "Flats in Pune").await;

        assert_eq!(res.unwrap(), "Here is what I found.");
        assert_eq!(replies.concat(), "Here is what I found.");
        let requests = requests(&agent);
        assert!(requests[2].tools.is_empty());
        assert_eq!(
            requests[2].messages.last(),
            Some(&Message::user(RETRY_PROMPT)),
        );
        let history = history(&agent, thread).await;
        assert_eq!(
            history.last(),
            Some(&Message::assistant("Here is what I found.")),
        );
        assert!(!history.contains(&Message::assistant("")));
    }

    #[tokio::test]
    async fn keeps_history_on_failure() {
        let agent = agent(CONFIG, vec![Message::assistant("Hi!")]);
        let thread = agent.start_thread().await;
        _ = turn(&agent, thread, "Hello").await;

        let (res, _) = turn(&agent, thread, "Still there?").await;

        assert!(matches!(res.unwrap_err().as_ref(), Error::Llm(_)));
        assert_eq!(
            history(&agent, thread).await,
            [Message::user("Hello"), Message::assistant("Hi!")],
        );
    }

    #[tokio::test]
    async fn continues_conversation() {
        let agent = agent(
            CONFIG,
            vec![Message::assistant("Hi!"), Message::assistant("Bye!")],
        );
        let thread = agent.start_thread().await;

        _ = turn(&agent, thread, "Hello").await;
        _ = turn(&agent, thread, "Bye").await;

        let second = &requests(&agent)[1].messages;
        assert_eq!(second.len(), 4);
        assert_eq!(second[1], Message::user("Hello"));
        assert_eq!(second[2], Message::assistant("Hi!"));
    }

    #[tokio::test]
    async fn forgets_expired_threads() {
        let config = Config {
            thread_ttl: time::Duration::ZERO,
            ..CONFIG
        };
        let agent = agent(config, vec![]);
        let idle = agent.start_thread().await;
        let busy = agent.start_thread().await;
        let busy_thread = agent.thread(busy).await.unwrap();
        let _turn = busy_thread.lock().await;

        let fresh = agent.start_thread().await;

        assert!(!agent.has_thread(idle).await);
        assert!(agent.has_thread(busy).await);
        assert!(agent.has_thread(fresh).await);
    }

    #[tokio::test]
    async fn keeps_recent_threads() {
        let agent = agent(CONFIG, vec![]);
        let first = agent.start_thread().await;
        let second = agent.start_thread().await;

        assert!(agent.has_thread(first).await);
        assert!(agent.has_thread(second).await);
    }

    #[tokio::test]
    async fn rejects_unknown_threads() {
        let agent = agent(CONFIG, vec![Message::assistant("Hi!")]);

        let (res, _) = turn(&agent, ThreadId::random(), "Hello").await;

        assert!(matches!(
            res.unwrap_err().as_ref(),
            Error::UnknownThread(_),
        ));
        assert!(requests(&agent).is_empty());
    }
}
