//! HTTP API of an [`Agent`].

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::post,
    Json, Router,
};
use common::{operations::Perform, Handler};
use futures::{
    channel::{mpsc, oneshot},
    stream, Stream, StreamExt as _,
};
use serde::{Deserialize, Serialize};
use service::read::project::search::Outcome;
use tracerr::Traced;
use tracing as log;

use crate::{
    agent::{self, Agent, ThreadId, Turn},
    llm::{self, Completion, Llm, Message, ToolCall},
    tool::{self, search_projects},
    AsError, Error,
};

/// Creates a new [`Router`] serving the provided [`Agent`].
pub fn router<L, T>(agent: Arc<Agent<L, T>>) -> Router
where
    L: Llm<Perform<Completion>, Ok = Message, Err = Traced<llm::Error>>
        + Send
        + Sync
        + 'static,
    T: Handler<Perform<ToolCall>, Ok = String, Err = Traced<tool::Error>>
        + Handler<
            Perform<search_projects::Args>,
            Ok = Outcome,
            Err = Traced<tool::Error>,
        > + Send
        + Sync
        + 'static,
{
    Router::new()
        .route("/threads", post(create_thread::<L, T>))
        .route("/threads/:id/messages", post(post_message::<L, T>))
        .route("/tools/search_projects", post(search::<L, T>))
        .with_state(agent)
}

/// Body of a created conversation thread.
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct NewThread {
    /// [`ThreadId`] of the created thread.
    pub thread_id: ThreadId,
}

/// Body of a posted user message.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct NewMessage {
    /// Text of the message.
    pub content: String,
}

/// `POST /threads` starting a new conversation thread.
async fn create_thread<L, T>(
    State(agent): State<Arc<Agent<L, T>>>,
) -> (http::StatusCode, Json<NewThread>)
where
    L: Send + Sync,
    T: Send + Sync,
{
    let thread_id = agent.start_thread().await;
    (http::StatusCode::CREATED, Json(NewThread { thread_id }))
}

/// `POST /threads/:id/messages` performing a [`Turn`] in the conversation
/// thread.
///
/// Responds with a stream of `message` events carrying assistant text pieces,
/// finished with either a `done` or an `error` event.
async fn post_message<L, T>(
    State(agent): State<Arc<Agent<L, T>>>,
    Path(thread): Path<ThreadId>,
    Json(NewMessage { content }): Json<NewMessage>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + Send>, Error>
where
    L: Llm<Perform<Completion>, Ok = Message, Err = Traced<llm::Error>>
        + Send
        + Sync
        + 'static,
    T: Handler<Perform<ToolCall>, Ok = String, Err = Traced<tool::Error>>
        + Send
        + Sync
        + 'static,
{
    if !agent.has_thread(thread).await {
        return Err(tracerr::new!(agent::Error::UnknownThread(thread))
            .into_error());
    }

    let (replies, texts) = mpsc::unbounded();
    let (finished, outcome) = oneshot::channel();
    // Detached, so the turn is committed even if the client goes away.
    drop(tokio::spawn(async move {
        let res = agent
            .execute(Perform(Turn {
                thread,
                content,
                replies,
            }))
            .await;
        _ = finished.send(res);
    }));

    let events = texts
        .map(|text| Event::default().event("message").data(text))
        .chain(stream::once(async move {
            let err = match outcome.await {
                Ok(Ok(_)) => return Event::default().event("done").data(""),
                Ok(Err(e)) => {
                    log::error!("turn in thread `{thread}` failed: {e}");
                    e.into_error()
                }
                Err(e) => Error::internal(&e),
            };
            Event::default().event("error").data(err.message)
        }))
        .map(Ok);

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

/// `POST /tools/search_projects` searching projects without a language model.
///
/// Arguments are decoded as leniently as the ones of a language model.
async fn search<L, T>(
    State(agent): State<Arc<Agent<L, T>>>,
    Json(args): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, Error>
where
    L: Send + Sync,
    T: Handler<
            Perform<search_projects::Args>,
            Ok = Outcome,
            Err = Traced<tool::Error>,
        > + Send
        + Sync,
{
    let outcome = agent
        .tools()
        .execute(Perform(search_projects::Args::from_value(args)))
        .await
        .map_err(AsError::into_error)?;
    serde_json::to_value(search_projects::Output::from(&outcome))
        .map(Json)
        .map_err(|e| Error::internal(&e))
}
