//! Tools callable by a language model.

pub mod scrape;
pub mod search_projects;

use common::{operations::Perform, Handler};
use derive_more::{Display, Error as StdError, From};
use service::{
    infra::database,
    query::SearchProjects,
    read::project::search::{Filter, Outcome},
    Query,
};
use tracerr::Traced;
use tracing as log;

use crate::llm::{ToolCall, ToolSchema};

pub use self::scrape::Scraper;

/// Set of tools callable by a language model.
#[derive(Clone, Debug)]
pub struct Toolbox<Svc> {
    /// [`Service`] searching projects.
    ///
    /// [`Service`]: service::Service
    service: Svc,

    /// [`Scraper`] fetching listing pages, if enabled.
    scraper: Option<Scraper>,
}

impl<Svc> Toolbox<Svc> {
    /// Creates a new [`Toolbox`] with the provided parameters.
    #[must_use]
    pub fn new(service: Svc, scraper: Option<Scraper>) -> Self {
        Self { service, scraper }
    }

    /// Returns the [`ToolSchema`]s of all the tools in this [`Toolbox`].
    #[must_use]
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = vec![search_projects::schema()];
        if self.scraper.is_some() {
            schemas.push(scrape::schema());
        }
        schemas
    }
}

impl<Svc> Handler<Perform<search_projects::Args>> for Toolbox<Svc>
where
    Svc: Query<SearchProjects, Ok = Outcome, Err = Traced<database::Error>>
        + Sync,
{
    type Ok = Outcome;
    type Err = Traced<Error>;

    async fn execute(
        &self,
        Perform(args): Perform<search_projects::Args>,
    ) -> Result<Self::Ok, Self::Err> {
        let filter = Filter::from(args);
        if filter.city.as_ref().is_empty() {
            log::debug!("no city to search projects in");
            return Ok(Outcome::Empty);
        }
        self.service
            .execute(SearchProjects(filter))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> Error))
    }
}

impl<Svc> Handler<Perform<ToolCall>> for Toolbox<Svc>
where
    Svc: Query<SearchProjects, Ok = Outcome, Err = Traced<database::Error>>
        + Sync,
{
    type Ok = String;
    type Err = Traced<Error>;

    async fn execute(
        &self,
        Perform(call): Perform<ToolCall>,
    ) -> Result<Self::Ok, Self::Err> {
        log::debug!("calling `{}` tool with: {}", call.name, call.arguments);

        match (call.name.as_str(), &self.scraper) {
            (search_projects::NAME, _) => {
                let args = serde_json::from_str(&call.arguments)
                    .map(search_projects::Args::from_value)
                    .map_err(|e| tracerr::new!(Error::Arguments(e)))?;
                let outcome = self
                    .execute(Perform(args))
                    .await
                    .map_err(tracerr::wrap!())?;
                search_projects::render(&outcome)
                    .map_err(tracerr::from_and_wrap!(=> Error))
            }
            (scrape::NAME, Some(scraper)) => {
                let scrape::Args { city } =
                    serde_json::from_str(&call.arguments)
                        .map_err(|e| tracerr::new!(Error::Arguments(e)))?;
                Ok(scraper.listings(&city).await)
            }
            (name, _) => Err(tracerr::new!(Error::UnknownTool(name.to_owned()))),
        }
    }
}

/// [`Toolbox`] error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// Tool arguments are not a JSON.
    #[display("invalid tool arguments: {_0}")]
    Arguments(serde_json::Error),

    /// [`database::Error`] occurred while searching.
    #[display("search failed: {_0}")]
    #[from]
    Database(database::Error),

    /// Tool output failed to serialize.
    #[display("failed to render tool output: {_0}")]
    Output(serde_json::Error),

    /// Requested tool doesn't exist.
    #[display("unknown tool `{_0}`")]
    UnknownTool(#[error(not(source))] String),
}
