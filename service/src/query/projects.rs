//! [`Query`] collection related to the multiple [`Project`]s.

use common::operations::{By, Select};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{project, Project},
    infra::{
        database::{
            self,
            document::{self, Condition, Document, Path, Pattern},
        },
        Database,
    },
    read::project::search::{Filter, Item, Outcome, MAX_AMENITIES, MAX_ITEMS},
    Query, Service,
};

/// [`Query`] searching [`Project`]s matching a [`Filter`].
///
/// Results in at most [`MAX_ITEMS`] of [`Item`]s, in the order of the
/// underlying [`Database`].
#[derive(Clone, Debug)]
pub struct Search(pub Filter);

/// [`Path`] to [`project::City`] in a [`Project`] [`Document`].
const CITY: Path = Path::new(&["location", "city"]);

/// [`Path`] to [`project::Locality`] in a [`Project`] [`Document`].
const LOCALITY: Path = Path::new(&["location", "locality"]);

/// [`Path`] to [`project::Status`] in a [`Project`] [`Document`].
const STATUS: Path = Path::new(&["status"]);

/// [`Path`] to [`project::Developer`] in a [`Project`] [`Document`].
const DEVELOPER: Path = Path::new(&["developer"]);

/// [`Path`] to [`project::Amenity`]s in a [`Project`] [`Document`].
const AMENITIES: Path = Path::new(&["amenities"]);

/// [`Path`] to [`project::ReraId`] in a [`Project`] [`Document`].
const RERA_ID: Path = Path::new(&["rera_id"]);

impl<Db> Query<Search> for Service<Db>
where
    Db: Database<
            Select<By<Vec<Document>, document::Filter>>,
            Ok = Vec<Document>,
            Err = Traced<database::Error>,
        > + Sync,
{
    type Ok = Outcome;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Search(filter): Search,
    ) -> Result<Self::Ok, Self::Err> {
        let candidates = self
            .database()
            .execute(Select(By::new(store_filter(&filter))))
            .await
            .map_err(tracerr::wrap!())?;
        let total = candidates.len();

        let items = candidates
            .into_iter()
            .filter_map(|doc| shape(doc, &filter))
            .take(MAX_ITEMS)
            .collect::<Vec<_>>();
        log::debug!(
            "found {} of {total} candidate projects in `{}`",
            items.len(),
            filter.city,
        );

        Ok(items.into())
    }
}

/// Builds a [`document::Filter`] selecting the candidates for the provided
/// [`Filter`].
///
/// Budget and unit type can't be matched by a [`Database`], so the selected
/// candidates are a superset of the matching [`Project`]s.
fn store_filter(filter: &Filter) -> document::Filter {
    let mut out = document::Filter::default()
        .with(CITY, Condition::Matches(Pattern::exact(filter.city.as_ref())));

    for (path, text) in [
        (LOCALITY, &filter.locality),
        (STATUS, &filter.status),
        (DEVELOPER, &filter.developer),
    ] {
        if let Some(text) = text {
            out = out.with(path, Condition::Matches(Pattern::containing(text)));
        }
    }
    if !filter.amenities.is_empty() {
        out = out.with(
            AMENITIES,
            Condition::ContainsAll(
                filter
                    .amenities
                    .iter()
                    .map(|a| a.as_ref().to_owned())
                    .collect(),
            ),
        );
    }
    if filter.rera_only {
        out = out.with(RERA_ID, Condition::NonEmpty);
    }

    out
}

/// Shapes the provided candidate [`Document`] into an [`Item`], if it
/// matches the [`Filter`].
fn shape(doc: Document, filter: &Filter) -> Option<Item> {
    let project = match serde_json::from_value::<Project>(doc) {
        Ok(p) => p,
        Err(e) => {
            log::debug!("skipping unreadable project: {e}");
            return None;
        }
    };

    let (min, max) = match project.price_info.all_inclusive_price_range.bounds()
    {
        Ok(bounds) => bounds,
        Err(e) => {
            log::debug!("skipping project `{}`: {e}", project.name);
            return None;
        }
    };
    if filter.min_budget.is_some_and(|budget| max < budget)
        || filter.max_budget.is_some_and(|budget| min > budget)
    {
        return None;
    }

    let units = match &filter.unit_type {
        Some(wanted) => {
            let wanted = wanted.to_lowercase();
            let units = project
                .configuration
                .into_iter()
                .filter(|u| u.kind.as_ref().to_lowercase().contains(&wanted))
                .collect::<Vec<_>>();
            if units.is_empty() {
                return None;
            }
            units
        }
        None => project.configuration,
    };

    let Project {
        name,
        developer,
        rera_id,
        location: project::Location { city, locality },
        price_info,
        status,
        possession,
        mut amenities,
        ..
    } = project;
    amenities.truncate(MAX_AMENITIES);

    Some(Item {
        project_name: name,
        developer,
        locality,
        city,
        bhk_available: units,
        price_range: price_info.all_inclusive_price_range,
        status,
        possession_start: possession.start,
        amenities,
        rera_id,
    })
}
