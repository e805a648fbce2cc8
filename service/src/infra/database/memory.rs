//! In-memory [`Database`] implementation.

use std::sync::Arc;

use common::operations::{By, Select};
use regex::Regex;
use tracerr::Traced;

use crate::infra::{
    database::{
        self,
        document::{Condition, Document, Filter},
    },
    Database,
};

/// In-memory [`Database`] of [`Document`]s, kept in insertion order.
#[derive(Clone, Debug, Default)]
pub struct Memory {
    /// [`Document`]s of this [`Memory`] store.
    documents: Arc<[Document]>,
}

impl Memory {
    /// Creates a new [`Memory`] store holding the provided [`Document`]s.
    #[must_use]
    pub fn new(documents: impl IntoIterator<Item = Document>) -> Self {
        Self {
            documents: documents.into_iter().collect(),
        }
    }

    /// Returns all the [`Document`]s of this [`Memory`] store.
    #[must_use]
    pub fn documents(&self) -> &[Document] {
        &self.documents
    }
}

/// [`Condition`] prepared for evaluating against [`Document`]s.
enum Compiled<'f> {
    /// Compiled [`Condition::Matches`].
    Matches(Regex),

    /// [`Condition::ContainsAll`].
    ContainsAll(&'f [String]),

    /// [`Condition::NonEmpty`].
    NonEmpty,
}

impl<'f> Compiled<'f> {
    /// Prepares the provided [`Condition`] for evaluating.
    fn new(condition: &'f Condition) -> Result<Self, regex::Error> {
        Ok(match condition {
            Condition::Matches(p) => Self::Matches(p.to_regex()?),
            Condition::ContainsAll(values) => Self::ContainsAll(values),
            Condition::NonEmpty => Self::NonEmpty,
        })
    }

    /// Checks whether the provided `value` satisfies this [`Compiled`]
    /// condition.
    fn is_satisfied_by(&self, value: Option<&Document>) -> bool {
        match (self, value) {
            (Self::Matches(re), Some(Document::String(s))) => re.is_match(s),
            (Self::ContainsAll(wanted), Some(Document::Array(items))) => {
                wanted.iter().all(|w| items.iter().any(|i| i == w.as_str()))
            }
            (Self::ContainsAll(wanted), None | Some(Document::Null)) => {
                wanted.is_empty()
            }
            (Self::NonEmpty, Some(Document::String(s))) => !s.is_empty(),
            (Self::NonEmpty, Some(v)) => !v.is_null(),
            (Self::Matches(_) | Self::ContainsAll(_), _)
            | (Self::NonEmpty, None) => false,
        }
    }
}

impl Database<Select<By<Vec<Document>, Filter>>> for Memory {
    type Ok = Vec<Document>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Vec<Document>, Filter>>,
    ) -> Result<Self::Ok, Self::Err> {
        let filter = by.into_inner();
        let conditions = filter
            .conditions()
            .iter()
            .map(|(path, cond)| Compiled::new(cond).map(|c| (*path, c)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(tracerr::from_and_wrap!(=> database::Error))?;

        Ok(self
            .documents
            .iter()
            .filter(|doc| {
                conditions
                    .iter()
                    .all(|(path, cond)| cond.is_satisfied_by(path.lookup(doc)))
            })
            .cloned()
            .collect())
    }
}
