//! [`Project`]-related read definitions.

#[cfg(doc)]
use crate::domain::Project;

pub mod search {
    //! [`Project`] search definitions.

    use common::Lakhs;
    use serde::Serialize;

    use crate::domain::project;
    #[cfg(doc)]
    use crate::domain::Project;

    /// Maximum number of [`Item`]s a search results in.
    pub const MAX_ITEMS: usize = 5;

    /// Maximum number of [`project::Amenity`]s listed in an [`Item`].
    pub const MAX_AMENITIES: usize = 5;

    /// Text reporting an [`Outcome::Empty`] search to a language model.
    pub const NOT_FOUND: &str = "No matching projects found.";

    /// Filter of a [`Project`] search.
    ///
    /// All the text matching ignores case.
    #[derive(Clone, Debug)]
    pub struct Filter {
        /// [`project::City`] to search in, matched exactly.
        pub city: project::City,

        /// Part of a [`project::Locality`] to match.
        pub locality: Option<String>,

        /// Part of a [`project::UnitType`] (like `2 BHK`) to match.
        ///
        /// A [`Project`] matches if at least one of its units does, and only
        /// the matching units are listed in its [`Item`].
        pub unit_type: Option<String>,

        /// Minimum budget.
        ///
        /// [`Project`]s whose maximum price is below it are excluded.
        pub min_budget: Option<Lakhs>,

        /// Maximum budget.
        ///
        /// [`Project`]s whose minimum price is above it are excluded.
        pub max_budget: Option<Lakhs>,

        /// Part of a [`project::Status`] to match.
        pub status: Option<String>,

        /// [`project::Amenity`]s a [`Project`] must have, all of them.
        ///
        /// Names are matched exactly.
        pub amenities: Vec<project::Amenity>,

        /// Part of a [`project::Developer`] name to match.
        pub developer: Option<String>,

        /// Indicator whether only [`Project`]s having a non-empty
        /// [`project::ReraId`] match.
        pub rera_only: bool,
    }

    impl Filter {
        /// Creates a new [`Filter`] matching every [`Project`] in the
        /// provided [`project::City`].
        #[must_use]
        pub fn in_city(city: project::City) -> Self {
            Self {
                city,
                locality: None,
                unit_type: None,
                min_budget: None,
                max_budget: None,
                status: None,
                amenities: Vec::new(),
                developer: None,
                rera_only: false,
            }
        }
    }

    /// Found [`Project`] shaped for presenting.
    #[derive(Clone, Debug, Serialize)]
    pub struct Item {
        /// [`project::Name`] of the [`Project`].
        pub project_name: project::Name,

        /// [`project::Developer`] of the [`Project`].
        pub developer: Option<project::Developer>,

        /// [`project::Locality`] of the [`Project`].
        pub locality: Option<project::Locality>,

        /// [`project::City`] of the [`Project`].
        pub city: project::City,

        /// [`project::Unit`]s of the [`Project`] matching the [`Filter`].
        pub bhk_available: Vec<project::Unit>,

        /// All-inclusive [`project::PriceRange`], as stored.
        pub price_range: project::PriceRange,

        /// [`project::Status`] of the [`Project`].
        pub status: Option<project::Status>,

        /// [`project::PossessionStart`] of the [`Project`].
        pub possession_start: Option<project::PossessionStart>,

        /// First [`MAX_AMENITIES`] of the [`Project`]'s amenities.
        pub amenities: Vec<project::Amenity>,

        /// [`project::ReraId`] of the [`Project`].
        pub rera_id: Option<project::ReraId>,
    }

    /// Outcome of a [`Project`] search.
    #[derive(Clone, Debug)]
    pub enum Outcome {
        /// At least one [`Project`] matched.
        Found(Vec<Item>),

        /// Nothing matched.
        Empty,
    }

    impl Outcome {
        /// Returns the found [`Item`]s (empty for [`Outcome::Empty`]).
        #[must_use]
        pub fn items(&self) -> &[Item] {
            match self {
                Self::Found(items) => items,
                Self::Empty => &[],
            }
        }
    }

    impl From<Vec<Item>> for Outcome {
        fn from(items: Vec<Item>) -> Self {
            if items.is_empty() {
                Self::Empty
            } else {
                Self::Found(items)
            }
        }
    }
}
