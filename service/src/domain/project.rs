//! [`Project`] definitions.

use std::fmt;

use common::{price, Lakhs};
use derive_more::{Display, Error};
use serde::{Deserialize, Deserializer, Serialize};

/// Residential project listed in a document store.
///
/// Read-only: [`Project`]s are created and owned by the store.
#[derive(Clone, Debug, Deserialize)]
pub struct Project {
    /// [`Name`] of this [`Project`].
    #[serde(rename = "project_name")]
    pub name: Name,

    /// [`Developer`] of this [`Project`], if known.
    #[serde(default)]
    pub developer: Option<Developer>,

    /// [`ReraId`] this [`Project`] is registered with, if any.
    #[serde(default)]
    pub rera_id: Option<ReraId>,

    /// [`Location`] of this [`Project`].
    pub location: Location,

    /// [`PriceInfo`] of this [`Project`].
    #[serde(default, deserialize_with = "nullable")]
    pub price_info: PriceInfo,

    /// [`Unit`]s offered by this [`Project`], in the listed order.
    #[serde(default, deserialize_with = "nullable")]
    pub configuration: Vec<Unit>,

    /// [`Status`] of this [`Project`], if known.
    #[serde(default)]
    pub status: Option<Status>,

    /// [`Possession`] details of this [`Project`].
    #[serde(default, deserialize_with = "nullable")]
    pub possession: Possession,

    /// [`Amenity`]s of this [`Project`].
    #[serde(default, deserialize_with = "nullable")]
    pub amenities: Vec<Amenity>,
}

/// Defines a free-text [`Project`] attribute.
macro_rules! define_text {
    ($(#[doc = $doc:literal] $name:ident),* $(,)?) => {$(
        #[doc = $doc]
        #[derive(
            Clone, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new value out of the provided `text`.
            #[must_use]
            pub fn new(text: impl Into<String>) -> Self {
                Self(text.into())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    )*};
}

define_text! {
    #[doc = "Name of a [`Project`]."]
    Name,

    #[doc = "Developer (builder) of a [`Project`]."]
    Developer,

    #[doc = "[RERA] registration ID of a [`Project`].\n\n\
             [RERA]: https://en.wikipedia.org/wiki/Real_Estate_Regulatory_Authority"]
    ReraId,

    #[doc = "City a [`Project`] is located in."]
    City,

    #[doc = "Locality (area of a [`City`]) a [`Project`] is located in."]
    Locality,

    #[doc = "Free-text status of a [`Project`] (like `Under Construction`)."]
    Status,

    #[doc = "Amenity offered by a [`Project`] (like `gym`)."]
    Amenity,

    #[doc = "Type label of a [`Unit`] (like `2 BHK`)."]
    UnitType,

    #[doc = "Descriptor of when possession of a [`Project`] starts."]
    PossessionStart,

    #[doc = "Display price (like `₹1.25 Cr` or `₹72 L`)."]
    Price,
}

impl Price {
    /// Normalizes this [`Price`] into [`Lakhs`].
    ///
    /// # Errors
    ///
    /// If this [`Price`] has a crore or lakh marker, but no valid amount.
    pub fn to_lakhs(&self) -> Result<Lakhs, price::ParseError> {
        Lakhs::normalize(Some(&self.0))
    }
}

/// Location of a [`Project`].
#[derive(Clone, Debug, Deserialize)]
pub struct Location {
    /// [`City`] of this [`Location`].
    pub city: City,

    /// [`Locality`] of this [`Location`], if known.
    #[serde(default)]
    pub locality: Option<Locality>,
}

/// Price information of a [`Project`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PriceInfo {
    /// All-inclusive [`PriceRange`] (base price with standard fees).
    #[serde(default, deserialize_with = "nullable")]
    pub all_inclusive_price_range: PriceRange,
}

/// Range of [`Price`]s of a [`Project`].
///
/// Stored either as `{ "min": .., "max": .. }` or as a `[min, max]` pair.
#[derive(Clone, Debug, Default, Serialize)]
pub struct PriceRange {
    /// Minimum [`Price`], if any.
    pub min: Option<Price>,

    /// Maximum [`Price`], if any.
    pub max: Option<Price>,
}

impl PriceRange {
    /// Returns the normalized `(min, max)` bounds of this [`PriceRange`].
    ///
    /// # Errors
    ///
    /// If any of the bounds is absent, empty or not a valid [`Price`].
    pub fn bounds(&self) -> Result<(Lakhs, Lakhs), BoundsError> {
        let bound = |price: Option<&Price>| -> Result<Lakhs, BoundsError> {
            let price = price
                .filter(|p| !p.as_ref().trim().is_empty())
                .ok_or(BoundsError::Missing)?;
            price.to_lakhs().map_err(BoundsError::Invalid)
        };
        Ok((bound(self.min.as_ref())?, bound(self.max.as_ref())?))
    }
}

impl<'de> Deserialize<'de> for PriceRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Stored representations of a [`PriceRange`].
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            /// `[min, max]` pair.
            Pair(Option<Price>, Option<Price>),

            /// `{ "min": .., "max": .. }` object.
            Bounds {
                /// Minimum [`Price`].
                #[serde(default)]
                min: Option<Price>,

                /// Maximum [`Price`].
                #[serde(default)]
                max: Option<Price>,
            },
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Pair(min, max) | Repr::Bounds { min, max } => {
                Self { min, max }
            }
        })
    }
}

/// Error of normalizing [`PriceRange::bounds()`].
#[derive(Clone, Debug, Display, Error)]
pub enum BoundsError {
    /// Bound is absent or empty.
    #[display("price range bound is missing")]
    Missing,

    /// Bound is not a valid [`Price`].
    #[display("price range bound is invalid: {_0}")]
    Invalid(price::ParseError),
}

/// Unit type offered by a [`Project`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Unit {
    /// [`UnitType`] of this [`Unit`].
    #[serde(rename = "type")]
    pub kind: UnitType,

    /// [`CarpetArea`] of this [`Unit`], if known.
    #[serde(default)]
    pub carpet_area_sqft: Option<CarpetArea>,
}

/// Carpet area of a [`Unit`] in square feet, carried through as stored.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CarpetArea {
    /// Numeric area (like `1200`).
    Number(serde_json::Number),

    /// Textual area (like `1,200 - 1,350`).
    Text(String),
}

impl fmt::Display for CarpetArea {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n} sq.ft."),
            Self::Text(t) => write!(f, "{t} sq.ft."),
        }
    }
}

/// Possession details of a [`Project`].
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Possession {
    /// [`PossessionStart`], if known.
    #[serde(default)]
    pub start: Option<PossessionStart>,
}

/// Deserializes `null` as the default value of `T`.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}
