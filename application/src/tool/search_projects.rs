//! `search_projects` tool definitions.

use common::Lakhs;
use serde::{Deserialize, Serialize};
use serde_json::json;
use service::{
    domain::project,
    read::project::search::{Filter, Item, Outcome, NOT_FOUND},
};

use crate::llm::ToolSchema;

use super::Error;

/// Name of the tool.
pub const NAME: &str = "search_projects";

/// Returns the [`ToolSchema`] of the tool.
#[must_use]
pub fn schema() -> ToolSchema {
    ToolSchema {
        name: NAME,
        description: "Searches residential real-estate projects in a city. \
                      Budgets are in lakhs (1 crore = 100 lakhs).",
        parameters: json!({
            "type": "object",
            "properties": {
                "city": {
                    "type": "string",
                    "description": "City to search in, like `Pune`.",
                },
                "locality": {
                    "type": "string",
                    "description": "Locality (area) of the city, like `Baner`.",
                },
                "unit_type": {
                    "type": "string",
                    "description": "Unit type, like `2 BHK`.",
                },
                "min_budget_lakh": {
                    "type": "number",
                    "description": "Minimum budget in lakhs.",
                },
                "max_budget_lakh": {
                    "type": "number",
                    "description": "Maximum budget in lakhs.",
                },
                "status": {
                    "type": "string",
                    "description": "Project status, like `Ready to Move`.",
                },
                "amenities": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Amenities every project must have.",
                },
                "developer": {
                    "type": "string",
                    "description": "Developer (builder) name.",
                },
                "rera_only": {
                    "type": "boolean",
                    "description": "Whether to list RERA registered \
                                    projects only.",
                },
            },
            "required": ["city"],
        }),
    }
}

/// Arguments of the tool.
///
/// Decoded leniently out of whatever a language model sends:
/// - blank texts and `null`s are treated as absent ones;
/// - numeric strings are accepted as budgets, and unreadable budgets are
///   ignored;
/// - a single amenity may be given instead of a list;
/// - a missing or blank `city` matches nothing.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Args {
    /// City to search in.
    #[serde(deserialize_with = "lenient::text")]
    pub city: Option<String>,

    /// Part of a locality to match.
    #[serde(deserialize_with = "lenient::text")]
    pub locality: Option<String>,

    /// Part of a unit type to match.
    #[serde(deserialize_with = "lenient::text")]
    pub unit_type: Option<String>,

    /// Minimum budget in lakhs.
    #[serde(deserialize_with = "lenient::number")]
    pub min_budget_lakh: Option<f64>,

    /// Maximum budget in lakhs.
    #[serde(deserialize_with = "lenient::number")]
    pub max_budget_lakh: Option<f64>,

    /// Part of a status to match.
    #[serde(deserialize_with = "lenient::text")]
    pub status: Option<String>,

    /// Amenities every project must have.
    #[serde(deserialize_with = "lenient::texts")]
    pub amenities: Vec<String>,

    /// Part of a developer name to match.
    #[serde(deserialize_with = "lenient::text")]
    pub developer: Option<String>,

    /// Whether only RERA registered projects match.
    #[serde(deserialize_with = "lenient::flag")]
    pub rera_only: bool,
}

impl Args {
    /// Decodes [`Args`] out of the provided JSON `value`.
    ///
    /// Anything but a JSON object decodes into the default [`Args`].
    #[must_use]
    pub fn from_value(value: serde_json::Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }
}

impl From<Args> for Filter {
    fn from(args: Args) -> Self {
        let Args {
            city,
            locality,
            unit_type,
            min_budget_lakh,
            max_budget_lakh,
            status,
            amenities,
            developer,
            rera_only,
        } = args;

        Self {
            city: project::City::new(non_blank(city).unwrap_or_default()),
            locality: non_blank(locality),
            unit_type: non_blank(unit_type),
            min_budget: min_budget_lakh.and_then(Lakhs::from_f64),
            max_budget: max_budget_lakh.and_then(Lakhs::from_f64),
            status: non_blank(status),
            amenities: amenities
                .into_iter()
                .filter_map(|a| non_blank(Some(a)))
                .map(project::Amenity::new)
                .collect(),
            developer: non_blank(developer),
            rera_only,
        }
    }
}

/// Output of the tool: either the found [`Item`]s or the [`NOT_FOUND`]
/// sentinel.
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(untagged)]
pub enum Output<'o> {
    /// Found [`Item`]s.
    Found(&'o [Item]),

    /// Nothing found.
    NotFound(&'static str),
}

impl<'o> From<&'o Outcome> for Output<'o> {
    fn from(outcome: &'o Outcome) -> Self {
        match outcome {
            Outcome::Found(items) => Self::Found(items),
            Outcome::Empty => Self::NotFound(NOT_FOUND),
        }
    }
}

/// Renders the provided [`Outcome`] as the tool output text.
///
/// # Errors
///
/// If failed to serialize the found [`Item`]s.
pub fn render(outcome: &Outcome) -> Result<String, Error> {
    match Output::from(outcome) {
        Output::Found(items) => {
            serde_json::to_string(items).map_err(Error::Output)
        }
        Output::NotFound(sentinel) => Ok(sentinel.to_owned()),
    }
}

/// Trims the provided `text`, omitting it if blank.
fn non_blank(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty())
}

/// Lenient deserializers of [`Args`] fields.
mod lenient {
    use serde::{Deserialize as _, Deserializer};
    use serde_json::Value;

    /// Deserializes a string or a number as text, and anything else as
    /// [`None`].
    pub(super) fn text<'de, D>(de: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(as_text(Value::deserialize(de)?))
    }

    /// Deserializes a finite number or a numeric string, and anything else
    /// as [`None`].
    pub(super) fn number<'de, D>(de: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let number = match Value::deserialize(de)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
                None
            }
        };
        Ok(number.filter(|n: &f64| n.is_finite()))
    }

    /// Deserializes a list of texts, a single text, or `null` as no texts.
    pub(super) fn texts<'de, D>(de: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(de)? {
            Value::Array(items) => {
                items.into_iter().filter_map(as_text).collect()
            }
            v @ (Value::Null
            | Value::Bool(_)
            | Value::Number(_)
            | Value::String(_)
            | Value::Object(_)) => as_text(v).into_iter().collect(),
        })
    }

    /// Deserializes a boolean or a `"true"` string, and anything else as
    /// `false`.
    pub(super) fn flag<'de, D>(de: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(de)? {
            Value::Bool(b) => b,
            Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
            Value::Null | Value::Number(_) | Value::Array(_) | Value::Object(_) => {
                false
            }
        })
    }

    fn as_text(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Null | Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
                None
            }
        }
    }
}

#[cfg(test)]
mod spec {
    use serde_json::json;
    use service::read::project::search::{Filter, Outcome};

    use super::{render, Args, Output};

    fn filter(args: serde_json::Value) -> Filter {
        Args::from_value(args).into()
    }

    #[test]
    fn reads_all_arguments() {
        let filter = filter(json!({
            "city": " Pune ",
            "locality": "Baner",
            "unit_type": "2 BHK",
            "min_budget_lakh": 80,
            "max_budget_lakh": 120.5,
            "status": "Ready",
            "amenities": ["pool", "gym"],
            "developer": "Acme",
            "rera_only": true,
        }));

        assert_eq!(filter.city.as_ref(), "Pune");
        assert_eq!(filter.locality.as_deref(), Some("Baner"));
        assert_eq!(filter.unit_type.as_deref(), Some("2 BHK"));
        assert_eq!(filter.min_budget.unwrap().to_string(), "80 L");
        assert_eq!(filter.max_budget.unwrap().to_string(), "120.5 L");
        assert_eq!(filter.status.as_deref(), Some("Ready"));
        assert_eq!(filter.amenities.len(), 2);
        assert_eq!(filter.developer.as_deref(), Some("Acme"));
        assert!(filter.rera_only);
    }

    #[test]
    fn treats_nulls_and_blanks_as_absent() {
        let filter = filter(json!({
            "city": "Pune",
            "locality": "",
            "unit_type": null,
            "min_budget_lakh": null,
            "amenities": null,
            "developer": "  ",
            "rera_only": null,
        }));

        assert!(filter.locality.is_none());
        assert!(filter.unit_type.is_none());
        assert!(filter.min_budget.is_none());
        assert!(filter.amenities.is_empty());
        assert!(filter.developer.is_none());
        assert!(!filter.rera_only);
    }

    #[test]
    fn coerces_loosely_typed_arguments() {
        let filter = filter(json!({
            "city": "Pune",
            "min_budget_lakh": "80",
            "max_budget_lakh": " 120.5 ",
            "amenities": "gym",
            "rera_only": "True",
        }));

        assert_eq!(filter.min_budget.unwrap().to_string(), "80 L");
        assert_eq!(filter.max_budget.unwrap().to_string(), "120.5 L");
        assert_eq!(filter.amenities.len(), 1);
        assert_eq!(filter.amenities[0].as_ref(), "gym");
        assert!(filter.rera_only);
    }

    #[test]
    fn ignores_unreadable_arguments() {
        let filter = filter(json!({
            "city": "Pune",
            "min_budget_lakh": "about a crore",
            "max_budget_lakh": [1],
            "locality": { "name": "Baner" },
            "amenities": ["pool", 7, null, " "],
            "rera_only": 1,
        }));

        assert!(filter.min_budget.is_none());
        assert!(filter.max_budget.is_none());
        assert!(filter.locality.is_none());
        assert_eq!(
            filter
                .amenities
                .iter()
                .map(AsRef::as_ref)
                .collect::<Vec<&str>>(),
            ["pool", "7"],
        );
        assert!(!filter.rera_only);
    }

    #[test]
    fn leaves_city_empty_when_missing_or_blank() {
        assert_eq!(filter(json!({})).city.as_ref(), "");
        assert_eq!(filter(json!({ "city": "  " })).city.as_ref(), "");
        assert_eq!(filter(json!({ "city": null })).city.as_ref(), "");
        assert_eq!(filter(json!("Pune")).city.as_ref(), "");
    }

    #[test]
    fn renders_empty_outcome_as_sentinel() {
        assert_eq!(
            render(&Outcome::Empty).unwrap(),
            "No matching projects found.",
        );
        assert_eq!(render(&Outcome::Found(vec![])).unwrap(), "[]");
    }

    #[test]
    fn outputs_sentinel_as_json_string() {
        assert_eq!(
            serde_json::to_value(Output::from(&Outcome::Empty)).unwrap(),
            "No matching projects found.",
        );
        assert_eq!(
            serde_json::to_value(Output::from(&Outcome::Found(vec![])))
                .unwrap(),
            serde_json::json!([]),
        );
    }
}
