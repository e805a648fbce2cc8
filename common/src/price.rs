//! [`Lakhs`]-related definitions.

use derive_more::{Display, Error};
use rust_decimal::{prelude::FromPrimitive as _, Decimal};

/// Rupee glyph prefixing display prices.
const RUPEE: char = '\u{20B9}';

/// Marker of a display price expressed in crores.
const CRORE: &str = "Cr";

/// Marker of a display price expressed in lakhs.
const LAKH: &str = "L";

/// Amount of money in lakhs (`100 000` rupees).
#[derive(
    Clone, Copy, Debug, Default, Display, Eq, Hash, Ord, PartialEq, PartialOrd,
)]
#[display("{} L", _0.normalize())]
pub struct Lakhs(Decimal);

impl Lakhs {
    /// Zero [`Lakhs`].
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Number of [`Lakhs`] in one crore.
    const PER_CRORE: Decimal = Decimal::ONE_HUNDRED;

    /// Creates new [`Lakhs`] out of the provided `amount`.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Creates new [`Lakhs`] out of the provided floating-point `amount`.
    ///
    /// [`None`] is returned if the `amount` is not finite.
    #[must_use]
    pub fn from_f64(amount: f64) -> Option<Self> {
        Decimal::from_f64(amount).map(Self)
    }

    /// Returns the amount of these [`Lakhs`].
    #[must_use]
    pub const fn amount(self) -> Decimal {
        self.0
    }

    /// Normalizes the provided display price (like `₹1.25 Cr` or `₹72 L`)
    /// into [`Lakhs`].
    ///
    /// Absent or empty `text`, as well as `text` having neither a crore nor a
    /// lakh marker, is normalized to [`Lakhs::ZERO`]. So, a zero price and an
    /// unrecognized one are indistinguishable.
    ///
    /// # Errors
    ///
    /// If the `text` has a marker, but the rest of it is not a number.
    pub fn normalize(text: Option<&str>) -> Result<Self, ParseError> {
        let Some(text) = text.filter(|t| !t.is_empty()) else {
            return Ok(Self::ZERO);
        };

        let text = text.replace(RUPEE, "");
        let text = text.trim();

        if text.contains(CRORE) {
            parse_amount(&text.replace(CRORE, ""))?
                .checked_mul(Self::PER_CRORE)
                .map(Self)
                .ok_or(ParseError::Overflow)
        } else if text.contains(LAKH) {
            parse_amount(&text.replace(LAKH, "")).map(Self)
        } else {
            Ok(Self::ZERO)
        }
    }
}

/// Parses the numeric part of a display price.
fn parse_amount(amount: &str) -> Result<Decimal, ParseError> {
    amount.trim().parse().map_err(ParseError::InvalidAmount)
}

/// Error of normalizing a display price into [`Lakhs`].
#[derive(Clone, Debug, Display, Error)]
pub enum ParseError {
    /// Numeric part of the price is not a number.
    #[display("invalid price amount: {_0}")]
    InvalidAmount(rust_decimal::Error),

    /// Price doesn't fit into [`Lakhs`].
    #[display("price amount overflow")]
    Overflow,
}

#[cfg(test)]
mod spec {
    use rust_decimal::Decimal;

    use super::{Lakhs, ParseError};

    fn lakhs(s: &str) -> Lakhs {
        Lakhs::new(s.parse::<Decimal>().unwrap())
    }

    #[test]
    fn normalizes_crores() {
        assert_eq!(Lakhs::normalize(Some("₹1.25 Cr")).unwrap(), lakhs("125"));
        assert_eq!(Lakhs::normalize(Some("₹1 Cr")).unwrap(), lakhs("100"));
        assert_eq!(Lakhs::normalize(Some("₹1.3 Cr")).unwrap(), lakhs("130"));
        assert_eq!(Lakhs::normalize(Some("  ₹ 2Cr ")).unwrap(), lakhs("200"));
        assert_eq!(Lakhs::normalize(Some("3.5 Cr")).unwrap(), lakhs("350"));
    }

    #[test]
    fn normalizes_lakhs() {
        assert_eq!(Lakhs::normalize(Some("₹72 L")).unwrap(), lakhs("72"));
        assert_eq!(Lakhs::normalize(Some("₹95.5 L")).unwrap(), lakhs("95.5"));
        assert_eq!(Lakhs::normalize(Some("₹ 80L")).unwrap(), lakhs("80"));
    }

    #[test]
    fn normalizes_absent_and_empty_to_zero() {
        assert_eq!(Lakhs::normalize(None).unwrap(), Lakhs::ZERO);
        assert_eq!(Lakhs::normalize(Some("")).unwrap(), Lakhs::ZERO);
    }

    #[test]
    fn normalizes_unrecognized_formats_to_zero() {
        assert_eq!(Lakhs::normalize(Some("₹")).unwrap(), Lakhs::ZERO);
        assert_eq!(Lakhs::normalize(Some("price on request")).unwrap(), Lakhs::ZERO);
        assert_eq!(Lakhs::normalize(Some("₹4500000")).unwrap(), Lakhs::ZERO);
        assert_eq!(Lakhs::normalize(Some("₹1.2 M")).unwrap(), Lakhs::ZERO);
    }

    #[test]
    fn fails_on_marker_with_non_numeric_amount() {
        assert!(Lakhs::normalize(Some("₹ Cr")).is_err());
        assert!(Lakhs::normalize(Some("₹abc L")).is_err());
        assert!(Lakhs::normalize(Some("₹72 Lakh")).is_err());
        assert!(Lakhs::normalize(Some("₹1.2 Cr onwards")).is_err());
    }

    #[test]
    fn describes_invalid_amount() {
        let err = Lakhs::normalize(Some("₹abc L")).unwrap_err();

        assert!(matches!(err, ParseError::InvalidAmount(_)));
        assert!(err.clone().to_string().starts_with("invalid price amount: "));
    }

    #[test]
    fn crore_marker_takes_precedence() {
        // Only the crore marker is removed, so the lakh one stays unparsed.
        assert!(Lakhs::normalize(Some("₹1 L Cr")).is_err());
    }

    #[test]
    fn fails_on_overflow() {
        assert!(
            Lakhs::normalize(Some("79228162514264337593543950335 Cr")).is_err()
        );
    }

    #[test]
    fn converts_from_f64() {
        assert_eq!(Lakhs::from_f64(80.0), Some(lakhs("80")));
        assert_eq!(Lakhs::from_f64(f64::NAN), None);
    }

    #[test]
    fn to_string() {
        assert_eq!(lakhs("125.00").to_string(), "125 L");
        assert_eq!(lakhs("95.5").to_string(), "95.5 L");
    }
}
