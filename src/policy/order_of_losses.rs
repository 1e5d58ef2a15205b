//! Order-of-losses mini-language
//!
//! `"2^infantry;*^artillery;1^tank"` lists casualties in the order they should
//! be taken: a positive count or `*` (all), a caret, and a unit type name.
//! Sections are separated by semicolons; empty sections are ignored.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res},
    sequence::separated_pair,
    IResult, Parser,
};
use serde::{Deserialize, Serialize};

use crate::core::error::{OddsError, Result};
use crate::core::types::UnitId;
use crate::world::unit::{Unit, UnitTypeCatalog};

pub const ALL: &str = "*";
pub const SEPARATOR: char = ';';
pub const AMOUNT_DESCRIPTOR: char = '^';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantity {
    All,
    Exactly(u32),
}

impl Quantity {
    fn limit(self) -> usize {
        match self {
            Quantity::All => usize::MAX,
            Quantity::Exactly(n) => n as usize,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossToken {
    pub quantity: Quantity,
    pub unit_type: String,
}

/// A parsed, catalog-checked order of losses
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OrderOfLosses {
    tokens: Vec<LossToken>,
}

fn quantity(input: &str) -> IResult<&str, Quantity> {
    alt((
        map(tag(ALL), |_| Quantity::All),
        map_res(digit1, |digits: &str| digits.parse::<u32>().map(Quantity::Exactly)),
    ))
    .parse(input)
}

fn unit_type_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c != AMOUNT_DESCRIPTOR && c != SEPARATOR).parse(input)
}

fn token(input: &str) -> IResult<&str, (Quantity, &str)> {
    separated_pair(quantity, char(AMOUNT_DESCRIPTOR), unit_type_name).parse(input)
}

impl OrderOfLosses {
    /// Parse and validate against the unit-type catalog
    ///
    /// Blank input yields an empty order (no preference).
    pub fn parse(text: &str, catalog: &UnitTypeCatalog) -> Result<Self> {
        let mut tokens = Vec::new();
        for section in text.trim().split(SEPARATOR) {
            let section = section.trim();
            if section.is_empty() {
                continue;
            }
            let (_, (quantity, name)) = all_consuming(token)
                .parse(section)
                .map_err(|_| OddsError::casualty_order(text, format!("malformed section {:?}", section)))?;
            if quantity == Quantity::Exactly(0) {
                return Err(OddsError::casualty_order(text, format!("zero count in {:?}", section)));
            }
            let name = name.trim();
            if !catalog.contains(name) {
                return Err(OddsError::casualty_order(text, format!("unknown unit type {:?}", name)));
            }
            tokens.push(LossToken {
                quantity,
                unit_type: name.to_string(),
            });
        }
        Ok(Self { tokens })
    }

    /// Parse an optional order, mapping blank to `None`
    pub fn parse_optional(text: Option<&str>, catalog: &UnitTypeCatalog) -> Result<Option<Self>> {
        match text {
            None => Ok(None),
            Some(text) => {
                let order = Self::parse(text, catalog)?;
                Ok((!order.is_empty()).then_some(order))
            }
        }
    }

    pub fn tokens(&self) -> &[LossToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Turn the order into a concrete casualty list for a force
    ///
    /// Later sections claim their units first, so an earlier `*` section only
    /// receives what the sections after it left over. The claimed units are
    /// then listed in casualty order.
    pub fn resolve(&self, units: &[Unit]) -> Vec<UnitId> {
        let mut claimed: Vec<UnitId> = Vec::new();
        for token in self.tokens.iter().rev() {
            let picked: Vec<UnitId> = units
                .iter()
                .filter(|u| u.unit_type == token.unit_type && !claimed.contains(&u.id))
                .take(token.quantity.limit())
                .map(|u| u.id)
                .collect();
            claimed.extend(picked.into_iter().rev());
        }
        claimed.reverse();
        claimed
    }
}

impl std::fmt::Display for OrderOfLosses {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sections: Vec<String> = self
            .tokens
            .iter()
            .map(|t| match t.quantity {
                Quantity::All => format!("{}{}{}", ALL, AMOUNT_DESCRIPTOR, t.unit_type),
                Quantity::Exactly(n) => format!("{}{}{}", n, AMOUNT_DESCRIPTOR, t.unit_type),
            })
            .collect();
        write!(f, "{}", sections.join(&SEPARATOR.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::PlayerId;
    use crate::world::unit::UnitType;

    fn catalog() -> UnitTypeCatalog {
        [
            UnitType::land("infantry", 1, 2, 3.0),
            UnitType::land("artillery", 2, 2, 4.0),
            UnitType::land("armour", 3, 3, 5.0),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_parse_valid_order() {
        let order = OrderOfLosses::parse(" 2^infantry; *^artillery ;", &catalog()).unwrap();
        assert_eq!(
            order.tokens(),
            &[
                LossToken { quantity: Quantity::Exactly(2), unit_type: "infantry".into() },
                LossToken { quantity: Quantity::All, unit_type: "artillery".into() },
            ]
        );
        assert_eq!(order.to_string(), "2^infantry;*^artillery");
    }

    #[test]
    fn test_blank_order_is_empty() {
        assert!(OrderOfLosses::parse("   ", &catalog()).unwrap().is_empty());
        assert_eq!(OrderOfLosses::parse_optional(Some(""), &catalog()).unwrap(), None);
        assert_eq!(OrderOfLosses::parse_optional(None, &catalog()).unwrap(), None);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = OrderOfLosses::parse("1^infantry;2^zeppelin", &catalog()).unwrap_err();
        match err {
            OddsError::InvalidCasualtyOrder { order, reason } => {
                assert_eq!(order, "1^infantry;2^zeppelin");
                assert!(reason.contains("zeppelin"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_malformed_sections_rejected() {
        for bad in ["infantry", "x^infantry", "0^infantry", "1^", "1^infantry^2", "-1^infantry"] {
            assert!(
                matches!(
                    OrderOfLosses::parse(bad, &catalog()),
                    Err(OddsError::InvalidCasualtyOrder { .. })
                ),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_resolve_lists_casualties_in_order() {
        let owner = PlayerId(1);
        let mut units = Unit::many("armour", owner, 2);
        units.extend(Unit::many("infantry", owner, 3));

        let order = OrderOfLosses::parse("*^infantry;1^armour", &catalog()).unwrap();
        let resolved = order.resolve(&units);

        assert_eq!(resolved.len(), 4);
        let types: Vec<&str> = resolved
            .iter()
            .map(|id| units.iter().find(|u| u.id == *id).unwrap().unit_type.as_str())
            .collect();
        assert_eq!(types, ["infantry", "infantry", "infantry", "armour"]);
    }

    #[test]
    fn test_later_sections_claim_first() {
        let units = Unit::many("infantry", PlayerId(1), 2);
        let order = OrderOfLosses::parse("*^infantry;1^artillery;1^infantry", &catalog()).unwrap();
        let resolved = order.resolve(&units);

        // The trailing "1^infantry" claims one unit, the leading "*" gets the rest
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[1], units[0].id);
        assert_eq!(resolved[0], units[1].id);
    }
}
