//! Estimation card decks.

use serde::{Deserialize, Serialize};
use sprintdeck_common::{AppError, AppResult};
use sprintdeck_db::entities::planning_session::DeckType;

const FIBONACCI: &[&str] = &[
    "0", "1", "2", "3", "5", "8", "13", "21", "34", "55", "89", "?",
];
const TSHIRT: &[&str] = &["XS", "S", "M", "L", "XL", "XXL", "?"];
const POWERS: &[&str] = &["0", "1", "2", "4", "8", "16", "32", "64", "?"];

/// Card that means "no idea" and never counts as an estimate.
pub const UNKNOWN_CARD: &str = "?";

const MIN_CUSTOM_CARDS: usize = 2;
const MAX_CUSTOM_CARDS: usize = 20;
const MAX_CARD_LEN: usize = 8;

/// The set of cards a session votes with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", content = "cards", rename_all = "snake_case")]
pub enum Deck {
    /// 0, 1, 2, 3, 5, 8, ... 89, ?
    #[default]
    Fibonacci,
    /// XS to XXL, ?
    #[serde(rename = "tshirt")]
    TShirt,
    /// 0, 1, 2, 4, ... 64, ?
    Powers,
    /// Host-defined cards.
    Custom(Vec<String>),
}

impl Deck {
    /// Cards of the deck, in display order.
    #[must_use]
    pub fn cards(&self) -> Vec<&str> {
        match self {
            Self::Fibonacci => FIBONACCI.to_vec(),
            Self::TShirt => TSHIRT.to_vec(),
            Self::Powers => POWERS.to_vec(),
            Self::Custom(cards) => cards.iter().map(String::as_str).collect(),
        }
    }

    /// Whether `value` is one of this deck's cards.
    #[must_use]
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Self::Custom(cards) => cards.iter().any(|c| c == value),
            _ => self.cards().contains(&value),
        }
    }

    /// Numeric decks compare votes by spread; the others by agreement.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Fibonacci | Self::Powers)
    }

    /// Storage tag of the deck.
    #[must_use]
    pub const fn deck_type(&self) -> DeckType {
        match self {
            Self::Fibonacci => DeckType::Fibonacci,
            Self::TShirt => DeckType::TShirt,
            Self::Powers => DeckType::Powers,
            Self::Custom(_) => DeckType::Custom,
        }
    }

    /// Cards of a custom deck.
    #[must_use]
    pub fn custom_cards(&self) -> Option<&[String]> {
        match self {
            Self::Custom(cards) => Some(cards),
            _ => None,
        }
    }

    /// Rebuild a deck from its storage tag and custom cards.
    pub fn from_parts(deck_type: DeckType, custom: Option<Vec<String>>) -> AppResult<Self> {
        match deck_type {
            DeckType::Fibonacci => Ok(Self::Fibonacci),
            DeckType::TShirt => Ok(Self::TShirt),
            DeckType::Powers => Ok(Self::Powers),
            DeckType::Custom => custom
                .map(Self::Custom)
                .ok_or_else(|| AppError::Internal("custom deck without cards".to_string())),
        }
    }

    /// Check a custom deck: 2 to 20 unique, non-blank cards of at most
    /// 8 characters. Predefined decks are always valid.
    pub fn validate(&self) -> AppResult<()> {
        let Self::Custom(cards) = self else {
            return Ok(());
        };

        if !(MIN_CUSTOM_CARDS..=MAX_CUSTOM_CARDS).contains(&cards.len()) {
            return Err(AppError::Validation(format!(
                "custom deck needs between {MIN_CUSTOM_CARDS} and {MAX_CUSTOM_CARDS} cards"
            )));
        }

        for (i, card) in cards.iter().enumerate() {
            if card.trim().is_empty() {
                return Err(AppError::Validation("deck cards cannot be blank".to_string()));
            }
            if card.chars().count() > MAX_CARD_LEN {
                return Err(AppError::Validation(format!(
                    "deck card '{card}' is longer than {MAX_CARD_LEN} characters"
                )));
            }
            if cards[..i].contains(card) {
                return Err(AppError::Validation(format!("duplicate deck card '{card}'")));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_membership() {
        assert!(Deck::Fibonacci.contains("13"));
        assert!(!Deck::Fibonacci.contains("4"));
        assert!(Deck::Powers.contains("4"));
        assert!(Deck::TShirt.contains("XL"));
        assert!(!Deck::TShirt.contains("5"));
        assert!(Deck::TShirt.contains(UNKNOWN_CARD));
    }

    #[test]
    fn test_numeric_decks() {
        assert!(Deck::Fibonacci.is_numeric());
        assert!(Deck::Powers.is_numeric());
        assert!(!Deck::TShirt.is_numeric());
        assert!(!Deck::Custom(vec!["a".into(), "b".into()]).is_numeric());
    }

    #[test]
    fn test_custom_deck_validation() {
        let ok = Deck::Custom(vec!["tiny".into(), "big".into(), "?".into()]);
        assert!(ok.validate().is_ok());
        assert!(ok.contains("big"));

        let too_few = Deck::Custom(vec!["one".into()]);
        assert!(matches!(too_few.validate(), Err(AppError::Validation(_))));

        let dup = Deck::Custom(vec!["a".into(), "a".into()]);
        assert!(matches!(dup.validate(), Err(AppError::Validation(_))));

        let blank = Deck::Custom(vec!["a".into(), "  ".into()]);
        assert!(matches!(blank.validate(), Err(AppError::Validation(_))));

        let long = Deck::Custom(vec!["a".into(), "enormous!".into()]);
        assert!(matches!(long.validate(), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_from_parts() {
        assert_eq!(
            Deck::from_parts(DeckType::TShirt, None).unwrap(),
            Deck::TShirt
        );
        let custom = Deck::from_parts(DeckType::Custom, Some(vec!["x".into(), "y".into()])).unwrap();
        assert_eq!(custom.custom_cards().unwrap().len(), 2);
        assert!(Deck::from_parts(DeckType::Custom, None).is_err());
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_value(Deck::TShirt).unwrap();
        assert_eq!(json, serde_json::json!({"type": "tshirt"}));

        let custom: Deck =
            serde_json::from_value(serde_json::json!({"type": "custom", "cards": ["a", "b"]}))
                .unwrap();
        assert_eq!(custom, Deck::Custom(vec!["a".into(), "b".into()]));
    }
}
