// Units of count
//
// Non-decimal subunits of medieval money of account, with their fixed
// denarius equivalences:
//
//   1 libra    = 240 denarii
//   1 solidus  =  12 denarii
//   1 denarius =   1 denarius
//   1 obolus   =   0.5 denarius
//   1 picta    =   0.25 denarius
//   1 maille   =   0.5 denarius

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitOfCount {
    Libra,
    Solidus,
    Denarius,
    Obolus,
    Picta,
    Maille,
}

impl UnitOfCount {
    /// Map the first letter of a unit abbreviation to its category
    /// ("l." -> Libra, "s." -> Solidus, ...).
    pub fn from_prefix(prefix: char) -> Option<Self> {
        match prefix {
            'l' => Some(UnitOfCount::Libra),
            's' => Some(UnitOfCount::Solidus),
            'd' => Some(UnitOfCount::Denarius),
            'o' => Some(UnitOfCount::Obolus),
            'p' => Some(UnitOfCount::Picta),
            'm' => Some(UnitOfCount::Maille),
            _ => None,
        }
    }

    /// Fixed ratio to the smallest unit (denarius)
    pub fn denarius_ratio(&self) -> f64 {
        match self {
            UnitOfCount::Libra => 240.0,
            UnitOfCount::Solidus => 12.0,
            UnitOfCount::Denarius => 1.0,
            UnitOfCount::Obolus => 0.5,
            UnitOfCount::Picta => 0.25,
            UnitOfCount::Maille => 0.5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UnitOfCount::Libra => "libra",
            UnitOfCount::Solidus => "solidus",
            UnitOfCount::Denarius => "denarius",
            UnitOfCount::Obolus => "obolus",
            UnitOfCount::Picta => "picta",
            UnitOfCount::Maille => "maille",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "libra" => Some(UnitOfCount::Libra),
            "solidus" => Some(UnitOfCount::Solidus),
            "denarius" => Some(UnitOfCount::Denarius),
            "obolus" => Some(UnitOfCount::Obolus),
            "picta" => Some(UnitOfCount::Picta),
            "maille" => Some(UnitOfCount::Maille),
            _ => None,
        }
    }
}

/// Normalize the unit-bearing subparts of one simple amount to a single
/// smallest-unit (denarius) value.
pub fn normalize_to_smallest_unit(subparts: &[(i64, UnitOfCount)]) -> f64 {
    subparts
        .iter()
        .map(|(numeral, unit)| *numeral as f64 * unit.denarius_ratio())
        .sum()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_mapping() {
        assert_eq!(UnitOfCount::from_prefix('l'), Some(UnitOfCount::Libra));
        assert_eq!(UnitOfCount::from_prefix('s'), Some(UnitOfCount::Solidus));
        assert_eq!(UnitOfCount::from_prefix('d'), Some(UnitOfCount::Denarius));
        assert_eq!(UnitOfCount::from_prefix('o'), Some(UnitOfCount::Obolus));
        assert_eq!(UnitOfCount::from_prefix('p'), Some(UnitOfCount::Picta));
        assert_eq!(UnitOfCount::from_prefix('m'), Some(UnitOfCount::Maille));
        assert_eq!(UnitOfCount::from_prefix('x'), None);
    }

    #[test]
    fn test_name_round_trip() {
        for unit in [
            UnitOfCount::Libra,
            UnitOfCount::Solidus,
            UnitOfCount::Denarius,
            UnitOfCount::Obolus,
            UnitOfCount::Picta,
            UnitOfCount::Maille,
        ] {
            assert_eq!(UnitOfCount::from_name(unit.as_str()), Some(unit));
        }
    }

    #[test]
    fn test_normalize_solidus_and_denarius() {
        // XII s. VIII d. = 12 * 12 + 8 = 152 denarii
        let value = normalize_to_smallest_unit(&[
            (12, UnitOfCount::Solidus),
            (8, UnitOfCount::Denarius),
        ]);
        assert_eq!(value, 152.0);
    }

    #[test]
    fn test_normalize_fractional_units() {
        // I d. I o. I p. = 1 + 0.5 + 0.25
        let value = normalize_to_smallest_unit(&[
            (1, UnitOfCount::Denarius),
            (1, UnitOfCount::Obolus),
            (1, UnitOfCount::Picta),
        ]);
        assert_eq!(value, 1.75);
    }

    #[test]
    fn test_normalize_libra() {
        let value = normalize_to_smallest_unit(&[(2, UnitOfCount::Libra)]);
        assert_eq!(value, 480.0);
    }
}
