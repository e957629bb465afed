//! Rule-based pollution classification.
//!
//! Maps a `Reading` to a `PollutionLabel` with an ordered chain of threshold
//! rules. The first rule whose predicate holds decides the label; several
//! predicates overlap, so the order below is part of the contract.
//!
//! All thresholds are strict inequalities except the pH band of the clean
//! water rule, which is inclusive at both ends.

pub mod coerce;

use crate::model::{PollutionLabel, Reading};

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// The rule that produced a classification, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// High oxygen, low solids, clear, neutral pH.
    CleanProfile,
    /// Oxygen-starved and turbid.
    Sewage,
    /// Salty, turbid and alkaline.
    AgriculturalRunoff,
    /// Extreme solids or pH.
    ChemicalIntrusion,
    /// Warm and oxygen-poor.
    ThermalPollution,
    /// Nothing matched. Reported as Good Water, which does not mean the
    /// profile is known to be clean.
    Fallback,
}

/// Classifies a reading, returning the label and the rule that matched.
///
/// NaN fields are read as `0.0` before any rule is evaluated.
pub fn classify_with_rule(reading: &Reading) -> (PollutionLabel, Rule) {
    let Reading {
        temperature,
        tds,
        turbidity,
        dissolved_oxygen: dox,
        ph,
    } = reading.coerced();

    if dox > 7.0 && tds < 300.0 && turbidity < 5.0 && (6.5..=8.5).contains(&ph) {
        return (PollutionLabel::GoodWater, Rule::CleanProfile);
    }
    if dox < 3.0 && turbidity > 10.0 {
        return (PollutionLabel::Sewage, Rule::Sewage);
    }
    if tds > 500.0 && turbidity > 10.0 && ph > 7.5 {
        return (PollutionLabel::AgriculturalRunoff, Rule::AgriculturalRunoff);
    }
    if tds > 1000.0 || ph < 6.0 || ph > 9.0 {
        return (PollutionLabel::ChemicalIntrusion, Rule::ChemicalIntrusion);
    }
    if temperature > 30.0 && dox < 6.0 {
        return (PollutionLabel::ThermalPollution, Rule::ThermalPollution);
    }
    (PollutionLabel::GoodWater, Rule::Fallback)
}

/// Classifies a reading. Total and pure: same input, same label.
pub fn classify(reading: &Reading) -> PollutionLabel {
    classify_with_rule(reading).0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
