//! Review staging: the editable holding area between a scan and a commit.
//!
//! Records stay exactly as the scan produced them, one entry per extracted
//! holding. Two images showing the same position produce two entries; the
//! reviewer decides which to keep.

use crate::model::{AssetType, CandidateRecord, Confidence, Currency};
use crate::output::ScanOutput;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One field edit applied from the review surface.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordEdit {
    Name(String),
    Symbol(String),
    AssetType(AssetType),
    Quantity(f64),
    PurchasePrice(f64),
    CurrentPrice(f64),
    Currency(Currency),
    PurchaseDate(Option<NaiveDate>),
    Confidence(Confidence),
}

/// Record counts per confidence level, for the review badges.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceCounts {
    pub high: usize,
    pub medium: usize,
    pub low: usize,
}

/// Candidate records pending confirmation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Staging {
    records: Vec<CandidateRecord>,
}

impl Staging {
    pub fn new(records: Vec<CandidateRecord>) -> Self {
        Self { records }
    }

    pub fn from_output(output: &ScanOutput) -> Self {
        Self::new(output.records.clone())
    }

    pub fn records(&self) -> &[CandidateRecord] {
        &self.records
    }

    pub fn get(&self, index: usize) -> Option<&CandidateRecord> {
        self.records.get(index)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Flip selection of one record. Returns the new state, or `None` when
    /// the index is out of range.
    pub fn toggle(&mut self, index: usize) -> Option<bool> {
        let r = self.records.get_mut(index)?;
        r.selected = !r.selected;
        Some(r.selected)
    }

    pub fn set_selected(&mut self, index: usize, selected: bool) -> bool {
        match self.records.get_mut(index) {
            Some(r) => {
                r.selected = selected;
                true
            }
            None => false,
        }
    }

    pub fn select_all(&mut self, selected: bool) {
        for r in &mut self.records {
            r.selected = selected;
        }
    }

    /// Deselect every record below `min`.
    pub fn deselect_below(&mut self, min: Confidence) {
        for r in self.records.iter_mut().filter(|r| r.confidence < min) {
            r.selected = false;
        }
    }

    /// Apply one field edit. Returns `false` when the index is out of range.
    pub fn edit(&mut self, index: usize, edit: RecordEdit) -> bool {
        let Some(r) = self.records.get_mut(index) else {
            return false;
        };
        match edit {
            RecordEdit::Name(v) => r.name = v,
            RecordEdit::Symbol(v) => r.symbol = v,
            RecordEdit::AssetType(v) => r.asset_type = v,
            RecordEdit::Quantity(v) => r.quantity = v,
            RecordEdit::PurchasePrice(v) => r.purchase_price = v,
            RecordEdit::CurrentPrice(v) => r.current_price = v,
            RecordEdit::Currency(v) => r.currency = v,
            RecordEdit::PurchaseDate(v) => r.purchase_date = v,
            RecordEdit::Confidence(v) => r.confidence = v,
        }
        true
    }

    pub fn remove(&mut self, index: usize) -> Option<CandidateRecord> {
        (index < self.records.len()).then(|| self.records.remove(index))
    }

    pub fn selected(&self) -> impl Iterator<Item = &CandidateRecord> {
        self.records.iter().filter(|r| r.selected)
    }

    pub fn selected_count(&self) -> usize {
        self.selected().count()
    }

    pub fn confidence_counts(&self) -> ConfidenceCounts {
        let mut counts = ConfidenceCounts::default();
        for r in &self.records {
            match r.confidence {
                Confidence::High => counts.high += 1,
                Confidence::Medium => counts.medium += 1,
                Confidence::Low => counts.low += 1,
            }
        }
        counts
    }

    /// Drop everything; called after a successful commit or on cancel.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, confidence: Confidence) -> CandidateRecord {
        CandidateRecord {
            name: name.into(),
            symbol: name.to_uppercase(),
            asset_type: AssetType::Stocks,
            quantity: 10.0,
            purchase_price: 5.0,
            current_price: 6.0,
            currency: Currency::Usd,
            purchase_date: None,
            confidence,
            selected: true,
            source_image: 0,
        }
    }

    fn staging() -> Staging {
        Staging::new(vec![
            record("a", Confidence::High),
            record("b", Confidence::Low),
            record("c", Confidence::Medium),
            record("d", Confidence::High),
        ])
    }

    #[test]
    fn toggle_flips_one_record() {
        let mut s = staging();
        assert_eq!(s.toggle(1), Some(false));
        assert_eq!(s.selected_count(), 3);
        assert_eq!(s.toggle(1), Some(true));
        assert_eq!(s.toggle(9), None);
    }

    #[test]
    fn edit_changes_only_the_target_field() {
        let mut s = staging();
        assert!(s.edit(2, RecordEdit::Quantity(12.5)));
        assert!(s.edit(2, RecordEdit::Currency(Currency::Ils)));
        let r = s.get(2).unwrap();
        assert_eq!(r.quantity, 12.5);
        assert_eq!(r.currency, Currency::Ils);
        assert_eq!(r.name, "c");
        assert!(!s.edit(4, RecordEdit::Name("x".into())));
    }

    #[test]
    fn confidence_badges() {
        let s = staging();
        assert_eq!(
            s.confidence_counts(),
            ConfidenceCounts {
                high: 2,
                medium: 1,
                low: 1
            }
        );
    }

    #[test]
    fn deselect_below_threshold() {
        let mut s = staging();
        s.deselect_below(Confidence::Medium);
        let names: Vec<_> = s.selected().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["a", "c", "d"]);

        s.select_all(false);
        assert_eq!(s.selected_count(), 0);
    }

    #[test]
    fn remove_and_clear() {
        let mut s = staging();
        assert_eq!(s.remove(0).map(|r| r.name), Some("a".to_string()));
        assert_eq!(s.remove(10), None);
        assert_eq!(s.len(), 3);
        s.clear();
        assert!(s.is_empty());
    }
}
