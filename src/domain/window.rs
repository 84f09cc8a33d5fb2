//! Chronological training window for one instrument.
//!
//! A [`HistoricalWindow`] is the only shape of history the forecaster
//! accepts: sorted, one close per date, and nothing on or after the as-of
//! date (today's close is unknown until the session ends).

use chrono::NaiveDate;
use std::collections::BTreeMap;

use crate::domain::observation::Observation;

#[derive(Debug, Clone, PartialEq)]
pub struct HistoricalWindow {
    symbol: String,
    observations: Vec<Observation>,
}

impl HistoricalWindow {
    /// Dedupes by date (later entries in `observations` win), sorts, and drops
    /// everything dated `as_of` or later.
    pub fn build(symbol: &str, observations: Vec<Observation>, as_of: NaiveDate) -> Self {
        let mut by_date: BTreeMap<NaiveDate, Observation> = BTreeMap::new();
        for obs in observations {
            if obs.date < as_of {
                by_date.insert(obs.date, obs);
            }
        }
        Self {
            symbol: symbol.to_string(),
            observations: by_date.into_values().collect(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.close).collect()
    }

    pub fn last(&self) -> Option<&Observation> {
        self.observations.last()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }
}

/// Union of `existing` and `fetched` keyed by date.
///
/// On overlapping dates the fetched value wins. The result is sorted
/// ascending with no duplicate dates.
pub fn merge_observations(existing: &[Observation], fetched: &[Observation]) -> Vec<Observation> {
    let mut by_date: BTreeMap<NaiveDate, Observation> = BTreeMap::new();
    for obs in existing.iter().chain(fetched.iter()) {
        by_date.insert(obs.date, obs.clone());
    }
    by_date.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn obs(day: u32, close: f64) -> Observation {
        Observation {
            symbol: "AAPL".into(),
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            close,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn build_sorts_and_dedupes_keeping_last() {
        let window = HistoricalWindow::build(
            "AAPL",
            vec![obs(3, 103.0), obs(1, 101.0), obs(3, 113.0), obs(2, 102.0)],
            day(10),
        );
        assert_eq!(window.len(), 3);
        assert_eq!(window.closes(), vec![101.0, 102.0, 113.0]);
    }

    #[test]
    fn build_excludes_as_of_and_future() {
        let window = HistoricalWindow::build(
            "AAPL",
            vec![obs(1, 101.0), obs(2, 102.0), obs(3, 103.0), obs(4, 104.0)],
            day(3),
        );
        assert_eq!(window.last_date(), Some(day(2)));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn empty_window() {
        let window = HistoricalWindow::build("AAPL", vec![], day(3));
        assert!(window.is_empty());
        assert_eq!(window.last(), None);
    }

    #[test]
    fn merge_prefers_fetched_on_overlap() {
        let existing = vec![obs(1, 100.0), obs(2, 101.0)];
        let fetched = vec![obs(2, 111.0), obs(3, 112.0)];
        let merged = merge_observations(&existing, &fetched);
        let closes: Vec<f64> = merged.iter().map(|o| o.close).collect();
        assert_eq!(closes, vec![100.0, 111.0, 112.0]);
    }

    #[test]
    fn merge_with_empty_fetch_keeps_existing() {
        let existing = vec![obs(2, 101.0), obs(1, 100.0)];
        let merged = merge_observations(&existing, &[]);
        assert_eq!(merged, vec![obs(1, 100.0), obs(2, 101.0)]);
    }

    fn arb_series() -> impl Strategy<Value = Vec<Observation>> {
        prop::collection::btree_map(1u32..=28, 1.0f64..1000.0, 0..28).prop_map(|m| {
            m.into_iter().map(|(d, c)| obs(d, c)).collect::<Vec<_>>()
        })
    }

    proptest! {
        #[test]
        fn merging_a_series_with_itself_is_identity(series in arb_series()) {
            let merged = merge_observations(&series, &series);
            prop_assert_eq!(merged, series);
        }

        #[test]
        fn merge_output_has_strictly_increasing_dates(
            a in arb_series(),
            b in arb_series(),
        ) {
            let merged = merge_observations(&a, &b);
            for pair in merged.windows(2) {
                prop_assert!(pair[0].date < pair[1].date);
            }
            for o in &b {
                prop_assert!(merged.contains(o));
            }
        }
    }
}
