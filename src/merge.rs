//! Decides which freshly extracted records need writing.

use crate::core::{DailyFlowRecord, MergeCounts};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::warn;

/// Writes a merge needs, computed against what is already stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    pub inserts: Vec<DailyFlowRecord>,
    pub updates: Vec<DailyFlowRecord>,
    pub counts: MergeCounts,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty()
    }
}

/// Re-keys `incoming` by date (a later row for the same date replaces an
/// earlier one) and compares each against `existing`. Stored dates missing
/// from `incoming` are never touched. Records with non-finite figures are
/// dropped.
pub fn plan(
    existing: &BTreeMap<NaiveDate, DailyFlowRecord>,
    incoming: Vec<DailyFlowRecord>,
) -> MergePlan {
    let incoming: BTreeMap<NaiveDate, DailyFlowRecord> = incoming
        .into_iter()
        .filter(|r| {
            let finite = r.is_finite();
            if !finite {
                warn!(asset_class = %r.asset_class, date = %r.date, "Dropping record with non-finite figures");
            }
            finite
        })
        .map(|r| (r.date, r))
        .collect();

    let mut merge_plan = MergePlan::default();
    for (date, record) in incoming {
        match existing.get(&date) {
            None => {
                merge_plan.counts.inserted += 1;
                merge_plan.inserts.push(record);
            }
            Some(stored) if stored.same_figures(&record) => {
                merge_plan.counts.skipped += 1;
            }
            Some(_) => {
                merge_plan.counts.updated += 1;
                merge_plan.updates.push(record);
            }
        }
    }
    merge_plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AssetClass;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, d).unwrap()
    }

    fn stored(records: &[DailyFlowRecord]) -> BTreeMap<NaiveDate, DailyFlowRecord> {
        records.iter().map(|r| (r.date, r.clone())).collect()
    }

    #[test]
    fn test_absent_dates_are_inserted() {
        let incoming = vec![
            DailyFlowRecord::new(AssetClass::Btc, day(26), -275.9).with_ticker("IBIT", -192.6),
            DailyFlowRecord::new(AssetClass::Btc, day(24), -91.4),
        ];
        let merge_plan = plan(&BTreeMap::new(), incoming);
        assert_eq!(
            merge_plan.counts,
            MergeCounts {
                inserted: 2,
                updated: 0,
                skipped: 0
            }
        );
        assert_eq!(merge_plan.inserts.len(), 2);
        assert!(merge_plan.updates.is_empty());
    }

    #[test]
    fn test_identical_set_is_idempotent() {
        let records = vec![
            DailyFlowRecord::new(AssetClass::Eth, day(1), 5.0).with_ticker("ETHA", 5.0),
            DailyFlowRecord::new(AssetClass::Eth, day(2), -1.5),
        ];
        let merge_plan = plan(&stored(&records), records);
        assert!(merge_plan.is_empty());
        assert_eq!(merge_plan.counts.skipped, 2);
        assert_eq!(merge_plan.counts.written(), 0);
    }

    #[test]
    fn test_changed_figures_are_updated() {
        let existing = stored(&[DailyFlowRecord::new(AssetClass::Btc, day(10), 100.0)]);
        let merge_plan = plan(
            &existing,
            vec![DailyFlowRecord::new(AssetClass::Btc, day(10), 120.0)],
        );
        assert_eq!(merge_plan.counts.updated, 1);
        assert_eq!(merge_plan.updates[0].total_flow, 120.0);
    }

    #[test]
    fn test_new_ticker_key_counts_as_change() {
        let existing = stored(&[
            DailyFlowRecord::new(AssetClass::Btc, day(10), 10.0).with_ticker("IBIT", 10.0)
        ]);
        let incoming = vec![
            DailyFlowRecord::new(AssetClass::Btc, day(10), 10.0)
                .with_ticker("IBIT", 10.0)
                .with_ticker("FBTC", 0.0),
        ];
        assert_eq!(plan(&existing, incoming).counts.updated, 1);
    }

    #[test]
    fn test_price_only_change_is_skipped() {
        let existing = stored(&[DailyFlowRecord::new(AssetClass::Btc, day(10), 10.0)]);
        let mut incoming = DailyFlowRecord::new(AssetClass::Btc, day(10), 10.0);
        incoming.price = Some(97000.0);
        assert_eq!(plan(&existing, vec![incoming]).counts.skipped, 1);
    }

    #[test]
    fn test_duplicate_incoming_dates_keep_the_later_row() {
        let incoming = vec![
            DailyFlowRecord::new(AssetClass::Sol, day(5), 1.0),
            DailyFlowRecord::new(AssetClass::Sol, day(5), 2.0),
        ];
        let merge_plan = plan(&BTreeMap::new(), incoming);
        assert_eq!(merge_plan.counts.inserted, 1);
        assert_eq!(merge_plan.inserts[0].total_flow, 2.0);
    }

    #[test]
    fn test_non_finite_records_are_never_planned() {
        let existing = stored(&[DailyFlowRecord::new(AssetClass::Btc, day(10), 10.0)]);
        let incoming = vec![
            DailyFlowRecord::new(AssetClass::Btc, day(10), f64::NAN),
            DailyFlowRecord::new(AssetClass::Btc, day(11), 1.0).with_ticker("FBTC", f64::INFINITY),
            DailyFlowRecord::new(AssetClass::Btc, day(12), 2.0),
        ];
        let merge_plan = plan(&existing, incoming);
        assert_eq!(
            merge_plan.counts,
            MergeCounts {
                inserted: 1,
                updated: 0,
                skipped: 0
            }
        );
        assert_eq!(merge_plan.inserts[0].date, day(12));
    }
}
