//! Aggregations behind the chart and statistics widgets.

use std::collections::BTreeMap;
use std::fmt;

use async_graphql::SimpleObject;
use chrono::{DateTime, Datelike, TimeZone};
use uuid::Uuid;

/// Number of months the trend widget shows.
pub const TREND_MONTHS: usize = 6;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn of<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// What a chart bar stands for. Rows are grouped by id so that two records
/// sharing a name stay apart; `None` collects rows with no reference.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub label: String,
    pub id: Option<Uuid>,
}

#[derive(Clone, Debug, PartialEq, Eq, SimpleObject)]
pub struct CountPoint {
    pub id: Option<Uuid>,
    pub label: String,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, SimpleObject)]
pub struct SumPoint {
    pub id: Option<Uuid>,
    pub label: String,
    pub total: i64,
}

/// Sum of cent amounts, clamped at the `i64` bounds.
pub fn total_cents(values: impl IntoIterator<Item = i64>) -> i64 {
    values.into_iter().fold(0i64, i64::saturating_add)
}

#[derive(Clone, Debug, PartialEq, Eq, SimpleObject)]
pub struct MonthPoint {
    /// `YYYY-MM`.
    pub month: String,
    pub count: u64,
    pub total: i64,
}

/// Occurrences per key, largest first, ties by key.
pub fn count_by<T, K, F>(items: &[T], key: F) -> Vec<(K, u64)>
where
    K: Ord,
    F: Fn(&T) -> K,
{
    let mut groups: BTreeMap<K, u64> = BTreeMap::new();
    for item in items {
        *groups.entry(key(item)).or_default() += 1;
    }
    let mut out: Vec<(K, u64)> = groups.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Sum of `value` per key, largest first, ties by key.
pub fn sum_by<T, K, F, V>(items: &[T], key: F, value: V) -> Vec<(K, i64)>
where
    K: Ord,
    F: Fn(&T) -> K,
    V: Fn(&T) -> i64,
{
    let mut groups: BTreeMap<K, i64> = BTreeMap::new();
    for item in items {
        let slot = groups.entry(key(item)).or_default();
        *slot = slot.saturating_add(value(item));
    }
    let mut out: Vec<(K, i64)> = groups.into_iter().collect();
    out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    out
}

/// Count and value per calendar month, keeping the most recent `buckets`
/// months that have data, oldest first.
pub fn monthly_series<T, S, V>(items: &[T], stamp: S, value: V, buckets: usize) -> Vec<MonthPoint>
where
    S: Fn(&T) -> YearMonth,
    V: Fn(&T) -> i64,
{
    let mut months: BTreeMap<YearMonth, (u64, i64)> = BTreeMap::new();
    for item in items {
        let slot = months.entry(stamp(item)).or_default();
        slot.0 += 1;
        slot.1 = slot.1.saturating_add(value(item));
    }
    let skip = months.len().saturating_sub(buckets);
    months
        .into_iter()
        .skip(skip)
        .map(|(month, (count, total))| MonthPoint {
            month: month.to_string(),
            count,
            total,
        })
        .collect()
}

/// Largest `n` entries by value, ties by key.
pub fn top_n<K: Ord, V: Ord>(mut series: Vec<(K, V)>, n: usize) -> Vec<(K, V)> {
    series.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    series.truncate(n);
    series
}

pub fn count_points(series: Vec<(GroupKey, u64)>) -> Vec<CountPoint> {
    series
        .into_iter()
        .map(|(key, count)| CountPoint {
            id: key.id,
            label: key.label,
            count,
        })
        .collect()
}

pub fn sum_points(series: Vec<(GroupKey, i64)>) -> Vec<SumPoint> {
    series
        .into_iter()
        .map(|(key, total)| SumPoint {
            id: key.id,
            label: key.label,
            total,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    struct Sale {
        who: &'static str,
        at: YearMonth,
        cents: i64,
    }

    fn ym(year: i32, month: u32) -> YearMonth {
        YearMonth { year, month }
    }

    fn sale(who: &'static str, at: YearMonth, cents: i64) -> Sale {
        Sale { who, at, cents }
    }

    fn sales() -> Vec<Sale> {
        vec![
            sale("bo", ym(2025, 11), 100),
            sale("al", ym(2026, 1), 300),
            sale("bo", ym(2026, 1), 50),
            sale("cy", ym(2026, 3), 400),
            sale("al", ym(2026, 4), 10),
        ]
    }

    #[test]
    fn count_by_orders_by_count_then_key() {
        let counts = count_by(&sales(), |s| s.who);
        assert_eq!(counts, vec![("al", 2), ("bo", 2), ("cy", 1)]);
    }

    #[test]
    fn sum_by_totals_each_key() {
        let sums = sum_by(&sales(), |s| s.who, |s| s.cents);
        assert_eq!(sums, vec![("cy", 400), ("al", 310), ("bo", 150)]);
    }

    #[test]
    fn monthly_series_keeps_latest_months_oldest_first() {
        let series = monthly_series(&sales(), |s| s.at, |s| s.cents, 3);
        let months: Vec<&str> = series.iter().map(|p| p.month.as_str()).collect();
        assert_eq!(months, vec!["2026-01", "2026-03", "2026-04"]);
        assert_eq!(series[0].count, 2);
        assert_eq!(series[0].total, 350);
    }

    #[test]
    fn monthly_series_with_few_months_keeps_all() {
        let series = monthly_series(&sales(), |s| s.at, |s| s.cents, TREND_MONTHS);
        assert_eq!(series.len(), 4);
        assert_eq!(series[0].month, "2025-11");
        assert!(monthly_series::<Sale, _, _>(&[], |s| s.at, |s| s.cents, 6).is_empty());
    }

    #[test]
    fn top_n_truncates_after_sorting() {
        let top = top_n(vec![("a", 1), ("b", 5), ("c", 5), ("d", 3)], 3);
        assert_eq!(top, vec![("b", 5), ("c", 5), ("d", 3)]);
        assert!(top_n(Vec::<(&str, u64)>::new(), 5).is_empty());
    }

    #[test]
    fn sums_clamp_instead_of_overflowing() {
        assert_eq!(total_cents([i64::MAX, 1, 5]), i64::MAX);
        assert_eq!(total_cents([i64::MIN, -1]), i64::MIN);
        assert_eq!(total_cents(Vec::new()), 0);

        let huge = vec![sale("al", ym(2026, 1), i64::MAX), sale("al", ym(2026, 1), 10)];
        assert_eq!(sum_by(&huge, |s| s.who, |s| s.cents), vec![("al", i64::MAX)]);
        let series = monthly_series(&huge, |s| s.at, |s| s.cents, TREND_MONTHS);
        assert_eq!(series[0].total, i64::MAX);
    }

    #[test]
    fn equal_labels_with_different_ids_stay_apart() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let key = |id| GroupKey {
            label: "Acme".into(),
            id,
        };
        let rows = vec![key(Some(a)), key(Some(b)), key(Some(a)), key(None)];
        let points = count_points(count_by(&rows, |k| k.clone()));
        assert_eq!(points.len(), 3);
        assert_eq!(points[0].id, Some(a));
        assert_eq!(points[0].count, 2);
        assert!(points.iter().all(|p| p.label == "Acme"));
    }

    #[test]
    fn year_month_reads_calendar_fields() {
        let at = Utc.with_ymd_and_hms(2026, 2, 28, 23, 0, 0).single().unwrap();
        assert_eq!(YearMonth::of(&at).to_string(), "2026-02");
    }
}
