//! Search, dropdown filters and sorting applied to a loaded record set.

use std::cmp::Ordering;

use async_graphql::{Enum, InputObject};
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

use crate::auth::UserRole;

#[derive(Enum, Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum SortOrder {
    #[default]
    NameAsc,
    NameDesc,
    Newest,
    Oldest,
    ValueDesc,
    ValueAsc,
}

#[derive(Clone, Debug, Default, InputObject)]
pub struct ListFilter {
    /// Case-insensitive substring over the row's display fields.
    pub query: Option<String>,
    pub active: Option<bool>,
    pub role: Option<UserRole>,
    #[graphql(default)]
    pub sort: SortOrder,
}

/// A row that can be searched and sorted by the list views.
pub trait Listable {
    fn id(&self) -> Uuid;
    fn sort_name(&self) -> &str;
    fn search_fields(&self) -> Vec<&str>;
    fn created_at(&self) -> DateTimeWithTimeZone;

    fn is_active(&self) -> bool {
        true
    }

    fn value(&self) -> i64 {
        0
    }

    fn role(&self) -> Option<UserRole> {
        None
    }
}

/// Keep the rows whose display fields contain `query`, in source order.
/// A blank query keeps everything.
pub fn text_filter<T: Listable>(items: Vec<T>, query: &str) -> Vec<T> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return items;
    }
    items
        .into_iter()
        .filter(|item| {
            item.search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Case-insensitive name order, then case-sensitive, then id.
fn by_name<T: Listable>(a: &T, b: &T) -> Ordering {
    a.sort_name()
        .to_lowercase()
        .cmp(&b.sort_name().to_lowercase())
        .then_with(|| a.sort_name().cmp(b.sort_name()))
        .then_with(|| a.id().cmp(&b.id()))
}

pub fn compare<T: Listable>(order: SortOrder, a: &T, b: &T) -> Ordering {
    match order {
        SortOrder::NameAsc => by_name(a, b),
        SortOrder::NameDesc => by_name(b, a),
        SortOrder::Newest => b
            .created_at()
            .cmp(&a.created_at())
            .then_with(|| by_name(a, b)),
        SortOrder::Oldest => a
            .created_at()
            .cmp(&b.created_at())
            .then_with(|| by_name(a, b)),
        SortOrder::ValueDesc => b.value().cmp(&a.value()).then_with(|| by_name(a, b)),
        SortOrder::ValueAsc => a.value().cmp(&b.value()).then_with(|| by_name(a, b)),
    }
}

pub fn sort_items<T: Listable>(items: &mut [T], order: SortOrder) {
    items.sort_by(|a, b| compare(order, a, b));
}

pub fn apply<T: Listable>(items: Vec<T>, filter: &ListFilter) -> Vec<T> {
    let mut items: Vec<T> = match filter.query.as_deref() {
        Some(query) => text_filter(items, query),
        None => items,
    };
    if let Some(active) = filter.active {
        items.retain(|item| item.is_active() == active);
    }
    if let Some(role) = filter.role {
        items.retain(|item| item.role() == Some(role));
    }
    sort_items(&mut items, filter.sort);
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[derive(Clone, Debug, PartialEq)]
    struct Row {
        id: Uuid,
        name: &'static str,
        note: &'static str,
        day: u32,
        value: i64,
        active: bool,
    }

    impl Listable for Row {
        fn id(&self) -> Uuid {
            self.id
        }

        fn sort_name(&self) -> &str {
            self.name
        }

        fn search_fields(&self) -> Vec<&str> {
            vec![self.name, self.note]
        }

        fn created_at(&self) -> DateTimeWithTimeZone {
            Utc.with_ymd_and_hms(2026, 3, self.day, 9, 0, 0)
                .single()
                .unwrap()
                .into()
        }

        fn is_active(&self) -> bool {
            self.active
        }

        fn value(&self) -> i64 {
            self.value
        }
    }

    fn row(name: &'static str, note: &'static str, day: u32, value: i64) -> Row {
        Row {
            id: Uuid::new_v4(),
            name,
            note,
            day,
            value,
            active: day % 2 == 0,
        }
    }

    fn sample() -> Vec<Row> {
        vec![
            row("acme", "switches", 3, 500),
            row("Globex", "routers", 1, 900),
            row("Acme", "firewalls", 2, 100),
            row("initech", "Switches and cables", 4, 900),
        ]
    }

    fn names(rows: &[Row]) -> Vec<&'static str> {
        rows.iter().map(|r| r.name).collect()
    }

    #[test]
    fn blank_query_returns_everything_in_order() {
        let rows = sample();
        assert_eq!(text_filter(rows.clone(), "   "), rows);
        assert_eq!(text_filter(rows.clone(), ""), rows);
    }

    #[test]
    fn matches_are_a_subset_that_contains_the_query() {
        let rows = sample();
        let hits = text_filter(rows.clone(), "SWITCH");
        assert_eq!(names(&hits), vec!["acme", "initech"]);
        for hit in &hits {
            assert!(rows.contains(hit));
            assert!(
                hit.search_fields()
                    .iter()
                    .any(|f| f.to_lowercase().contains("switch"))
            );
        }
    }

    #[test]
    fn name_sort_is_case_insensitive_with_stable_ties() {
        let mut rows = sample();
        sort_items(&mut rows, SortOrder::NameAsc);
        assert_eq!(names(&rows), vec!["Acme", "acme", "Globex", "initech"]);
        sort_items(&mut rows, SortOrder::NameDesc);
        assert_eq!(names(&rows), vec!["initech", "Globex", "acme", "Acme"]);
    }

    #[test]
    fn sorting_twice_changes_nothing() {
        for order in [
            SortOrder::NameAsc,
            SortOrder::NameDesc,
            SortOrder::Newest,
            SortOrder::Oldest,
            SortOrder::ValueDesc,
            SortOrder::ValueAsc,
        ] {
            let mut once = sample();
            sort_items(&mut once, order);
            let mut twice = once.clone();
            sort_items(&mut twice, order);
            assert_eq!(once, twice, "{order:?}");
        }
    }

    #[test]
    fn date_and_value_orders() {
        let mut rows = sample();
        sort_items(&mut rows, SortOrder::Newest);
        assert_eq!(names(&rows), vec!["initech", "acme", "Acme", "Globex"]);
        sort_items(&mut rows, SortOrder::ValueDesc);
        assert_eq!(names(&rows), vec!["Globex", "initech", "acme", "Acme"]);
        sort_items(&mut rows, SortOrder::ValueAsc);
        assert_eq!(names(&rows), vec!["Acme", "acme", "Globex", "initech"]);
    }

    #[test]
    fn apply_combines_query_dropdown_and_sort() {
        let filter = ListFilter {
            query: Some("a".into()),
            active: Some(true),
            role: None,
            sort: SortOrder::NameDesc,
        };
        let rows = apply(sample(), &filter);
        assert_eq!(names(&rows), vec!["initech", "Acme"]);
    }
}
