//! Per-user dashboard widget layout.
//!
//! A user without a stored layout gets the default. Stored layouts are merged
//! with the current widget set on read: ids that no longer exist are dropped,
//! widgets added since are appended, and the saved order is kept.

use std::collections::HashSet;

use async_graphql::{InputObject, SimpleObject};
use chrono::Utc;
use entity::dashboard_layout;
use platform_api::{ApiError, ApiResult};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveValue::Set, ConnectionTrait, EntityTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// Widget ids in their default order.
pub const DEFAULT_WIDGETS: [&str; 6] = [
    "stats",
    "projects_per_customer",
    "projects_per_sales",
    "monthly_projects",
    "top_customers",
    "recent_projects",
];

#[derive(
    Clone, Debug, PartialEq, Eq, Serialize, Deserialize, SimpleObject, InputObject,
)]
#[graphql(input_name = "WidgetInput")]
pub struct Widget {
    pub id: String,
    #[serde(default = "visible")]
    #[graphql(default = true)]
    pub visible: bool,
}

fn visible() -> bool {
    true
}

pub fn default_layout() -> Vec<Widget> {
    DEFAULT_WIDGETS
        .iter()
        .map(|id| Widget {
            id: (*id).to_string(),
            visible: true,
        })
        .collect()
}

pub fn merge_layout(saved: Vec<Widget>) -> Vec<Widget> {
    let mut seen = HashSet::new();
    let mut merged: Vec<Widget> = saved
        .into_iter()
        .filter(|w| DEFAULT_WIDGETS.contains(&w.id.as_str()) && seen.insert(w.id.clone()))
        .collect();
    for id in DEFAULT_WIDGETS {
        if !seen.contains(id) {
            merged.push(Widget {
                id: id.to_string(),
                visible: true,
            });
        }
    }
    merged
}

/// Parse a stored layout; anything unreadable falls back to the default.
pub fn parse_layout(raw: &str) -> Vec<Widget> {
    match serde_json::from_str::<Vec<Widget>>(raw) {
        Ok(saved) => merge_layout(saved),
        Err(err) => {
            warn!(error = %err, "stored dashboard layout is not valid JSON; using default");
            default_layout()
        }
    }
}

pub async fn load_layout<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> ApiResult<Vec<Widget>> {
    let stored = dashboard_layout::Entity::find_by_id(user_id).one(conn).await?;
    Ok(match stored {
        Some(row) => parse_layout(&row.widgets),
        None => default_layout(),
    })
}

pub async fn save_layout<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
    widgets: Vec<Widget>,
) -> ApiResult<Vec<Widget>> {
    let merged = merge_layout(widgets);
    let json = serde_json::to_string(&merged).map_err(ApiError::internal)?;
    let row = dashboard_layout::ActiveModel {
        user_id: Set(user_id),
        widgets: Set(json),
        updated_at: Set(Utc::now().into()),
    };
    dashboard_layout::Entity::insert(row)
        .on_conflict(
            OnConflict::column(dashboard_layout::Column::UserId)
                .update_columns([
                    dashboard_layout::Column::Widgets,
                    dashboard_layout::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    info!(%user_id, "dashboard layout saved");
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(widgets: &[Widget]) -> Vec<&str> {
        widgets.iter().map(|w| w.id.as_str()).collect()
    }

    #[test]
    fn merge_keeps_order_drops_unknown_and_appends_new() {
        let saved = vec![
            Widget { id: "top_customers".into(), visible: false },
            Widget { id: "retired_widget".into(), visible: true },
            Widget { id: "stats".into(), visible: true },
            Widget { id: "stats".into(), visible: false },
        ];
        let merged = merge_layout(saved);
        assert_eq!(
            ids(&merged),
            vec![
                "top_customers",
                "stats",
                "projects_per_customer",
                "projects_per_sales",
                "monthly_projects",
                "recent_projects",
            ]
        );
        assert!(!merged[0].visible);
        assert!(merged[1].visible);
    }

    #[test]
    fn invalid_json_falls_back_to_default() {
        assert_eq!(parse_layout("{not json"), default_layout());
    }

    #[test]
    fn missing_visibility_defaults_to_shown() {
        let layout = parse_layout(r#"[{"id":"monthly_projects"}]"#);
        assert_eq!(layout[0].id, "monthly_projects");
        assert!(layout[0].visible);
        assert_eq!(layout.len(), DEFAULT_WIDGETS.len());
    }
}
