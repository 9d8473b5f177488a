//! The dashboard page: headline numbers, charts and the caller's layout,
//! computed over the projects the caller can see.

use async_graphql::SimpleObject;
use chrono::Datelike;
use entity::profile;
use platform_api::ApiResult;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter};
use tracing::instrument;
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::catalog::RecordKind;
use crate::layout::{Widget, load_layout};
use crate::projects::{ProjectView, build_project_views, scoped_projects};
use crate::records::count_rows;
use crate::stats::{
    CountPoint, GroupKey, MonthPoint, SumPoint, TREND_MONTHS, YearMonth, count_by, count_points,
    monthly_series, sum_by, sum_points, top_n, total_cents,
};

pub const TOP_CUSTOMERS: usize = 5;
pub const RECENT_PROJECTS: usize = 5;
const UNASSIGNED: &str = "Unassigned";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, SimpleObject)]
pub struct DashboardStats {
    pub total_projects: u64,
    pub total_value_cents: i64,
    pub customers: u64,
    pub products: u64,
    pub brands: u64,
    pub active_users: u64,
}

#[derive(Clone, Debug, SimpleObject)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub projects_per_customer: Vec<CountPoint>,
    pub projects_per_sales: Vec<CountPoint>,
    pub monthly_projects: Vec<MonthPoint>,
    pub top_customers: Vec<SumPoint>,
    pub recent_projects: Vec<ProjectView>,
    pub layout: Vec<Widget>,
}

/// Chart data derived from an already scoped project set.
pub struct Charts {
    pub projects_per_customer: Vec<CountPoint>,
    pub projects_per_sales: Vec<CountPoint>,
    pub monthly_projects: Vec<MonthPoint>,
    pub top_customers: Vec<SumPoint>,
}

fn group(id: Option<Uuid>, label: Option<&str>) -> GroupKey {
    GroupKey {
        label: label.unwrap_or(UNASSIGNED).to_string(),
        id,
    }
}

fn customer_key(project: &ProjectView) -> GroupKey {
    let customer = project.customer.as_ref();
    group(customer.map(|c| c.id), customer.map(|c| c.name.as_str()))
}

fn sales_key(project: &ProjectView) -> GroupKey {
    let sales = project.sales.as_ref();
    group(sales.map(|s| s.id), sales.map(|s| s.full_name.as_str()))
}

/// Month a project counts towards: its start date, else when it was created.
fn project_month(project: &ProjectView) -> YearMonth {
    match project.start_date {
        Some(start) => YearMonth {
            year: start.year(),
            month: start.month(),
        },
        None => YearMonth::of(&project.created_at),
    }
}

pub fn charts(projects: &[ProjectView]) -> Charts {
    Charts {
        projects_per_customer: count_points(count_by(projects, customer_key)),
        projects_per_sales: count_points(count_by(projects, sales_key)),
        monthly_projects: monthly_series(projects, project_month, |p| p.value_cents, TREND_MONTHS),
        top_customers: sum_points(top_n(
            sum_by(projects, customer_key, |p| p.value_cents),
            TOP_CUSTOMERS,
        )),
    }
}

#[instrument(skip(db, user), fields(user_id = %user.user_id, role = ?user.role))]
pub async fn load_dashboard(db: &DatabaseConnection, user: &CurrentUser) -> ApiResult<Dashboard> {
    let projects = build_project_views(db, scoped_projects(db, user).await?).await?;

    let stats = DashboardStats {
        total_projects: projects.len() as u64,
        total_value_cents: total_cents(projects.iter().map(|p| p.value_cents)),
        customers: count_rows(db, RecordKind::Customer).await?,
        products: count_rows(db, RecordKind::Product).await?,
        brands: count_rows(db, RecordKind::Brand).await?,
        active_users: profile::Entity::find()
            .filter(profile::Column::IsActive.eq(true))
            .count(db)
            .await?,
    };
    let charts = charts(&projects);
    let layout = load_layout(db, user.user_id).await?;

    // scoped_projects returns newest first
    let recent_projects = projects.into_iter().take(RECENT_PROJECTS).collect();

    Ok(Dashboard {
        stats,
        projects_per_customer: charts.projects_per_customer,
        projects_per_sales: charts.projects_per_sales,
        monthly_projects: charts.monthly_projects,
        top_customers: charts.top_customers,
        recent_projects,
        layout,
    })
}
