//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::debug;

use super::AppState;
use super::types::{
    ComparisonSummary, ErrorResponse, FlagInfo, KpiQuery, ScenarioSummary, TableResponse,
};
use crate::dataset::{Dataset, Flag};
use crate::error::StudyError;
use crate::kpi::{KpiRecord, UnitHandling};

type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

/// `GET /scenarios` → 200 + `Vec<ScenarioSummary>` JSON
pub async fn get_scenarios(State(state): State<Arc<AppState>>) -> Json<Vec<ScenarioSummary>> {
    Json(
        state
            .study
            .scenarios()
            .iter()
            .map(|d| ScenarioSummary::from_dataset(d.as_ref()))
            .collect(),
    )
}

/// `GET /comparisons` → 200 + `Vec<ComparisonSummary>` JSON
pub async fn get_comparisons(State(state): State<Arc<AppState>>) -> Json<Vec<ComparisonSummary>> {
    Json(
        state
            .study
            .comparisons()
            .iter()
            .filter_map(|d| d.as_comparison())
            .map(|c| ComparisonSummary {
                name: c.name().to_string(),
                variation: c.variation().name().to_string(),
                reference: c.reference().name().to_string(),
            })
            .collect(),
    )
}

/// Flags accepted by the scenario view. Unit and model flag come from the
/// first scenario that knows them.
///
/// `GET /flags` → 200 + `Vec<FlagInfo>` JSON
pub async fn get_flags(State(state): State<Arc<AppState>>) -> Json<Vec<FlagInfo>> {
    let scenarios = state.study.scenarios();
    let flags = state
        .study
        .scen()
        .accepted_flags()
        .into_iter()
        .map(|flag| FlagInfo {
            unit: scenarios
                .iter()
                .find_map(|d| d.flag_index().unit(&flag))
                .map(|u| u.symbol().to_string()),
            model_flag: scenarios
                .iter()
                .find_map(|d| d.flag_index().linked_model_flag(&flag))
                .map(|f| f.to_string()),
            flag: flag.to_string(),
        })
        .collect();
    Json(flags)
}

/// Fetches `flag` from a view (`scen`, `comp`, `scen-comp`) or a named dataset.
///
/// `GET /fetch/{view}/{flag}` → 200 + `TableResponse` JSON
/// Unknown view or flag → 404 + `ErrorResponse`
pub async fn get_fetch(
    State(state): State<Arc<AppState>>,
    Path((view, flag)): Path<(String, String)>,
) -> Result<Json<TableResponse>, ApiError> {
    let dataset = state
        .study
        .view(&view)
        .ok_or_else(|| error(StatusCode::NOT_FOUND, format!("unknown view or dataset `{view}`")))?;
    debug!(view = %view, flag = %flag, "api fetch");
    match dataset.fetch(&Flag::new(flag)) {
        Ok(table) => Ok(Json(TableResponse::from(&table))),
        Err(e @ StudyError::UnknownFlag { .. }) => Err(error(StatusCode::NOT_FOUND, e.to_string())),
        Err(e) => Err(error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// Returns computed KPIs, optionally filtered.
///
/// `GET /kpis` → 200 + `Vec<KpiRecord>` JSON
/// `GET /kpis?dataset_name=base&aggregation=Mean` → matching KPIs only
pub async fn get_kpis(
    State(state): State<Arc<AppState>>,
    Query(query): Query<KpiQuery>,
) -> impl IntoResponse {
    let mut kpis = state.kpis.clone();
    for (key, value) in [
        ("dataset_name", &query.dataset_name),
        ("flag", &query.flag),
        ("aggregation", &query.aggregation),
        ("dataset_type", &query.dataset_type),
    ] {
        if let Some(value) = value {
            kpis = kpis.filter(key, value.as_str());
        }
    }
    let records: Vec<KpiRecord> = kpis.to_records(&UnitHandling::Original);
    Json(records)
}
