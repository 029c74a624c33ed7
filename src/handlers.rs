use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        ApiMessage, ApiResponse, Region, RegionalResponse, ReplicatedResponse, SignalementDraft,
        UpdateSignalementRequest,
    },
    replication::{Mutation, ReplicationReport},
    state::AppState,
};

pub async fn healthcheck() -> Json<ApiResponse<ApiMessage>> {
    Json(ApiResponse {
        data: ApiMessage {
            message: "ok".to_string(),
        },
    })
}

pub async fn list_signalements(
    State(state): State<AppState>,
    Path(localization): Path<String>,
) -> AppResult<Json<RegionalResponse>> {
    let region: Region = localization
        .parse()
        .map_err(|_| AppError::not_found("localization not found"))?;

    let readout = state
        .reader
        .read_all(region)
        .await
        .map_err(|err| AppError::all_backends_failed(err.to_string()))?;

    Ok(Json(RegionalResponse {
        data: readout.rows,
        served_by: readout.served_by,
    }))
}

pub async fn create_signalement(
    State(state): State<AppState>,
    Json(draft): Json<SignalementDraft>,
) -> AppResult<(StatusCode, Json<ReplicatedResponse>)> {
    validate_draft(&draft)?;

    let report = state.coordinator.apply(&Mutation::insert(draft)).await;
    let (record, report) = expect_record(report, "inserting")?;

    Ok((
        StatusCode::CREATED,
        Json(ReplicatedResponse {
            data: record,
            replication: report.outcomes,
        }),
    ))
}

pub async fn replace_signalement(
    State(state): State<AppState>,
    Json(payload): Json<UpdateSignalementRequest>,
) -> AppResult<Json<ReplicatedResponse>> {
    validate_draft(&payload.draft)?;

    let report = state
        .coordinator
        .apply(&Mutation::Update {
            global_id: payload.id,
            draft: payload.draft,
        })
        .await;

    if report.all_failed() {
        return Err(AppError::all_backends_failed(format!(
            "an error occurred while updating the signalement: {}",
            report.failure_summary()
        )));
    }

    // Reachable backends but no matching row anywhere: nothing to update.
    let Some(record) = report.record else {
        return Err(AppError::not_found("signalement not found"));
    };

    Ok(Json(ReplicatedResponse {
        data: record,
        replication: report.outcomes,
    }))
}

pub async fn delete_signalement(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let report = state
        .coordinator
        .apply(&Mutation::Delete { global_id: id })
        .await;

    if report.all_failed() {
        return Err(AppError::all_backends_failed(format!(
            "an error occurred while deleting the signalement: {}",
            report.failure_summary()
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}

fn expect_record(
    report: ReplicationReport,
    operation: &str,
) -> AppResult<(crate::models::Signalement, ReplicationReport)> {
    if report.all_failed() {
        return Err(AppError::all_backends_failed(format!(
            "an error occurred while {operation} the signalement: {}",
            report.failure_summary()
        )));
    }

    match report.record {
        Some(ref record) => {
            let record = record.clone();
            Ok((record, report))
        }
        None => Err(AppError::Internal),
    }
}

fn validate_draft(draft: &SignalementDraft) -> AppResult<()> {
    let kind = draft.kind.trim();
    if kind.is_empty() {
        return Err(AppError::validation("type must not be blank"));
    }
    // Character limits, not byte limits: VARCHAR(150) counts characters.
    if kind.chars().count() > 150 {
        return Err(AppError::validation("type must be at most 150 characters"));
    }
    if let Some(infos) = draft.additionnal_infos.as_deref()
        && infos.chars().count() > 5000
    {
        return Err(AppError::validation(
            "additionnal_infos must be at most 5000 characters",
        ));
    }
    Ok(())
}
