use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize};
use uuid::Uuid;

use super::error::ApiError;
use crate::db::Database;
use crate::models::*;

type ApiResult<T> = Result<T, ApiError>;

/// The last path segment of edit/delete routes.
///
/// `{pk}` selects the record for editing, `delete-{pk}` for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum RecordKey {
    Edit(Uuid),
    Delete(Uuid),
}

impl RecordKey {
    pub fn id(self) -> Uuid {
        match self {
            Self::Edit(id) | Self::Delete(id) => id,
        }
    }
}

impl TryFrom<String> for RecordKey {
    type Error = String;

    fn try_from(segment: String) -> Result<Self, Self::Error> {
        let (raw, delete) = match segment.strip_prefix("delete-") {
            Some(rest) => (rest, true),
            None => (segment.as_str(), false),
        };
        let id = Uuid::parse_str(raw).map_err(|e| format!("invalid record id {:?}: {}", raw, e))?;
        Ok(if delete {
            Self::Delete(id)
        } else {
            Self::Edit(id)
        })
    }
}

/// Parse a JSON form submission. Delete confirmations post no body, so edit
/// routes parse explicitly instead of using the `Json` extractor.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Projects
// ============================================================

#[derive(Debug, Deserialize)]
pub struct ListProjectsQuery {
    pub status: Option<ProjectStatus>,
}

pub async fn list_projects(
    State(db): State<Database>,
    Query(query): Query<ListProjectsQuery>,
) -> ApiResult<Json<Vec<Project>>> {
    Ok(Json(db.get_all_projects(query.status)?))
}

/// Project detail: the project, its backlog in priority order, and its
/// sprints with their aggregates.
pub async fn get_project(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<ProjectDetail>> {
    db.get_project_detail(project_id)?
        .map(Json)
        .ok_or(ApiError::NotFound("Project"))
}

pub async fn project_form() -> Json<ProjectForm> {
    Json(ProjectForm::default())
}

pub async fn create_project(
    State(db): State<Database>,
    Json(input): Json<CreateProjectInput>,
) -> ApiResult<(StatusCode, Json<ProjectHierarchy>)> {
    let hierarchy = db.create_project(input)?;
    Ok((StatusCode::CREATED, Json(hierarchy)))
}

pub async fn get_project_record(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<Project>> {
    db.get_project(project_id)?
        .map(Json)
        .ok_or(ApiError::NotFound("Project"))
}

pub async fn update_project(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
    Json(input): Json<UpdateProjectInput>,
) -> ApiResult<Json<Project>> {
    db.update_project(project_id, input)?
        .map(Json)
        .ok_or(ApiError::NotFound("Project"))
}

pub async fn delete_project(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if db.delete_project(project_id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Project"))
    }
}

pub async fn velocity_chart(
    State(db): State<Database>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Json<VelocityChart>> {
    db.get_velocity_chart(project_id)?
        .map(Json)
        .ok_or(ApiError::NotFound("Project"))
}

// ============================================================
// Sprint Backlogs
// ============================================================

/// Fail with 404 unless the backlog exists and belongs to the project.
fn backlog_in_project(db: &Database, project_id: Uuid, backlog_id: Uuid) -> ApiResult<()> {
    match db.get_product_backlog(backlog_id)? {
        Some(backlog) if backlog.project_id == project_id => Ok(()),
        _ => Err(ApiError::NotFound("Product backlog")),
    }
}

pub async fn create_sprint(
    State(db): State<Database>,
    Path((project_id, backlog_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<CreateSprintInput>,
) -> ApiResult<(StatusCode, Json<SprintBacklog>)> {
    backlog_in_project(&db, project_id, backlog_id)?;
    let sprint = db.create_sprint_backlog(backlog_id, input)?;
    Ok((StatusCode::CREATED, Json(sprint)))
}

/// Sprint detail: aggregates plus the PBIs in priority order.
pub async fn get_sprint(
    State(db): State<Database>,
    Path(sprint_id): Path<Uuid>,
) -> ApiResult<Json<SprintDetail>> {
    db.get_sprint_with_pbis(sprint_id)?
        .map(|sprint| Json(sprint.detail()))
        .ok_or(ApiError::NotFound("Sprint backlog"))
}

pub async fn update_sprint(
    State(db): State<Database>,
    Path(sprint_id): Path<Uuid>,
    Json(input): Json<UpdateSprintInput>,
) -> ApiResult<Json<SprintBacklog>> {
    db.update_sprint_backlog(sprint_id, input)?
        .map(Json)
        .ok_or(ApiError::NotFound("Sprint backlog"))
}

// ============================================================
// Product Backlog Items
// ============================================================

pub async fn create_pbi(
    State(db): State<Database>,
    Path((project_id, backlog_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<CreatePbiInput>,
) -> ApiResult<(StatusCode, Json<ProductBacklogItem>)> {
    backlog_in_project(&db, project_id, backlog_id)?;
    let pbi = db.create_pbi(backlog_id, input)?;
    Ok((StatusCode::CREATED, Json(pbi)))
}

/// PBI detail for both the edit form and the delete confirmation, so the
/// tasks that would be removed are visible.
pub async fn get_pbi_record(
    State(db): State<Database>,
    Path(key): Path<RecordKey>,
) -> ApiResult<Json<PbiDetail>> {
    db.get_pbi_with_tasks(key.id())?
        .map(|pbi| Json(pbi.detail()))
        .ok_or(ApiError::NotFound("PBI"))
}

pub async fn post_pbi_record(
    State(db): State<Database>,
    Path(key): Path<RecordKey>,
    body: Bytes,
) -> ApiResult<Response> {
    match key {
        RecordKey::Edit(id) => {
            let input: UpdatePbiInput = parse_body(&body)?;
            let pbi = db.update_pbi(id, input)?.ok_or(ApiError::NotFound("PBI"))?;
            Ok(Json(pbi).into_response())
        }
        RecordKey::Delete(id) => {
            if db.delete_pbi(id)? {
                tracing::info!(pbi_id = %id, "Deleted PBI");
                Ok(StatusCode::NO_CONTENT.into_response())
            } else {
                Err(ApiError::NotFound("PBI"))
            }
        }
    }
}

// ============================================================
// Tasks
// ============================================================

pub async fn create_task(
    State(db): State<Database>,
    Path((project_id, sprint_id, pbi_id)): Path<(Uuid, Uuid, Uuid)>,
    Json(input): Json<CreateTaskInput>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    if db.get_sprint_project_id(sprint_id)? != Some(project_id) {
        return Err(ApiError::NotFound("Sprint backlog"));
    }
    if db.get_pbi_project_id(pbi_id)? != Some(project_id) {
        return Err(ApiError::NotFound("PBI"));
    }
    let task = db.create_task(pbi_id, input)?;
    Ok((StatusCode::CREATED, Json(task)))
}

/// Fetch a task, treating one filed under a different PBI as missing.
fn task_of_pbi(db: &Database, pbi_id: Uuid, task_id: Uuid) -> ApiResult<Task> {
    match db.get_task(task_id)? {
        Some(task) if task.pbi_id == pbi_id => Ok(task),
        _ => Err(ApiError::NotFound("Task")),
    }
}

pub async fn view_task(
    State(db): State<Database>,
    Path((pbi_id, task_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Task>> {
    task_of_pbi(&db, pbi_id, task_id).map(Json)
}

pub async fn get_task_record(
    State(db): State<Database>,
    Path((pbi_id, key)): Path<(Uuid, RecordKey)>,
) -> ApiResult<Json<Task>> {
    task_of_pbi(&db, pbi_id, key.id()).map(Json)
}

pub async fn post_task_record(
    State(db): State<Database>,
    Path((pbi_id, key)): Path<(Uuid, RecordKey)>,
    body: Bytes,
) -> ApiResult<Response> {
    task_of_pbi(&db, pbi_id, key.id())?;
    match key {
        RecordKey::Edit(id) => {
            let input: UpdateTaskInput = parse_body(&body)?;
            let task = db.update_task(id, input)?.ok_or(ApiError::NotFound("Task"))?;
            Ok(Json(task).into_response())
        }
        RecordKey::Delete(id) => {
            if db.delete_task(id)? {
                tracing::info!(task_id = %id, "Deleted task");
                Ok(StatusCode::NO_CONTENT.into_response())
            } else {
                Err(ApiError::NotFound("Task"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_key_parses_edit_and_delete_segments() {
        let id = Uuid::new_v4();
        assert_eq!(RecordKey::try_from(id.to_string()), Ok(RecordKey::Edit(id)));
        assert_eq!(
            RecordKey::try_from(format!("delete-{}", id)),
            Ok(RecordKey::Delete(id))
        );
        assert!(RecordKey::try_from("delete-".to_string()).is_err());
        assert!(RecordKey::try_from("remove-1".to_string()).is_err());
    }
}
