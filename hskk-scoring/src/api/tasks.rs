//! Task listing

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::criteria::TaskDefinition;
use crate::AppState;

/// GET /api/v1/tasks response
#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub count: usize,
    pub tasks: Vec<TaskDefinition>,
}

/// GET /api/v1/tasks
///
/// Task definitions in declaration order.
pub async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    let tasks: Vec<TaskDefinition> = state
        .engine
        .registry()
        .tasks()
        .map(|task| task.as_ref().clone())
        .collect();
    Json(TaskListResponse {
        count: tasks.len(),
        tasks,
    })
}

pub fn task_routes() -> Router<AppState> {
    Router::new().route("/api/v1/tasks", get(list_tasks))
}
