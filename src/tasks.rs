use std::str::FromStr;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::Query;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Task, User};
use crate::{breaks, proceeds, AppState, Error, Payload};

async fn load_user(state: &AppState, email: &str) -> Result<User, Error> {
    state
        .store
        .find_by_email(email)
        .await?
        .ok_or_else(|| Error::no_user(email))
}

fn no_task(id: Uuid) -> Error {
    Error::TaskDoesNotExist {
        message: format!("Task `{}` does not exist!", id),
    }
}

pub async fn list_tasks(
    query: Result<Query<ByEmail>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<TaskList> {
    let Query(req) = query?;
    let user = load_user(&state, &req.email).await?;
    proceeds(TaskList { tasks: user.tasks })
}

pub async fn get_task(
    query: Result<Query<ByTask>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<SingleTask> {
    let Query(req) = query?;
    let id = Uuid::from_str(&req.task_id)?;
    let user = load_user(&state, &req.email).await?;
    match user.task(id) {
        Some(task) => proceeds(SingleTask { task: task.clone() }),
        None => breaks(no_task(id)),
    }
}

pub async fn create_task(
    query: Result<Query<CreateTask>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<TaskCreated> {
    let Query(req) = query?;
    let deadline = DateTime::parse_from_rfc3339(&req.deadline)?.with_timezone(&Utc);
    let mut user = load_user(&state, &req.email).await?;

    let task = Task::new(req.title, req.description.unwrap_or_default(), deadline);
    let task_id = task.id;
    user.tasks.push(task);
    state.store.replace(&user).await?;

    log::debug!("Created task {} for {}", task_id, user.email);
    proceeds(TaskCreated { task_id })
}

pub async fn update_task(
    query: Result<Query<ByEmail>, QueryRejection>,
    Extension(state): Extension<AppState>,
    body: Result<Json<Task>, JsonRejection>,
) -> Payload<TaskUpdated> {
    let Query(req) = query?;
    let Json(task) = body?;
    let mut user = load_user(&state, &req.email).await?;
    let task_id = task.id;
    if !user.replace_task(task) {
        return breaks(no_task(task_id));
    }
    state.store.replace(&user).await?;
    proceeds(TaskUpdated { task_id })
}

pub async fn delete_task(
    query: Result<Query<ByTask>, QueryRejection>,
    Extension(state): Extension<AppState>,
) -> Payload<TaskDeleted> {
    let Query(req) = query?;
    let id = Uuid::from_str(&req.task_id)?;
    let mut user = load_user(&state, &req.email).await?;
    if user.remove_task(id).is_none() {
        return breaks(no_task(id));
    }
    state.store.replace(&user).await?;
    proceeds(TaskDeleted { task_id: id })
}

#[derive(Debug, Clone, Deserialize)]
pub struct ByEmail {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ByTask {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub task_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTask {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub deadline: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskList {
    tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SingleTask {
    task: Task,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskCreated {
    task_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskUpdated {
    task_id: Uuid,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskDeleted {
    task_id: Uuid,
}
