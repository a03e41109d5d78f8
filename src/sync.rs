//! Full-replace board synchronisation (`/update-user-data`).
//!
//! The client submits every container and task it currently sees for one
//! board; the server makes its state match exactly. Last submitter wins.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{require_text, ApiError};
use crate::guard::OwnershipGuard;
use crate::models::Subject;
use crate::storage::{ContainerDraft, Storage, TaskDraft, MAX_ENTITY_ID};

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub board_id: u64,
    pub containers: Vec<ContainerSnapshot>,
    pub tasks: Vec<TaskSnapshot>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContainerSnapshot {
    pub id: u64,
    pub title: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TaskSnapshot {
    pub id: u64,
    #[serde(rename = "containerId", alias = "container_id")]
    pub container_id: u64,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub completed: bool,
}

pub struct ReconciliationEngine<'a> {
    storage: &'a Storage,
}

impl<'a> ReconciliationEngine<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    /// Authorizes, validates and applies `request` as one transaction.
    pub fn reconcile(&self, subject: Subject, request: &SyncRequest) -> Result<(), ApiError> {
        OwnershipGuard::new(self.storage).authorize_board(subject, request.board_id)?;
        validate(request)?;

        let containers: Vec<ContainerDraft> = request
            .containers
            .iter()
            .map(|c| ContainerDraft {
                id: c.id,
                title: c.title.clone(),
            })
            .collect();
        let tasks: Vec<TaskDraft> = request
            .tasks
            .iter()
            .map(|t| TaskDraft {
                id: t.id,
                container_id: t.container_id,
                title: t.title.clone(),
                description: t.description.clone(),
                completed: t.completed,
            })
            .collect();

        self.storage
            .replace_board_contents(request.board_id, &containers, &tasks)?;

        tracing::info!(
            user_id = subject.user_id,
            board_id = request.board_id,
            containers = containers.len(),
            tasks = tasks.len(),
            "board synchronised"
        );
        Ok(())
    }
}

fn require_id(kind: &str, id: u64) -> Result<(), ApiError> {
    if id > MAX_ENTITY_ID {
        return Err(ApiError::bad_request(format!(
            "{kind} id {id} exceeds the maximum of {MAX_ENTITY_ID}"
        )));
    }
    Ok(())
}

fn validate(request: &SyncRequest) -> Result<(), ApiError> {
    let mut container_ids = HashSet::with_capacity(request.containers.len());
    for container in &request.containers {
        require_id("container", container.id)?;
        require_text("container title", &container.title)?;
        if !container_ids.insert(container.id) {
            return Err(ApiError::bad_request(format!(
                "duplicate container id {}",
                container.id
            )));
        }
    }

    let mut task_ids = HashSet::with_capacity(request.tasks.len());
    for task in &request.tasks {
        require_id("task", task.id)?;
        require_text("task title", &task.title)?;
        if !task_ids.insert(task.id) {
            return Err(ApiError::bad_request(format!("duplicate task id {}", task.id)));
        }
        if !container_ids.contains(&task.container_id) {
            return Err(ApiError::bad_request(format!(
                "task {} references container {} which is not in the snapshot",
                task.id, task.container_id
            )));
        }
    }
    Ok(())
}
