//! Ownership checks. Every container and task is authorized through its board.

use crate::error::ApiError;
use crate::models::{Board, Container, Subject, Task};
use crate::storage::Storage;

pub struct OwnershipGuard<'a> {
    storage: &'a Storage,
}

impl<'a> OwnershipGuard<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub fn authorize_board(&self, subject: Subject, board_id: u64) -> Result<Board, ApiError> {
        let board = self
            .storage
            .board(board_id)?
            .ok_or_else(|| ApiError::NotFound(format!("board {board_id}")))?;
        self.check_owner(subject, &board)?;
        Ok(board)
    }

    pub fn authorize_container(
        &self,
        subject: Subject,
        container_id: u64,
    ) -> Result<Container, ApiError> {
        let container = self
            .storage
            .container(container_id)?
            .ok_or_else(|| ApiError::NotFound(format!("container {container_id}")))?;
        self.authorize_board(subject, container.board_id)?;
        Ok(container)
    }

    pub fn authorize_task(&self, subject: Subject, task_id: u64) -> Result<Task, ApiError> {
        let task = self
            .storage
            .task(task_id)?
            .ok_or_else(|| ApiError::NotFound(format!("task {task_id}")))?;
        self.authorize_container(subject, task.container_id)?;
        Ok(task)
    }

    /// Read scope for a board: `None` when the board does not exist, `Forbidden`
    /// when it belongs to someone else.
    pub fn scope_board_read(
        &self,
        subject: Subject,
        board_id: u64,
    ) -> Result<Option<Board>, ApiError> {
        match self.storage.board(board_id)? {
            Some(board) => {
                self.check_owner(subject, &board)?;
                Ok(Some(board))
            }
            None => Ok(None),
        }
    }

    /// Same as `scope_board_read`, one level down.
    pub fn scope_container_read(
        &self,
        subject: Subject,
        container_id: u64,
    ) -> Result<Option<Container>, ApiError> {
        let Some(container) = self.storage.container(container_id)? else {
            return Ok(None);
        };
        match self.scope_board_read(subject, container.board_id)? {
            Some(_) => Ok(Some(container)),
            None => Ok(None),
        }
    }

    fn check_owner(&self, subject: Subject, board: &Board) -> Result<(), ApiError> {
        if board.user_id != subject.user_id {
            tracing::warn!(
                user_id = subject.user_id,
                board_id = board.id,
                "ownership check failed"
            );
            return Err(ApiError::Forbidden);
        }
        Ok(())
    }
}
