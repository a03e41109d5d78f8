//! Board hierarchy storage on Sled.
//!
//! One tree per entity kind, keyed by big-endian `u64` ids, with JSON values:
//! - `users` / `usernames`: accounts and the unique-username index
//! - `boards`, `containers`, `tasks`: the hierarchy; parents keep ordered child id lists
//! - `meta`: the shared id counter
//!
//! Every operation that touches more than one row runs inside a single
//! multi-tree transaction, so cascades and reconciliations are all-or-nothing.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::{Db, IVec, Transactional, Tree};
use thiserror::Error;

use crate::models::{Board, Container, Task, User, UserSnapshot, DEFAULT_BACKGROUND};

const NEXT_ID_KEY: &[u8] = b"next_id";

/// Upper bound for a single `reserve_ids` call.
pub const MAX_RESERVED_IDS: u64 = 1000;

/// Largest id the store hands out or accepts; ids always fit in an `i64`.
pub const MAX_ENTITY_ID: u64 = i64::MAX as u64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u64 },
    #[error("username already taken")]
    UsernameTaken,
    #[error("{kind} {id} belongs to another board")]
    ForeignId { kind: &'static str, id: u64 },
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("id space exhausted")]
    IdsExhausted,
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
    #[error("corrupt record: {0}")]
    Codec(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<TransactionError<StoreError>> for StoreError {
    fn from(err: TransactionError<StoreError>) -> Self {
        match err {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => StoreError::Sled(err),
        }
    }
}

type TxResult<T> = ConflictableTransactionResult<T, StoreError>;

fn abort<E: Into<StoreError>>(err: E) -> ConflictableTransactionError<StoreError> {
    ConflictableTransactionError::Abort(err.into())
}

fn key(id: u64) -> IVec {
    IVec::from(&id.to_be_bytes()[..])
}

fn decode_id(bytes: &[u8]) -> StoreResult<u64> {
    let raw: [u8; 8] = bytes
        .try_into()
        .map_err(|_| StoreError::Invalid(format!("malformed id of {} bytes", bytes.len())))?;
    Ok(u64::from_be_bytes(raw))
}

fn load<T: DeserializeOwned>(tree: &Tree, id: u64) -> StoreResult<Option<T>> {
    match tree.get(key(id))? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn tx_load<T: DeserializeOwned>(tree: &TransactionalTree, id: u64) -> TxResult<Option<T>> {
    match tree.get(key(id))? {
        Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(abort),
        None => Ok(None),
    }
}

fn tx_require<T: DeserializeOwned>(
    tree: &TransactionalTree,
    kind: &'static str,
    id: u64,
) -> TxResult<T> {
    tx_load(tree, id)?.ok_or_else(|| abort(StoreError::NotFound { kind, id }))
}

fn tx_store<T: Serialize>(tree: &TransactionalTree, id: u64, value: &T) -> TxResult<()> {
    let bytes = serde_json::to_vec(value).map_err(abort)?;
    tree.insert(key(id), bytes)?;
    Ok(())
}

fn tx_next_counter(meta: &TransactionalTree) -> TxResult<u64> {
    match meta.get(NEXT_ID_KEY)? {
        Some(bytes) => decode_id(&bytes).map_err(abort),
        None => Ok(1),
    }
}

/// Allocates `count` consecutive ids from the shared counter.
fn tx_allocate(meta: &TransactionalTree, count: u64) -> TxResult<u64> {
    let first = tx_next_counter(meta)?;
    let next = first
        .checked_add(count)
        .filter(|next| *next <= MAX_ENTITY_ID + 1)
        .ok_or_else(|| abort(StoreError::IdsExhausted))?;
    meta.insert(NEXT_ID_KEY, key(next))?;
    Ok(first)
}

/// Advances the counter past `id` so later allocations never hand it out.
fn tx_bump_past(meta: &TransactionalTree, id: u64) -> TxResult<()> {
    if id > MAX_ENTITY_ID {
        return Err(abort(StoreError::Invalid(format!(
            "id {id} exceeds the maximum of {MAX_ENTITY_ID}"
        ))));
    }
    if tx_next_counter(meta)? <= id {
        meta.insert(NEXT_ID_KEY, key(id + 1))?;
    }
    Ok(())
}

/// Removes a container and all of its tasks. Returns the removed container.
fn tx_remove_container(
    containers: &TransactionalTree,
    tasks: &TransactionalTree,
    container_id: u64,
) -> TxResult<Option<Container>> {
    let Some(container) = tx_load::<Container>(containers, container_id)? else {
        return Ok(None);
    };
    for task_id in &container.task_ids {
        tasks.remove(key(*task_id))?;
    }
    containers.remove(key(container_id))?;
    Ok(Some(container))
}

/// A container as submitted in a board snapshot.
#[derive(Debug, Clone)]
pub struct ContainerDraft {
    pub id: u64,
    pub title: String,
}

/// A task as submitted in a board snapshot.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub id: u64,
    pub container_id: u64,
    pub title: String,
    pub description: String,
    pub completed: bool,
}

#[derive(Clone)]
pub struct Storage {
    db: Db,
    users: Tree,
    usernames: Tree,
    boards: Tree,
    containers: Tree,
    tasks: Tree,
    meta: Tree,
}

impl Storage {
    /// Open or create the Sled database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// In-memory database that is discarded on drop.
    pub fn temporary() -> StoreResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        Ok(Self {
            users: db.open_tree("users")?,
            usernames: db.open_tree("usernames")?,
            boards: db.open_tree("boards")?,
            containers: db.open_tree("containers")?,
            tasks: db.open_tree("tasks")?,
            meta: db.open_tree("meta")?,
            db,
        })
    }

    pub async fn flush(&self) -> StoreResult<()> {
        self.db.flush_async().await?;
        Ok(())
    }

    // --- Users ---

    /// Creates the account together with its default board.
    pub fn create_user(&self, username: &str, email: &str, password_hash: &str) -> StoreResult<User> {
        let user = (&self.users, &self.usernames, &self.boards, &self.meta).transaction(
            |(users, usernames, boards, meta)| {
                if usernames.get(username.as_bytes())?.is_some() {
                    return Err(abort(StoreError::UsernameTaken));
                }

                let user_id = tx_allocate(meta, 1)?;
                let board_id = tx_allocate(meta, 1)?;

                let board = Board {
                    id: board_id,
                    user_id,
                    title: format!("{username}'s Board"),
                    background: DEFAULT_BACKGROUND.to_string(),
                    container_ids: vec![],
                };
                let user = User {
                    id: user_id,
                    username: username.to_string(),
                    email: email.to_string(),
                    password_hash: password_hash.to_string(),
                    background: DEFAULT_BACKGROUND.to_string(),
                    boards: vec![board_id],
                };

                tx_store(boards, board_id, &board)?;
                tx_store(users, user_id, &user)?;
                usernames.insert(username.as_bytes(), key(user_id))?;
                Ok(user)
            },
        )?;

        tracing::info!(user_id = user.id, "user created");
        Ok(user)
    }

    pub fn user(&self, id: u64) -> StoreResult<Option<User>> {
        load(&self.users, id)
    }

    pub fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        match self.usernames.get(username.as_bytes())? {
            Some(id) => self.user(decode_id(&id)?),
            None => Ok(None),
        }
    }

    /// Everything owned by `user_id`, in board order.
    pub fn user_snapshot(&self, user_id: u64) -> StoreResult<UserSnapshot> {
        let user = self
            .user(user_id)?
            .ok_or(StoreError::NotFound { kind: "user", id: user_id })?;

        let mut snapshot = UserSnapshot {
            background: user.background,
            ..UserSnapshot::default()
        };
        for board in self.list_boards(user_id)? {
            for container in self.list_containers(board.id)? {
                snapshot.tasks.extend(self.list_tasks(container.id)?);
                snapshot.containers.push(container);
            }
            snapshot.boards.push(board);
        }
        Ok(snapshot)
    }

    // --- Ids ---

    /// Hands out `count` fresh ids that no server-side insert will reuse.
    pub fn reserve_ids(&self, count: u64) -> StoreResult<Vec<u64>> {
        if count == 0 || count > MAX_RESERVED_IDS {
            return Err(StoreError::Invalid(format!(
                "count must be between 1 and {MAX_RESERVED_IDS}"
            )));
        }
        let first = self.meta.transaction(|meta| tx_allocate(meta, count))?;
        Ok((first..first + count).collect())
    }

    // --- Boards ---

    pub fn board(&self, id: u64) -> StoreResult<Option<Board>> {
        load(&self.boards, id)
    }

    pub fn create_board(&self, owner_id: u64, title: &str, background: &str) -> StoreResult<Board> {
        let board = (&self.users, &self.boards, &self.meta).transaction(|(users, boards, meta)| {
            let mut user: User = tx_require(users, "user", owner_id)?;
            let board = Board {
                id: tx_allocate(meta, 1)?,
                user_id: owner_id,
                title: title.to_string(),
                background: background.to_string(),
                container_ids: vec![],
            };
            user.boards.push(board.id);
            tx_store(boards, board.id, &board)?;
            tx_store(users, owner_id, &user)?;
            Ok(board)
        })?;

        tracing::debug!(board_id = board.id, owner_id, "board created");
        Ok(board)
    }

    pub fn list_boards(&self, owner_id: u64) -> StoreResult<Vec<Board>> {
        let Some(user) = self.user(owner_id)? else {
            return Ok(vec![]);
        };
        let mut boards = Vec::with_capacity(user.boards.len());
        for id in user.boards {
            if let Some(board) = self.board(id)? {
                boards.push(board);
            }
        }
        Ok(boards)
    }

    /// Updates title and background; the owner is never touched.
    pub fn update_board(&self, id: u64, title: &str, background: &str) -> StoreResult<Board> {
        let board = self.boards.transaction(|boards| {
            let mut board: Board = tx_require(boards, "board", id)?;
            board.title = title.to_string();
            board.background = background.to_string();
            tx_store(boards, id, &board)?;
            Ok(board)
        })?;
        Ok(board)
    }

    /// Removes the board, its containers and their tasks, and unlinks it from the owner.
    pub fn delete_board(&self, id: u64) -> StoreResult<()> {
        (&self.users, &self.boards, &self.containers, &self.tasks).transaction(
            |(users, boards, containers, tasks)| {
                let board: Board = tx_require(boards, "board", id)?;
                for container_id in &board.container_ids {
                    tx_remove_container(containers, tasks, *container_id)?;
                }
                boards.remove(key(id))?;

                if let Some(mut user) = tx_load::<User>(users, board.user_id)? {
                    user.boards.retain(|board_id| *board_id != id);
                    tx_store(users, user.id, &user)?;
                }
                Ok(())
            },
        )?;

        tracing::debug!(board_id = id, "board deleted with descendants");
        Ok(())
    }

    // --- Containers ---

    pub fn container(&self, id: u64) -> StoreResult<Option<Container>> {
        load(&self.containers, id)
    }

    /// Containers of a board in board order. Empty if the board does not exist.
    pub fn list_containers(&self, board_id: u64) -> StoreResult<Vec<Container>> {
        let Some(board) = self.board(board_id)? else {
            return Ok(vec![]);
        };
        let mut containers = Vec::with_capacity(board.container_ids.len());
        for id in board.container_ids {
            if let Some(container) = self.container(id)? {
                containers.push(container);
            }
        }
        Ok(containers)
    }

    pub fn create_container(&self, board_id: u64, title: &str) -> StoreResult<Container> {
        let container = (&self.boards, &self.containers, &self.meta).transaction(
            |(boards, containers, meta)| {
                let mut board: Board = tx_require(boards, "board", board_id)?;
                let container = Container {
                    id: tx_allocate(meta, 1)?,
                    board_id,
                    title: title.to_string(),
                    task_ids: vec![],
                };
                board.container_ids.push(container.id);
                tx_store(containers, container.id, &container)?;
                tx_store(boards, board_id, &board)?;
                Ok(container)
            },
        )?;
        Ok(container)
    }

    pub fn update_container(&self, id: u64, title: &str) -> StoreResult<Container> {
        let container = self.containers.transaction(|containers| {
            let mut container: Container = tx_require(containers, "container", id)?;
            container.title = title.to_string();
            tx_store(containers, id, &container)?;
            Ok(container)
        })?;
        Ok(container)
    }

    /// Removes the container and its tasks, and unlinks it from the board.
    pub fn delete_container(&self, id: u64) -> StoreResult<()> {
        (&self.boards, &self.containers, &self.tasks).transaction(|(boards, containers, tasks)| {
            let container = tx_remove_container(containers, tasks, id)?
                .ok_or_else(|| abort(StoreError::NotFound { kind: "container", id }))?;

            if let Some(mut board) = tx_load::<Board>(boards, container.board_id)? {
                board.container_ids.retain(|container_id| *container_id != id);
                tx_store(boards, board.id, &board)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    // --- Tasks ---

    pub fn task(&self, id: u64) -> StoreResult<Option<Task>> {
        load(&self.tasks, id)
    }

    /// Tasks of a container in container order. Empty if the container does not exist.
    pub fn list_tasks(&self, container_id: u64) -> StoreResult<Vec<Task>> {
        let Some(container) = self.container(container_id)? else {
            return Ok(vec![]);
        };
        let mut tasks = Vec::with_capacity(container.task_ids.len());
        for id in container.task_ids {
            if let Some(task) = self.task(id)? {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    pub fn create_task(
        &self,
        container_id: u64,
        title: &str,
        description: &str,
        completed: bool,
    ) -> StoreResult<Task> {
        let task = (&self.containers, &self.tasks, &self.meta).transaction(
            |(containers, tasks, meta)| {
                let mut container: Container = tx_require(containers, "container", container_id)?;
                let task = Task {
                    id: tx_allocate(meta, 1)?,
                    container_id,
                    title: title.to_string(),
                    description: description.to_string(),
                    completed,
                };
                container.task_ids.push(task.id);
                tx_store(tasks, task.id, &task)?;
                tx_store(containers, container_id, &container)?;
                Ok(task)
            },
        )?;
        Ok(task)
    }

    pub fn update_task(
        &self,
        id: u64,
        title: &str,
        description: &str,
        completed: bool,
    ) -> StoreResult<Task> {
        let task = self.tasks.transaction(|tasks| {
            let mut task: Task = tx_require(tasks, "task", id)?;
            task.title = title.to_string();
            task.description = description.to_string();
            task.completed = completed;
            tx_store(tasks, id, &task)?;
            Ok(task)
        })?;
        Ok(task)
    }

    pub fn delete_task(&self, id: u64) -> StoreResult<()> {
        (&self.containers, &self.tasks).transaction(|(containers, tasks)| {
            let task: Task = tx_require(tasks, "task", id)?;
            tasks.remove(key(id))?;

            if let Some(mut container) = tx_load::<Container>(containers, task.container_id)? {
                container.task_ids.retain(|task_id| *task_id != id);
                tx_store(containers, container.id, &container)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    // --- Snapshot replacement ---

    /// Replaces every container and task of `board_id` with the given drafts.
    ///
    /// Drafts must already be structurally valid (unique ids, tasks pointing at
    /// submitted containers). An id owned by a different board aborts the whole
    /// replacement with `ForeignId`.
    pub fn replace_board_contents(
        &self,
        board_id: u64,
        container_drafts: &[ContainerDraft],
        task_drafts: &[TaskDraft],
    ) -> StoreResult<()> {
        (&self.boards, &self.containers, &self.tasks, &self.meta).transaction(
            |(boards, containers, tasks, meta)| {
                let mut board: Board = tx_require(boards, "board", board_id)?;

                // Container phase: drop the board's current containers, then upsert the drafts.
                let mut previous = Vec::with_capacity(board.container_ids.len());
                for container_id in &board.container_ids {
                    if let Some(container) = tx_load::<Container>(containers, *container_id)? {
                        containers.remove(key(*container_id))?;
                        previous.push(container);
                    }
                }

                for draft in container_drafts {
                    if containers.get(key(draft.id))?.is_some() {
                        return Err(abort(StoreError::ForeignId { kind: "container", id: draft.id }));
                    }
                    let container = Container {
                        id: draft.id,
                        board_id,
                        title: draft.title.clone(),
                        task_ids: task_drafts
                            .iter()
                            .filter(|task| task.container_id == draft.id)
                            .map(|task| task.id)
                            .collect(),
                    };
                    tx_store(containers, draft.id, &container)?;
                    tx_bump_past(meta, draft.id)?;
                }
                board.container_ids = container_drafts.iter().map(|draft| draft.id).collect();
                tx_store(boards, board_id, &board)?;

                // Task phase: drop every task under the previous containers, then upsert.
                for container in &previous {
                    for task_id in &container.task_ids {
                        tasks.remove(key(*task_id))?;
                    }
                }

                for draft in task_drafts {
                    if tasks.get(key(draft.id))?.is_some() {
                        return Err(abort(StoreError::ForeignId { kind: "task", id: draft.id }));
                    }
                    let task = Task {
                        id: draft.id,
                        container_id: draft.container_id,
                        title: draft.title.clone(),
                        description: draft.description.clone(),
                        completed: draft.completed,
                    };
                    tx_store(tasks, draft.id, &task)?;
                    tx_bump_past(meta, draft.id)?;
                }
                Ok(())
            },
        )?;

        tracing::debug!(
            board_id,
            containers = container_drafts.len(),
            tasks = task_drafts.len(),
            "board contents replaced"
        );
        Ok(())
    }
}
