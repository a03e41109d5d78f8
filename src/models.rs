use serde::{Deserialize, Serialize};

/// Background assigned to new users and to boards created without one.
pub const DEFAULT_BACKGROUND: &str = "img-3.jpg";

/// Stored account record. Never returned over HTTP as-is (see `UserProfile`).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub background: String,
    pub boards: Vec<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Board {
    pub id: u64,
    pub user_id: u64,
    pub title: String,
    pub background: String,
    pub container_ids: Vec<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: u64,
    pub board_id: u64,
    pub title: String,
    pub task_ids: Vec<u64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: u64,
    pub container_id: u64,
    pub title: String,
    pub description: String,
    pub completed: bool,
}

/// Everything a user owns, as served by `/user-data`.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UserSnapshot {
    pub boards: Vec<Board>,
    pub containers: Vec<Container>,
    pub tasks: Vec<Task>,
    pub background: String,
}

/// JWT claims carried by bearer tokens.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Claims {
    pub sub: u64, // user id
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// The authenticated caller, resolved from the bearer token by the auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub user_id: u64,
}
