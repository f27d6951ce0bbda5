//! # Thread server HTTP API
//!
//! REST and SSE endpoints through which browsers drive long-lived
//! conversation threads:
//!
//! - **GET** `/api/projects/{p}/threads/{t}/event-stream`: attach a tab to
//!   the thread's live event stream
//! - **POST** `/api/projects/{p}/threads/{t}/messages`: send an answer or
//!   OAuth callback into the running agent
//! - **GET/DELETE** `.../messages[/{id}]`: history listing and truncation
//! - **POST** `.../stop`: halt the current turn
//! - **POST** `.../upload`: inject an image into the conversation
//!
//! Identity comes from the `x-forwarded-email` header set by a trusted
//! reverse proxy, falling back to the local OS user (system accounts
//! refused). Every thread operation is ownership-checked against the
//! thread's owner.

pub mod images;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod types;

pub use server::{AppState, ThreadServer};
pub use types::*;
