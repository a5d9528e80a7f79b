pub(crate) mod exam_results;
pub(crate) mod exam_sessions;
pub(crate) mod questions;
pub(crate) mod users;

use thiserror::Error;

use crate::db::decode::DecodeError;

/// Failure loading a document-backed entity: either the query or the decode failed.
#[derive(Debug, Error)]
pub(crate) enum StoreError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
