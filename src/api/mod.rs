pub(crate) mod admins;
pub(crate) mod analytics;
pub(crate) mod auth;
pub(crate) mod errors;
pub(crate) mod exam_sessions;
pub(crate) mod guards;
pub(crate) mod handlers;
pub(crate) mod live;
pub(crate) mod mock_tests;
pub(crate) mod pagination;
pub(crate) mod questions;
pub(crate) mod results;
pub(crate) mod router;
pub(crate) mod validation;
