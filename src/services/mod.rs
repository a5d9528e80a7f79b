pub(crate) mod ai_extraction;
pub(crate) mod analytics;
pub(crate) mod attempt_finalize;
pub(crate) mod attempt_policy;
pub(crate) mod change_feed;
pub(crate) mod dedup;
pub(crate) mod exam_engine;
pub(crate) mod portal;
pub(crate) mod question_import;
pub(crate) mod scoring;
