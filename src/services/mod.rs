pub mod answer_service;
pub mod attempt_service;
pub mod draft_service;
pub mod snapshot_service;
pub mod test_service;
