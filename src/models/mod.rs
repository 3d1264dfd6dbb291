pub mod answer;
pub mod attempt_version;
pub mod draft;
pub mod question;
pub mod test;
pub mod test_attempt;
