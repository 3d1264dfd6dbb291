use chrono::{NaiveDate, Utc};

/// Calendar date used for `date_of_attempt`. Attempts are dated in UTC.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}
