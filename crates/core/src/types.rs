/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Progress percentages are stored as SMALLINT in the range 0..=100.
pub type Percent = i16;
