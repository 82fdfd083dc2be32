pub mod models;
pub mod pool;
pub mod queries;

// Discord snowflakes fit in 63 bits; SQLite integers are signed.
pub(crate) fn to_db_id(id: u64) -> i64 {
    id as i64
}

pub(crate) fn from_db_id(id: i64) -> u64 {
    id as u64
}
