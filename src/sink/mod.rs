//! Destinations for recorded samples: the data vault and the status database.

use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

pub mod database;
pub mod datavault;

pub use database::{MemoryStatusStore, MySqlStatusStore, StatusRow, StatusStore};
pub use datavault::{DataLog, DatasetSpec, MemoryDataLog, RemoteDataVault};

/// "2024-03-01 17:05:09", used for dataset names.
pub const DATESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// "20240301170509", the database timestamp column.
pub const COMPACT_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day][hour][minute][second]");

/// Wall-clock time in the local zone, or UTC when the offset is unknown.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

pub fn format_local(datetime: OffsetDateTime, format: &[BorrowedFormatItem<'_>]) -> String {
    datetime
        .format(format)
        .unwrap_or_else(|_| datetime.unix_timestamp().to_string())
}
