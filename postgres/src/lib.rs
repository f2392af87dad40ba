//! Postgres access for the historized order table and the staging table.

pub mod db;
pub mod migrations;
pub mod orders;
pub mod staging;
#[cfg(feature = "test-utils")]
pub mod test_utils;
