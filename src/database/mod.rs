// Database module
// SQLite-backed relational store for items, likes, and recommendation output

pub mod sqlite;

pub use sqlite::*;
