pub mod catalog;
pub mod config;
pub mod dates;
pub mod db;
pub mod error;
pub mod importer;
pub mod ipc;
pub mod ledger;
pub mod roster;
pub mod session;
