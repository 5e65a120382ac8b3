//! SQLite database support

pub mod init;

pub use init::init_database;
