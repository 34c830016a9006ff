//! SQLite database driver implementation

mod connection;
mod driver;
mod statement;

pub use connection::{SqliteCancelHandle, SqliteConnection};
pub use driver::SqliteDriver;
pub use statement::SqliteStatement;

#[cfg(test)]
mod tests;
