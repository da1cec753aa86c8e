//! Every launched run is recorded in a SQLite database in the working directory

/// Connect to a SQLite database
pub mod open;
/// Record runs and their outcomes, and read them back
pub mod run;
