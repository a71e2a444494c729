pub mod atomic;
pub mod database;

pub use atomic::{temp_path, write_atomic};
pub use database::{Database, PoolConfig, SharedDatabase};
