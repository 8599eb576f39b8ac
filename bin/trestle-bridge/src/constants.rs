use std::time::Duration;

pub(crate) const DEFAULT_THREAD_COUNT: u8 = 4;

pub(crate) const DEFAULT_THREAD_STACK_SIZE: usize = 8 * 1024 * 1024;

pub(crate) const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(20);

/// File name of the sqlite database inside the datadir.
pub(crate) const DB_FILE: &str = "trestle.db";
