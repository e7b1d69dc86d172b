use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 11300;

pub const DEFAULT_JOB_PRIORITY: u32 = 1;
pub const DEFAULT_JOB_DELAY: Duration = Duration::from_secs(0);
pub const DEFAULT_JOB_TTR: Duration = Duration::from_secs(60);
pub const DEFAULT_KICK_BOUND: u32 = 10;

/// Default `max-job-size` of the server. Bodies of this size or larger are
/// rejected before they are sent.
pub const MAX_JOB_SIZE: usize = (1 << 16) - 1;

pub const MAX_TUBE_NAME_LEN: usize = 200;

/// Largest reply body accepted from the server (16 MB).
pub const MAX_REPLY_BODY_SIZE: usize = 16 * 1024 * 1024;

/// Longest status line accepted from the server, CRLF included.
pub const MAX_STATUS_LINE_LEN: usize = 1024;
