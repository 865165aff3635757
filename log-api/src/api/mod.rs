pub mod healthcheck;
pub mod logs;
pub mod utils;
pub mod versions;
