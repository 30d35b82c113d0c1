mod client;
mod status;

pub use client::{Client, ClientError, DEFAULT_SERVER};
pub use status::{print_status, print_sync_results};
