//! Background sync daemon: post watcher + sync processor + socket server.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;

pub use error::DaemonError;
pub use protocol::{
    request_export, request_import, request_status, request_stop, send_request, DaemonRequest,
    DaemonResponse,
};
pub use runtime::{describe_export, describe_import, run, start_blocking, PostCache, SyncSummary};
