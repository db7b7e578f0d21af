//! CLI command handlers, one file per command.

mod checksum;
mod get;
mod inspect;
mod sync;

pub use checksum::run_checksum;
pub use get::run_get;
pub use inspect::run_inspect;
pub use sync::run_sync;
