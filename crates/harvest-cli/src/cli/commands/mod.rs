//! CLI command handlers, one file per command.

mod crawl;
mod delete;
mod download;
mod enqueue;
mod pause;
mod remove;
mod restart;
mod resume;
mod status;

pub use crawl::run_crawl;
pub use delete::run_delete;
pub use download::run_download;
pub use enqueue::run_enqueue;
pub use pause::run_pause;
pub use remove::run_remove;
pub use restart::run_restart;
pub use resume::run_resume;
pub use status::run_status;
