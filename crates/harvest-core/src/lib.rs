pub mod config;
pub mod logging;

pub mod checkpoint;
pub mod control;
pub mod crawl;
pub mod path_template;
pub mod progress;
pub mod queue;
pub mod services;
