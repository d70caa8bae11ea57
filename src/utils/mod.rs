pub mod cancel;
pub mod config;
pub mod fd_limit;
pub mod log_file;
pub mod logger;
pub mod settings;

pub use cancel::{CancelToken, install_ctrlc_handler};
pub use config::*;
pub use fd_limit::{fds_per_item, max_open_fds, max_workers_by_fd_limit};
pub use log_file::{read_log, write_log};
pub use logger::{setup_logging, verbose_from};
pub use settings::{PipelineSettings, load_settings};
