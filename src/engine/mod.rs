//! Engine: directory resolution, input listing, pairing and dispatch.

pub mod command;
pub mod dispatch;
pub mod lister;
pub mod pairing;
pub mod paths;

// Re-export commonly used items
pub use command::CommandTransform;
pub use dispatch::{DispatchResult, Dispatcher, Transform, effective_workers};
pub use lister::{ListingFilter, list_dir, list_inputs};
pub use pairing::{ArgIter, ArgumentGenerator, PairingFn, PairingStrategy};
pub use paths::{glob_match, resolve_dir, resolve_dirs};
