pub mod config;
pub mod error;
pub mod index;
pub mod owner;
pub mod types;

pub use config::OperatorConfig;
pub use error::{Error, Result};
pub use index::{IndexWriter, OwnershipIndex};
pub use owner::{controlled_by, controller_of, match_controller, owner_reference, OwnerMatch};
pub use types::{BackoffPolicy, ObjectKey, Outcome};
