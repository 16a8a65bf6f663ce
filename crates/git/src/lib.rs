pub mod adapter;
pub mod cli;
pub mod error;

pub use adapter::GitWorktreeAdapter;
pub use cli::{GitCli, WorktreeEntry};
pub use error::GitAdapterError;
