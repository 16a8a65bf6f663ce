pub mod error;
pub mod protocol;
pub mod session;

pub use error::AttachError;
pub use protocol::{ClientFrame, ServerFrame};
pub use session::{attach, run_session};
