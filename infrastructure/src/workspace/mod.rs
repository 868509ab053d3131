//! Local filesystem project workspace

mod local;

pub use local::{LocalWorkspace, STATE_DIR};
