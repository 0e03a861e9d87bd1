//! Storage backends implementing [`RecordSource`](crate::source::RecordSource).

pub mod continue_dir;
pub mod vscdb;

pub use continue_dir::ContinueDirSource;
pub use vscdb::VscdbSource;
