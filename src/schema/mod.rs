pub mod appendix;
pub mod templates;
pub mod types;

pub use appendix::AppendixIndex;
pub use templates::TemplateStore;
pub use types::{normalize_sequence, TableDescriptor};
