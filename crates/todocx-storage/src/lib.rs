pub mod text_file;

pub use text_file::{resolve_unique_path, save_text_file, PersistenceError, SavedFile};
