pub mod question_loader;
pub mod reference_loader;
pub mod table_loader;

pub use question_loader::{load_questions, load_questions_from_path};
pub use reference_loader::{
    load_reference, load_reference_from_path, load_references_from_path, ReferenceLoad,
};
pub use table_loader::{load_table, Table};
