pub mod compare;
pub mod models;
pub mod parser;

pub use compare::build_file_patch;
pub use models::{DiffStats, ParsedFile, ParsedHunk};
pub use parser::{normalize_diff_path, parse_patch_files, ParsedPatch};
