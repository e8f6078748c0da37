mod checksum;
mod tree;

pub use checksum::{sha256_file, sha256_hex, sha256_reader, verify_sha256_file};
pub use tree::{sha256_tree, tree_stats, TreeStats};
