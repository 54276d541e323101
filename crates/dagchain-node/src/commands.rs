pub mod export_blocks;
pub mod import_blocks;
pub mod info;
