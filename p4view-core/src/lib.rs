mod status;
mod tree;
mod version;

pub use status::{
    BlockParser, ParseError, ReadError, STATUS_FIELDS, StatusRecord, StatusRecords, parse_block,
};
pub use tree::VersionTree;
pub use version::{Action, ItemVersion, classify};
