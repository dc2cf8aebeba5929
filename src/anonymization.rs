//! Offline UUID anonymization of recorded session logs.
//!
//! Every distinct UUID in a log is replaced by a stable stand-in for the
//! whole run, so records that referred to the same conversation or request
//! still do after anonymization.

pub mod jsonl;
pub mod uuid_mapper;

pub use jsonl::{anonymize_file, anonymize_in_place, default_output_path, LineSummary};
pub use uuid_mapper::UuidMapper;
