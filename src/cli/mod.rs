#![forbid(unsafe_code)]

//! Command implementations behind the `rdftab` binary.
//!
//! The binary only parses arguments and formats output; opening stores, loading
//! configuration, and running scans live here so they can be reused and tested.

/// Store setup, ad-hoc SQL, and triple scans.
pub mod commands;

pub use commands::{
    init_store, load_options, run_query, scan_triples, CliError, GraphAttachment, InitReport,
    QueryReport, Store, TripleFilter, TripleRow,
};
