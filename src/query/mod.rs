//! Planning and execution of scans over the triples relation.
//!
//! The planner turns engine constraints into a compact [`plan::Plan`]; the cursor replays that
//! plan against the catalog, synthesizing one physical select per `(graph, target)` pair and
//! flattening the results into triples.

/// Candidate graphs and scan targets for one scan.
pub mod collect;

/// Lazy scan cursor and its lifecycle.
pub mod cursor;

/// Constraint planning and the integer plan encoding.
pub mod plan;

/// SQL synthesis for physical selects, including value decoding.
pub mod sql;

/// Owned prepared statement.
mod stmt;

pub use collect::{collect_graphs, KeyFilter, ScanTarget, Selector, SubjectFilter};
pub use cursor::{CursorHandle, ScanCursor, ScanPhase, ScanStats};
pub use plan::{ConstraintInput, ConstraintOp, KeyColumn, Plan, PlanOutput, TripleColumn};
