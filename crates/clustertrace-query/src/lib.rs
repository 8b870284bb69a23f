//! Query Executor and Filter Engine (§4.5, §4.6): range+predicate reads
//! across storage files and the pipeline's live buffer, merging true events
//! with synthetic state-snapshot events for resources that have none in the
//! query window.

pub mod executor;
pub mod filter;
