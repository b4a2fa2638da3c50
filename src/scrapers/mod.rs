//! Article extraction tiers.
//!
//! Every resolved link goes through tier-1; a bounded, gate-selected subset
//! is then re-extracted through tier-2.
//!
//! # Modules
//!
//! | Module | Role | Network |
//! |--------|------|---------|
//! | [`extract`] | Pure field chains over parsed HTML | none |
//! | [`simple`] | Tier-1: one paced fetch per article | publisher page |
//! | [`robots`] | Crawl-policy parsing and per-host cache | `robots.txt` |
//! | [`advanced`] | Tier-2: paid rendering service + monotonic merge | enrichment API |
//!
//! # Common Patterns
//!
//! - Stages are generic over [`crate::http::Fetch`] so tests run against
//!   in-memory pages.
//! - Every outbound call first waits on the shared [`crate::pacing::Pacer`].
//! - Failures are logged and folded into the record, never propagated.

pub mod advanced;
pub mod extract;
pub mod robots;
pub mod simple;
