//! BundleScope - static analysis for webpack bundle modules
//!
//! This crate recovers export maps and import usages from minified webpack
//! modules, indexes a whole module corpus into an inverse dependency graph,
//! and resolves every reference to an export across the corpus.

pub mod analysis;
pub mod cache;
pub mod graph;
pub mod parser;
pub mod resolve;
