//! EcoliTyper - Unified MLST + Serotyping + Clermont Phylotyping
//!
//! Orchestrates three pre-existing genome-typing tools over bacterial genome
//! assemblies and merges their per-sample outputs into synchronized TSV
//! tables and JSON records. The typing algorithms themselves (allele calling,
//! BLAST search, PCR simulation) live in the external tools; this crate is a
//! coordination and result-normalization layer.
//!
//! # Modules
//! - `runner`: subprocess execution with output capture, timeout, and retry
//! - `locate`: tool/database path resolution across install layouts
//! - `record`: normalized per-sample and per-run result records
//! - `mlst`: MLST adapter (scheme, sequence type, allele profile)
//! - `serotype`: SerotypeFinder adapter (O/H antigen types)
//! - `clermont`: ezclermont adapter (Clermont phylogroup)
//! - `pipeline`: per-sample fan-out to the three adapters

pub mod clermont;
pub mod locate;
pub mod mlst;
pub mod pipeline;
pub mod record;
pub mod runner;
pub mod serotype;
