//! genefam - Gene-family profile curation and metagenomic quantification
//!
//! Curates a clean, length-consistent, low-gap set of family proteins from
//! a pangenome collection, builds a profile and a search database from it,
//! and counts family hits in metagenomic samples.
//!
//! # Modules
//! - `seqio`: FASTA reading/writing with gzip support
//! - `store`: record collections (load, subset, lengths)
//! - `retriever`: gene-token candidate retrieval
//! - `verify`: advisory reference-proteome cross-check
//! - `length`: N50-derived length band filter
//! - `alignment`: typed multiple sequence alignment
//! - `trim`: gap-fraction trimming
//! - `reconcile`: clean ids back to unaligned seeds
//! - `hits`: BLAST tabular hit parsing
//! - `tools`: external aligner, profile builder, search engine
//! - `quantify`: per-sample hit counting and results tables
//! - `config`: curation parameters and family manifests
//! - `pipeline`: per-family curation driver
//! - `error`: error taxonomy

pub mod alignment;
pub mod config;
pub mod error;
pub mod hits;
pub mod length;
pub mod pipeline;
pub mod quantify;
pub mod reconcile;
pub mod retriever;
pub mod seqio;
pub mod store;
pub mod tools;
pub mod trim;
pub mod verify;

pub use error::{CurationError, DataQualityWarning};
