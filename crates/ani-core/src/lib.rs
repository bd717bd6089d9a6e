//! # SEAMM ANI Core Library
//!
//! Evaluates pretrained ANI neural-network interatomic potentials on the systems of a
//! MolSSI `cms_schema` workflow document, and writes the results back into the document.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer layout:
//!
//! - **[`core`]: The Foundation.** The schema document model and its compact JSON codec,
//!   element data, device selection, and the ANI potential itself (atomic environment
//!   vectors, per-species networks, ensembles, and model files).
//!
//! - **[`engine`]: The Logic Core.** Validation of workflow steps into execution plans,
//!   single-point ensemble evaluation with statistics, and the family of structure
//!   minimizers together with the calculator that drives them.
//!
//! - **[`workflows`]: The Public API.** Runs every step of a document in order, records
//!   success or failure on each step, and appends results to each configuration.

pub mod core;
pub mod engine;
pub mod workflows;
