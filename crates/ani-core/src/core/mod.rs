//! # Core Module
//!
//! Fundamental building blocks shared by the compute engine.
//!
//! - **Schema Documents** ([`schema`]) - The `cms_schema` document model, its header-plus-JSON
//!   file layout, and the compact pretty-printer used to write it back out
//! - **Potentials** ([`ani`]) - Atomic environment vectors, per-species networks, ensembles of
//!   sub-models, the closed set of published parameterizations, and model file loading
//! - **Elements** ([`elements`]) - Element symbol lookups
//! - **Devices** ([`device`]) - Run-wide compute device selection

pub mod ani;
pub mod device;
pub mod elements;
pub mod schema;
