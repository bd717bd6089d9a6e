//! # Workflows Module
//!
//! High-level entry points that evaluate an entire `cms_schema` document.
//!
//! ## Overview
//!
//! A workflow takes a parsed [`Document`](crate::core::schema::Document), validates every step
//! and configuration against the potentials they name, loads each potential once, and then runs
//! the steps in order. Each step is marked successful or failed on the document itself, and
//! successful steps append their results records to every configuration.
//!
//! ## Architecture
//!
//! - **Compute Workflow** ([`compute`]) - Single-point ensemble evaluation and structure
//!   optimization of every configuration, with per-step failure recording.

pub mod compute;
