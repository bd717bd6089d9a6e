//! # Engine Module
//!
//! The computational core of the driver: everything between a parsed document and the results
//! records written back into it.
//!
//! ## Overview
//!
//! Workflow steps are first validated into [`plan::StepPlan`]s so that unknown names and
//! unsupported configurations are rejected before any potential is evaluated. Configurations
//! are then packed into a padded [`batch::Batch`] and either evaluated with every selected
//! ensemble member ([`single_point`]) or relaxed by one of the structure minimizers
//! ([`optimize`]).
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Run-wide settings such as the model directory and device
//! - **Planning** ([`plan`]) - Step validation, result kinds, and sub-model selection
//! - **Batching** ([`batch`]) - Fixed-width species and coordinate rows
//! - **Single Points** ([`single_point`]) - Ensemble energies and gradients with statistics
//! - **Statistics** ([`statistics`]) - Means and population standard deviations
//! - **Optimization** ([`optimize`]) - Calculators, minimizers, and the convergence loop
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Configuration, compute, and umbrella engine errors

pub mod batch;
pub mod config;
pub mod error;
pub mod optimize;
pub mod plan;
pub mod progress;
pub mod single_point;
pub mod statistics;
