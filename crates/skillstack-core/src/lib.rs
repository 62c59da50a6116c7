//! skillstack-core — Rule evaluation, skill accumulation, and the
//! simulation pipeline.
//!
//! This crate defines the fundamental data model, the restricted predicate
//! DSL, and the scoring engine that the rest of the skillstack system
//! builds on.

pub mod engine;
pub mod model;
pub mod pipeline;
pub mod predicate;
pub mod projection;
pub mod stack;
