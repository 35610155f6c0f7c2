//! Hammer Engine Core
//!
//! Frame-oriented execution core for a 2D game engine: a fixed worker pool
//! behind a thread system, an adaptive worker budget that decides per
//! subsystem whether and how to parallelize, and an AI manager that drives
//! per-entity behaviors through both.
//!
//! [`engine::EngineCore`] wires the three together.

pub mod ai;
pub mod config;
pub mod constants;
pub mod core;
pub mod engine;
pub mod entity;
pub mod metrics;
pub mod util;
