//! Atomic wrappers for float state shared across worker threads
//!
//! All accesses use relaxed ordering: values are independent tuning or
//! kinematic samples and frame boundaries provide the synchronization.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use super::vec2::Vec2;

/// `f32` stored as its bit pattern
#[derive(Debug, Default)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// `f64` stored as its bit pattern
#[derive(Debug, Default)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

/// Lock-free `Vec2`: both components packed into one 64-bit word so a
/// reader never observes a torn x/y pair.
#[derive(Debug, Default)]
pub struct AtomicVec2(AtomicU64);

impl AtomicVec2 {
    pub fn new(value: Vec2) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    #[inline]
    pub fn load(&self) -> Vec2 {
        Vec2::from_bits(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn store(&self, value: Vec2) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}
