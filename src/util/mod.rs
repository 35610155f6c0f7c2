pub mod atomic;
pub mod vec2;
