//! Effects making up the chain.

pub mod delay;
pub mod eq;
pub mod mod_fx;
pub mod ring_buffer;
pub mod sample_rate_reducer;
pub mod stutter;
