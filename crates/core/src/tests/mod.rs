//! Test harnesses shared with downstream store implementations
