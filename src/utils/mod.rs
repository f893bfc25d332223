//! Utility building blocks for cascade detection
//!
//! - Integral images (sum and squared-sum tables)
//! - Disjoint sets for clustering raw hits

pub mod integral;
pub mod union_find;
