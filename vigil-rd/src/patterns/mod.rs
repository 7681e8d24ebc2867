//! Cultural / linguistic deflection pattern detection
//!
//! - `taxonomy`: versioned snapshots and the hot-reloadable store
//! - `matcher`: stateless exact + fuzzy matching
//! - `normalize`: shared text normalization

pub mod matcher;
pub mod normalize;
pub mod taxonomy;

pub use matcher::PatternMatcher;
pub use taxonomy::{PatternTaxonomyEntry, TaxonomyError, TaxonomySnapshot, TaxonomyStore};
