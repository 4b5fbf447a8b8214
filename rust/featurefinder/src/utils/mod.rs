pub mod constants;
pub mod lru;
pub mod math;
pub mod ranges;
pub mod rolling_calculators;

pub use lru::LruCache;
pub use ranges::{
    TupleRange,
    binary_search_range_by_f64_key,
};
