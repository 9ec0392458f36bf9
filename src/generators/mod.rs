//! Workload generators: sample keys and templated values.

pub mod key;
pub mod value;

pub use key::{generate_keys, render_key, worker_rng};
pub use value::Template;
