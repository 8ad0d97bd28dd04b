pub mod compiler;
pub mod config;
pub mod error;
pub mod profile;
pub mod query;
pub mod traits;
pub mod types;

pub use compiler::{build_request, compile, CompiledQuery};
pub use error::{Error, Result};
pub use profile::{BackendProfile, Category, RankingFormula};
pub use traits::IndexEngine;
