#![warn(clippy::pedantic)]
// Noisy doc/signature lints that would require annotating every pub function
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Intentional casts for counts, similarity scores and timeouts
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod gateway;
pub mod knowledge;
pub mod persona;
pub mod store;
pub(crate) mod utils;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
