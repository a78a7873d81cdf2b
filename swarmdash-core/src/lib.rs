mod config;
mod constants;
mod data;
mod events;
mod stats;

pub use config::*;
pub use constants::*;
pub use data::*;
pub use events::*;
pub use stats::*;
