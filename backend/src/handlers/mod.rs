pub mod activities;
pub mod admin;
pub mod integrations;
pub mod policies;

pub use activities::*;
pub use admin::*;
pub use integrations::*;
pub use policies::*;
