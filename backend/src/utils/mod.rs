pub mod csv;
pub mod jwt;

pub use jwt::*;
