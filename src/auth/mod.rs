//! Bearer-token authentication. Tokens carry the assessor id in `sub`.

pub mod jwt;
pub mod middleware;
pub mod model;

pub use jwt::*;
pub use middleware::*;
pub use model::*;
