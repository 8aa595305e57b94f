//! Integrations that rely on third-party services.
//!
//! Adapters here only talk to the outside world; turning their answers into
//! bypass results is left to the strategies built on top of them.

pub mod flaresolverr;

pub use flaresolverr::{
    FlareSolverrClient, FlareSolverrCookie, FlareSolverrError, FlareSolverrResponse,
    FlareSolverrSolution,
};
