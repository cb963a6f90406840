pub mod dto;
mod pipelines;
pub mod response;
mod router;

pub use router::{AppState, create_router};
