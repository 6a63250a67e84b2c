//! Application services: session lifecycle, text reduction and crawl orchestration.

pub mod backend;
pub mod crawl;
pub mod error;
pub mod reduce;
pub mod session;
