//! Robots.txt handling module
//!
//! Obeying robots.txt is optional and off by default. When enabled, each
//! origin's robots.txt is fetched once per crawl run and disallowed requests
//! are skipped.

mod cache;
mod parser;

pub use cache::{fetch_robots, RobotsCache};
pub use parser::RobotsRules;
