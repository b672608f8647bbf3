//! URL handling module
//!
//! This module provides URL canonicalization, host extraction and
//! domain-entry matching used by the link matchers and the scheduler.

mod domain;
mod matcher;
mod normalize;

pub use domain::extract_domain;
pub use matcher::{matches_any_domain, matches_domain};
pub use normalize::{canonicalize, canonicalize_url};
