//! Core domain entities.
//!
//! - [`ShortUrl`] - A declared short URL resource (spec + observed status)
//! - [`ShortUrlSpec`] / [`ShortUrlStatus`] - Its desired and observed halves
//! - [`ResourceId`] - Resource identity used by the store and the controller

pub mod short_url;

pub use short_url::{ResourceId, ShortUrl, ShortUrlSpec, ShortUrlStatus};
