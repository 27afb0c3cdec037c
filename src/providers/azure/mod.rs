pub mod build_source;
pub mod build_test_info;
pub mod client;
pub mod collector;
#[cfg(test)]
pub(crate) mod fake;
pub mod helix;
pub mod types;
pub mod url_utils;
