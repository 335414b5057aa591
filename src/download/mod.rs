pub mod client;
pub mod collector;
pub mod fetcher;
pub mod pattern;
pub mod session;

#[cfg(test)]
pub(crate) mod mock;
