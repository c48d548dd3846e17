pub mod collector;
pub mod enrichment;
pub mod export;
pub mod extractor;
pub mod feed;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

#[cfg(test)]
mod collector_tests;
#[cfg(test)]
mod enrichment_tests;
#[cfg(test)]
mod extractor_tests;
