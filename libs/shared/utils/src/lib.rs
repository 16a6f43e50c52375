pub mod extractor;
pub mod jwt;
pub mod secret;
pub mod test_utils;
