//! Command-level tests

mod test_estimate;
mod test_reshape;
