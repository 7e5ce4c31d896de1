//! Common utilities for the railnet toolkit

pub mod error;

pub use error::{Error, Result};

#[cfg(test)]
mod tests {
    use crate::error::Error;

    #[test]
    fn invalid_input_message_names_the_defect() {
        let err = Error::InvalidInput("segment 3 has a NaN coordinate".to_string());
        assert_eq!(
            err.to_string(),
            "Invalid input: segment 3 has a NaN coordinate"
        );
    }
}
