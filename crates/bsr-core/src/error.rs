//! The error kinds surfaced by the core data model.
//!
//! Higher layers (`bsr-registry`, `bsr-dispatch`) define their own error
//! enums and convert into or wrap these via `#[from]`.

use thiserror::Error;

/// Errors produced while constructing or querying the core data model.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A plan or config referenced a device name/number that does not
    /// resolve in the registry.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// A plan row failed canonicalization (bad device/action/id-type token,
    /// or an unparsable `Values` cell).
    #[error("malformed row: {0}")]
    MalformedRow(String),

    /// An unsatisfiable policy combination or missing required config field.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// A plan action targeted a branch/transformer owned by the Generator
    /// Lifecycle.
    #[error("{device} is owned by the generator lifecycle for {generator}")]
    GeneratorOwned { device: String, generator: String },
}

/// Convenience alias for results returning [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_device_name() {
        let err = CoreError::UnknownDevice("GEN99".into());
        assert!(err.to_string().contains("GEN99"));
    }

    #[test]
    fn generator_owned_names_both_parties() {
        let err = CoreError::GeneratorOwned {
            device: "BRN-7".into(),
            generator: "GEN2".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("BRN-7"));
        assert!(msg.contains("GEN2"));
    }
}
