use thiserror::Error;

use crate::parse::ParseError;
use crate::registry::RegistryError;
use crate::CompileError;

/// Unified error type covering parsing, compilation, field loading and I/O.
///
/// Returned by convenience functions like [`compile_script()`](crate::compile_script)
/// and [`compile_file()`](crate::compile_file).
#[derive(Debug, Error)]
pub enum RulescriptError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Serialize(#[from] crate::serial::SerializeError),

    #[cfg(feature = "binary-cache")]
    #[error(transparent)]
    Deserialize(#[from] crate::serial::DeserializeError),
}
