use thiserror::Error;

/// Failures raised by the source instrumentation injector.
///
/// Both halt the pipeline before compilation: an uninstrumented build would
/// silently never produce a report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InjectError {
    /// The target source contains no entry function, so no report could
    /// ever be generated for it.
    #[error("no `fn main` entry point found in target source")]
    NoEntryPoint,
    /// An entry function exists but no top-level `return` statement anchors
    /// the report calls.
    #[error("entry function has no top-level `return` statement to instrument")]
    NoReturnInsertionPoint,
}
