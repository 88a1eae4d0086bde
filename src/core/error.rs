use crate::{core::provider::OperationMode, prelude::*};

/// How a failed planning cycle must be handled.
///
/// Transient variants abort the cycle and retry after a back-off with fresh
/// data; nothing stale is ever reused. A mode mismatch is fatal for the cycle:
/// the loop must not assume any charging took place.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum CycleError {
    #[display("a data provider is unavailable: {_0:#}")]
    ProviderUnavailable(#[error(not(source))] Error),

    #[display("the inverter is unreachable: {_0:#}")]
    InverterUnreachable(#[error(not(source))] Error),

    /// The inverter did not reflect the commanded mode on read-back.
    #[display("commanded the {commanded} mode, but the inverter reports {actual}")]
    ModeMismatch { commanded: OperationMode, actual: OperationMode },
}
