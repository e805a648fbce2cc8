//! [`Handler`] abstractions.

use std::future::Future;

/// Executable handler of `Args`.
///
/// Databases, queries, language models and tools are all [`Handler`]s of
/// their own operations, so any of them may be substituted by another
/// implementation handling the same operation.
pub trait Handler<Args = ()> {
    /// Type of successful [`Handler`] result.
    type Ok;

    /// Type of this [`Handler`] error.
    type Err;

    /// Executes this [`Handler`] with the provided arguments.
    ///
    /// Returned [`Future`] is [`Send`], so the execution may be moved onto
    /// another runtime thread (for example, to stream a chat turn).
    fn execute(
        &self,
        args: Args,
    ) -> impl Future<Output = Result<Self::Ok, Self::Err>> + Send;
}
