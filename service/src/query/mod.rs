//! [`Query`] definition.

pub mod projects;

/// [`Query`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Query;

pub use self::projects::Search as SearchProjects;
