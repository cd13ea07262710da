//! Service providers.
//!
//! A provider wires one subsystem into the application in two steps:
//! `register` runs immediately when the provider is added (while the
//! application is still mutable), `boot` runs once, in registration order,
//! right before the first request is dispatched.

use crate::app::Application;
use crate::error::Error;

pub trait ServiceProvider: Send + Sync + 'static {
    /// Used in logs and in [`Error::Boot`].
    fn name(&self) -> &str;

    /// Binds services, middleware, routes. Called once, at registration.
    fn register(&self, _app: &mut Application) {}

    /// One-time initialization before the first dispatch. An error here is
    /// fatal: the dispatch that triggered the boot fails with
    /// [`Error::Boot`] and the application stays unbooted.
    fn boot(&self, _app: &Application) -> Result<(), Error> {
        Ok(())
    }
}
