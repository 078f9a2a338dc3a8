//! Public face of the crate: the application's [`NotifierTarget`], the
//! [`NotifierBuilder`] and the running [`GlobalNotifier`] handle.

mod builder;
mod notifier;
mod target;

pub use builder::*;
pub use notifier::*;
pub use target::*;
