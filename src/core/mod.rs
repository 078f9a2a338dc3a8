mod admin_watcher;
mod control_loop;
mod event;
mod pipeline;
mod registry;

pub(crate) use admin_watcher::*;
pub(crate) use control_loop::*;
pub(crate) use event::*;
pub(crate) use pipeline::*;
pub(crate) use registry::*;

#[cfg(test)]
mod admin_watcher_test;
