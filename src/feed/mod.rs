//! Sectioned announcement feed: store, composer, reconciler, selection and
//! traversal controllers, and the engine that ties them together.

pub mod backend;
pub mod compose;
pub mod engine;
pub mod events;
pub mod fixture;
pub mod model;
pub mod reconcile;
pub mod runtime;
pub mod selection;
pub mod store;
pub mod traversal;

#[cfg(test)]
mod test_properties;
