//! Composition specs: validation, mount staging and the staged-spec slot.

mod mounts;
mod spec;
mod staging;

pub use mounts::{substitute_tokens, MountDescriptor, MountStager};
pub use spec::{CompositionSpec, SERVICES_KEY};
pub use staging::StagingArea;
