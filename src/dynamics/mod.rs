//! The dynamics loader (§4.2): resolves a `(package, library, kind)`
//! reference to a factory producing an atomic-model behaviour.

mod abi;
mod loader;

pub use abi::{abi_compatible, DynamicsKind, DynamicsRef, ABI_MAJOR, ABI_MINOR, ABI_PATCH};
pub use loader::{DynamicsLoader, OutputFactory, Resolved, StaticFactory};
