//! The kernel's compile-time ABI version, checked against every shared
//! dynamics library's `vle_api_level` symbol (§4.2, §6).

use serde::{Deserialize, Serialize};

/// Major/minor/patch of the dynamics ABI this kernel build implements.
///
/// A shared library is refused if `(major, minor)` differ; a patch-only
/// difference only warns (§4.2).
pub const ABI_MAJOR: u32 = 2;
pub const ABI_MINOR: u32 = 0;
pub const ABI_PATCH: u32 = 0;

/// The kind of factory a `(package, library)` pair resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DynamicsKind {
    Dynamics,
    Executive,
    DynamicsWrapper,
    Oov,
}

impl DynamicsKind {
    #[must_use]
    pub fn factory_symbol(self) -> &'static str {
        match self {
            DynamicsKind::Dynamics => "vle_make_new_dynamics",
            DynamicsKind::Executive => "vle_make_new_executive",
            DynamicsKind::DynamicsWrapper => "vle_make_new_dynamics_wrapper",
            DynamicsKind::Oov => "vle_make_new_oov",
        }
    }
}

/// A reference to a dynamics (or output plugin) binding: which package,
/// which library, and what kind was requested (possibly reclassified once
/// resolved — see [`super::loader::DynamicsLoader::resolve`]).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DynamicsRef {
    pub package: String,
    pub library: String,
    pub kind: DynamicsKind,
}

impl DynamicsRef {
    #[must_use]
    pub fn new(package: impl Into<String>, library: impl Into<String>, kind: DynamicsKind) -> Self {
        Self {
            package: package.into(),
            library: library.into(),
            kind,
        }
    }
}

/// Checks a library-reported version against this kernel's ABI.
///
/// Returns `Ok(())` if major/minor match (patch mismatches only warn at the
/// call site), `Err` otherwise.
#[must_use]
pub fn abi_compatible(major: u32, minor: u32) -> bool {
    major == ABI_MAJOR && minor == ABI_MINOR
}
