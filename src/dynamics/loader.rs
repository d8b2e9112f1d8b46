//! Resolves a [`DynamicsRef`] to a factory producing a behaviour (§4.2).
//!
//! Two resolution modes coexist: a shared-library mode (`dlopen`/`dlsym`
//! via [`libloading`]) and a static registration mode, for embedded/test
//! use where the kernel and the atomic models are linked together.

use fxhash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::abi::{abi_compatible, DynamicsKind, DynamicsRef, ABI_MAJOR, ABI_MINOR, ABI_PATCH};
use crate::error::DynamicsError;
use crate::observation::OutputPlugin;
use crate::simulator::Dynamics;

/// A factory producing a fresh behaviour instance. Boxed so both
/// resolution modes can share one call surface.
pub type StaticFactory = Arc<dyn Fn() -> Box<dyn Dynamics> + Send + Sync>;

/// A factory producing a fresh output-plugin instance (§4.2's `Oov` kind
/// resolves here rather than through [`StaticFactory`] — an output plugin
/// implements [`OutputPlugin`], not [`Dynamics`]).
pub type OutputFactory = Arc<dyn Fn() -> Box<dyn OutputPlugin> + Send + Sync>;

// NOTE: returning `Box<dyn Dynamics>` across a `dlopen` boundary assumes the
// plugin was built against the same `vle` crate version and toolchain as
// this kernel (the fat-pointer layout of `dyn Dynamics` is not part of any
// stable ABI). This mirrors how the original's plugins are built against
// the exact headers of the `vle` library they're loaded into.
#[cfg(feature = "dynlib")]
type SharedLibFactorySymbol = unsafe extern "C" fn() -> Box<dyn Dynamics>;

#[cfg(feature = "dynlib")]
type OovFactorySymbol = unsafe extern "C" fn() -> Box<dyn OutputPlugin>;

#[cfg(feature = "dynlib")]
type VersionSymbol = unsafe extern "C" fn(*mut u32, *mut u32, *mut u32);

/// The outcome of resolving a [`DynamicsRef`]: the factory to call, plus
/// the kind actually found (a generic request may be reclassified once the
/// first matching factory symbol is found, per §4.2).
pub struct Resolved {
    pub kind: DynamicsKind,
    pub factory: StaticFactory,
}

/// Resolves dynamics/output-plugin references to factories, caching opened
/// shared-library handles by absolute path.
pub struct DynamicsLoader {
    pkgs_root: PathBuf,
    static_registry: FxHashMap<String, (DynamicsKind, StaticFactory)>,
    output_static_registry: FxHashMap<String, OutputFactory>,
    #[cfg(feature = "dynlib")]
    handles: FxHashMap<PathBuf, Arc<libloading::Library>>,
}

impl DynamicsLoader {
    #[must_use]
    pub fn new(pkgs_root: impl Into<PathBuf>) -> Self {
        Self {
            pkgs_root: pkgs_root.into(),
            static_registry: FxHashMap::default(),
            output_static_registry: FxHashMap::default(),
            #[cfg(feature = "dynlib")]
            handles: FxHashMap::default(),
        }
    }

    /// Registers a factory under `name` for static (embedded) resolution.
    pub fn register_static(
        &mut self,
        name: impl Into<String>,
        kind: DynamicsKind,
        factory: impl Fn() -> Box<dyn Dynamics> + Send + Sync + 'static,
    ) {
        self.static_registry.insert(name.into(), (kind, Arc::new(factory)));
    }

    /// Registers an output-plugin factory under `name` for static (embedded)
    /// resolution.
    pub fn register_static_output(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> Box<dyn OutputPlugin> + Send + Sync + 'static,
    ) {
        self.output_static_registry.insert(name.into(), Arc::new(factory));
    }

    fn library_path(&self, package: &str, library: &str, kind: DynamicsKind) -> PathBuf {
        let subdir = if kind == DynamicsKind::Oov { "output" } else { "simulator" };
        let filename = format!("lib{library}.{}", std::env::consts::DLL_EXTENSION);
        self.pkgs_root.join(package).join("plugins").join(subdir).join(filename)
    }

    /// Resolves `reference` to a callable factory.
    ///
    /// Static registration is tried first (by `library` name); if absent
    /// and the `dynlib` feature is enabled, falls back to opening the
    /// corresponding shared library under `pkgs_root`.
    pub fn resolve(&mut self, reference: &DynamicsRef) -> Result<Resolved, DynamicsError> {
        if let Some((kind, factory)) = self.static_registry.get(&reference.library) {
            return Ok(Resolved {
                kind: *kind,
                factory: factory.clone(),
            });
        }

        #[cfg(feature = "dynlib")]
        {
            return self.resolve_shared(reference);
        }

        #[cfg(not(feature = "dynlib"))]
        {
            Err(DynamicsError::UnknownStaticName {
                name: reference.library.clone(),
            })
        }
    }

    /// Resolves an `Oov` reference to a callable output-plugin factory.
    /// Static registration is tried first, then a shared-library lookup
    /// under `pkgs_root`'s `plugins/output` subdirectory (§4.2, §6).
    pub fn resolve_output(&mut self, reference: &DynamicsRef) -> Result<Box<dyn OutputPlugin>, DynamicsError> {
        if let Some(factory) = self.output_static_registry.get(&reference.library) {
            return Ok(factory());
        }

        #[cfg(feature = "dynlib")]
        {
            return self.resolve_shared_output(reference);
        }

        #[cfg(not(feature = "dynlib"))]
        {
            Err(DynamicsError::UnknownStaticName {
                name: reference.library.clone(),
            })
        }
    }

    #[cfg(feature = "dynlib")]
    fn resolve_shared_output(&mut self, reference: &DynamicsRef) -> Result<Box<dyn OutputPlugin>, DynamicsError> {
        let path = self.library_path(&reference.package, &reference.library, DynamicsKind::Oov);
        let lib = self.open(&path, &reference.package, &reference.library)?;

        let version: libloading::Symbol<VersionSymbol> = unsafe {
            lib.get(b"vle_api_level\0").map_err(|_| DynamicsError::MissingVersionSymbol {
                path: path.display().to_string(),
            })?
        };
        let (mut major, mut minor, mut patch) = (0u32, 0u32, 0u32);
        unsafe { version(&mut major, &mut minor, &mut patch) };
        if !abi_compatible(major, minor) {
            return Err(DynamicsError::AbiMismatch {
                expected: (ABI_MAJOR, ABI_MINOR),
                found: (major, minor),
            });
        }
        if patch != ABI_PATCH {
            tracing::warn!(path = %path.display(), found_patch = patch, expected_patch = ABI_PATCH, "output plugin library patch version differs");
        }

        // SAFETY: see `resolve_shared`'s note on `SharedLibFactorySymbol`.
        let symbol: libloading::Symbol<OovFactorySymbol> = unsafe {
            lib.get(DynamicsKind::Oov.factory_symbol().as_bytes())
                .map_err(|_| DynamicsError::MissingFactorySymbol {
                    path: path.display().to_string(),
                    kind: DynamicsKind::Oov.factory_symbol().to_string(),
                })?
        };
        let raw_factory = *symbol;
        // SAFETY: see `resolve_shared`'s note on `SharedLibFactorySymbol`.
        Ok(unsafe { raw_factory() })
    }

    #[cfg(feature = "dynlib")]
    fn resolve_shared(&mut self, reference: &DynamicsRef) -> Result<Resolved, DynamicsError> {
        let path = self.library_path(&reference.package, &reference.library, reference.kind);
        let lib = self.open(&path, &reference.package, &reference.library)?;

        // SAFETY: `vle_api_level` is mandated by the ABI contract (§6);
        // the caller of this loader is trusted to only point it at real
        // VLE dynamics libraries.
        let version: libloading::Symbol<VersionSymbol> = unsafe {
            lib.get(b"vle_api_level\0").map_err(|_| DynamicsError::MissingVersionSymbol {
                path: path.display().to_string(),
            })?
        };
        let (mut major, mut minor, mut patch) = (0u32, 0u32, 0u32);
        unsafe { version(&mut major, &mut minor, &mut patch) };
        if !abi_compatible(major, minor) {
            return Err(DynamicsError::AbiMismatch {
                expected: (ABI_MAJOR, ABI_MINOR),
                found: (major, minor),
            });
        }
        if patch != ABI_PATCH {
            tracing::warn!(path = %path.display(), found_patch = patch, expected_patch = ABI_PATCH, "dynamics library patch version differs");
        }

        // The first matching factory symbol wins; a generic request is
        // reclassified to whichever kind was actually found. `Oov` resolves
        // through `resolve_output` instead, since it produces an
        // `OutputPlugin`, not a `Dynamics`.
        if reference.kind == DynamicsKind::Oov {
            return Err(DynamicsError::UnknownStaticName {
                name: reference.library.clone(),
            });
        }
        let kinds_to_try = vec![DynamicsKind::Dynamics, DynamicsKind::Executive, DynamicsKind::DynamicsWrapper];

        for kind in kinds_to_try {
            let symbol = kind.factory_symbol();
            // SAFETY: see above; symbol name comes from the ABI contract.
            let found: Result<libloading::Symbol<SharedLibFactorySymbol>, _> =
                unsafe { lib.get(symbol.as_bytes()) };
            if let Ok(raw_factory) = found {
                let raw_factory = *raw_factory;
                let lib = lib.clone();
                let factory: StaticFactory = Arc::new(move || {
                    // Hold the library alive for as long as any instance it
                    // produced might still be in use.
                    let _keep_alive = lib.clone();
                    // SAFETY: see the `SharedLibFactorySymbol` note above.
                    unsafe { raw_factory() }
                });
                return Ok(Resolved { kind, factory });
            }
        }

        Err(DynamicsError::MissingFactorySymbol {
            path: path.display().to_string(),
            kind: reference.kind.factory_symbol().to_string(),
        })
    }

    #[cfg(feature = "dynlib")]
    fn open(&mut self, path: &Path, package: &str, library: &str) -> Result<Arc<libloading::Library>, DynamicsError> {
        if let Some(lib) = self.handles.get(path) {
            return Ok(lib.clone());
        }
        if !path.exists() {
            return Err(DynamicsError::LibraryNotFound {
                package: package.to_string(),
                library: library.to_string(),
            });
        }
        // SAFETY: loading an arbitrary shared library is inherently
        // unsafe; the caller is trusted to only point the loader at
        // packages it installed itself.
        let lib = unsafe {
            libloading::Library::new(path).map_err(|_| DynamicsError::LibraryNotFound {
                package: package.to_string(),
                library: library.to_string(),
            })?
        };
        tracing::debug!(path = %path.display(), "opened dynamics library");
        let lib = Arc::new(lib);
        self.handles.insert(path.to_path_buf(), lib.clone());
        Ok(lib)
    }
}
