//! Extraction and loading of the bundled native webview library.

pub mod bundle;
pub mod extract;

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use libloading::Library;

pub use bundle::{DirectoryBundle, EmbeddedBundle, ResourceBundle};

use crate::error::WebViewError;
use crate::platform::{self, OsDistribution, PlatformDescriptor};
use crate::settings::LoaderConfig;
use crate::sys::NativeLibrary;

/// Bundled library paths for `platform`, dependencies first.
pub fn resource_paths(platform: &PlatformDescriptor) -> Result<Vec<String>, WebViewError> {
    let target = platform.arch_target;
    let os_dir = platform.os_distribution.resource_dir();
    let paths = match platform.os_distribution {
        OsDistribution::Linux => {
            let libc = if platform.linux_is_gnu.unwrap_or(true) {
                "gnu"
            } else {
                "musl"
            };
            vec![format!("/natives/{target}/{os_dir}/{libc}/libwebview.so")]
        }
        OsDistribution::MacOs => vec![format!("/natives/{target}/{os_dir}/libwebview.dylib")],
        OsDistribution::WindowsNt => vec![
            format!("/natives/{target}/{os_dir}/webview2loader.dll"),
            format!("/natives/{target}/{os_dir}/webview.dll"),
        ],
        other => {
            return Err(WebViewError::UnsupportedPlatform(format!(
                "{other}:{target}"
            )))
        }
    };
    Ok(paths.into_iter().map(|path| path.to_lowercase()).collect())
}

/// Extracts a platform's bundled libraries and hands them to the dynamic
/// linker.
pub struct NativeLoader {
    bundle: Box<dyn ResourceBundle>,
    extract_dir: PathBuf,
}

impl NativeLoader {
    pub fn new(bundle: impl ResourceBundle + 'static, extract_dir: impl Into<PathBuf>) -> Self {
        Self {
            bundle: Box::new(bundle),
            extract_dir: extract_dir.into(),
        }
    }

    /// Loader reading a [`DirectoryBundle`] as configured in settings.
    pub fn from_settings() -> Result<Self, WebViewError> {
        let config = LoaderConfig::from_settings()
            .map_err(|err| WebViewError::Internal(format!("loader config: {err}")))?;
        Ok(Self::new(
            DirectoryBundle::new(config.resource_root),
            config.extract_dir,
        ))
    }

    /// Extracts each entry in order. When a target file is busy the write is
    /// skipped and the copy already on disk is returned in its place.
    pub fn extract_all(&self, paths: &[String]) -> Result<Vec<PathBuf>, WebViewError> {
        let mut extracted = Vec::with_capacity(paths.len());
        for path in paths {
            match extract::extract(self.bundle.as_ref(), path, &self.extract_dir) {
                Ok(target) => extracted.push(target),
                Err(WebViewError::ResourceBusy(target)) => {
                    tracing::warn!(
                        resource = %path,
                        path = %target.display(),
                        "native in use by another process, reusing it"
                    );
                    extracted.push(target);
                }
                Err(err) => {
                    tracing::error!(resource = %path, %err, "unable to extract native");
                    return Err(err);
                }
            }
        }
        Ok(extracted)
    }

    /// Extracts and loads every library `platform` needs.
    pub fn load(&self, platform: &PlatformDescriptor) -> Result<NativeLibrary, WebViewError> {
        let paths = resource_paths(platform)?;
        let mut libraries = Vec::with_capacity(paths.len());
        for target in self.extract_all(&paths)? {
            let absolute = std::path::absolute(&target).unwrap_or(target);
            // SAFETY: the bundled libraries have no load-time side effects
            // beyond their own initializers.
            let library = unsafe { Library::new(&absolute) }.map_err(|source| {
                WebViewError::LoadFailure {
                    path: absolute.clone(),
                    source,
                }
            })?;
            tracing::debug!(path = %absolute.display(), "loaded native");
            libraries.push(library);
        }
        NativeLibrary::new(libraries)
    }
}

static NATIVES: OnceLock<NativeLibrary> = OnceLock::new();
static LOAD_LOCK: Mutex<()> = Mutex::new(());

/// Loads the natives for the running host from the configured bundle, once.
pub fn load() -> Result<&'static NativeLibrary, WebViewError> {
    if let Some(natives) = NATIVES.get() {
        return Ok(natives);
    }
    load_with(&NativeLoader::from_settings()?)
}

/// Like [`load`], with a caller-supplied loader. A failed load is not cached;
/// once loaded, later calls return the same library.
pub fn load_with(loader: &NativeLoader) -> Result<&'static NativeLibrary, WebViewError> {
    install(|| loader.load(platform::current()?))
}

/// Installs an already-built library as the process-wide natives if none are
/// loaded yet.
pub fn install(
    build: impl FnOnce() -> Result<NativeLibrary, WebViewError>,
) -> Result<&'static NativeLibrary, WebViewError> {
    let _guard = LOAD_LOCK
        .lock()
        .map_err(|_| WebViewError::Internal("native load lock poisoned".to_string()))?;
    if let Some(natives) = NATIVES.get() {
        return Ok(natives);
    }
    let natives = build()?;
    tracing::info!("native webview library loaded");
    Ok(NATIVES.get_or_init(|| natives))
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;

    use super::*;
    use crate::platform::{ArchFamily, OsFamily};

    fn descriptor(
        dist: OsDistribution,
        family: ArchFamily,
        target: &'static str,
        gnu: Option<bool>,
    ) -> PlatformDescriptor {
        PlatformDescriptor {
            arch_family: family,
            word_size: 64,
            is_big_endian: false,
            arch_target: target,
            os_family: dist.family().unwrap_or(OsFamily::Generic),
            os_distribution: dist,
            linux_is_gnu: gnu,
        }
    }

    #[test]
    fn linux_paths_follow_libc() {
        let gnu = descriptor(OsDistribution::Linux, ArchFamily::X86, "x86_64", Some(true));
        assert_eq!(
            resource_paths(&gnu).unwrap(),
            vec!["/natives/x86_64/linux/gnu/libwebview.so"]
        );
        let musl = descriptor(OsDistribution::Linux, ArchFamily::Arm, "aarch64", Some(false));
        assert_eq!(
            resource_paths(&musl).unwrap(),
            vec!["/natives/aarch64/linux/musl/libwebview.so"]
        );
    }

    #[test]
    fn macos_path() {
        let mac = descriptor(OsDistribution::MacOs, ArchFamily::Arm, "aarch64", None);
        assert_eq!(
            resource_paths(&mac).unwrap(),
            vec!["/natives/aarch64/macos/libwebview.dylib"]
        );
    }

    #[test]
    fn windows_loader_comes_first() {
        let win = descriptor(OsDistribution::WindowsNt, ArchFamily::X86, "x86_64", None);
        assert_eq!(
            resource_paths(&win).unwrap(),
            vec![
                "/natives/x86_64/windows_nt/webview2loader.dll",
                "/natives/x86_64/windows_nt/webview.dll",
            ]
        );
    }

    #[test]
    fn other_distributions_are_unsupported() {
        for dist in [
            OsDistribution::Bsd,
            OsDistribution::Solaris,
            OsDistribution::Windows9x,
            OsDistribution::Generic,
        ] {
            let d = descriptor(dist, ArchFamily::X86, "x86_64", None);
            assert!(matches!(
                resource_paths(&d),
                Err(WebViewError::UnsupportedPlatform(_))
            ));
        }
    }

    #[test]
    fn extract_all_keeps_declaration_order() {
        static ENTRIES: &[(&str, &[u8])] = &[
            ("/natives/x86_64/windows_nt/webview.dll", b"webview"),
            ("/natives/x86_64/windows_nt/webview2loader.dll", b"loader"),
        ];
        let dir = tempfile::tempdir().unwrap();
        let loader = NativeLoader::new(EmbeddedBundle::new(ENTRIES), dir.path());
        let win = descriptor(OsDistribution::WindowsNt, ArchFamily::X86, "x86_64", None);

        let extracted = loader.extract_all(&resource_paths(&win).unwrap()).unwrap();
        assert_eq!(
            extracted,
            vec![
                dir.path().join("webview2loader.dll"),
                dir.path().join("webview.dll"),
            ]
        );

        let again = loader.extract_all(&resource_paths(&win).unwrap()).unwrap();
        assert_eq!(again, extracted);
    }

    /// Reports `busy` as held by another process, serving the rest from
    /// `entries`.
    struct BusyBundle {
        busy: &'static str,
        entries: EmbeddedBundle,
    }

    impl ResourceBundle for BusyBundle {
        fn open(&self, internal_path: &str) -> std::io::Result<Option<Cow<'_, [u8]>>> {
            if internal_path == self.busy {
                return Err(std::io::Error::from_raw_os_error(extract::tests::BUSY_CODE));
            }
            self.entries.open(internal_path)
        }
    }

    #[test]
    fn busy_entry_reuses_copy_on_disk() {
        static ENTRIES: &[(&str, &[u8])] = &[("/natives/x86_64/windows_nt/webview.dll", b"webview")];
        let dir = tempfile::tempdir().unwrap();
        let loader = NativeLoader::new(
            BusyBundle {
                busy: "/natives/x86_64/windows_nt/webview2loader.dll",
                entries: EmbeddedBundle::new(ENTRIES),
            },
            dir.path(),
        );
        let win = descriptor(OsDistribution::WindowsNt, ArchFamily::X86, "x86_64", None);

        let extracted = loader.extract_all(&resource_paths(&win).unwrap()).unwrap();
        assert_eq!(
            extracted,
            vec![
                dir.path().join("webview2loader.dll"),
                dir.path().join("webview.dll"),
            ]
        );
        assert_eq!(std::fs::read(dir.path().join("webview.dll")).unwrap(), b"webview");
    }

    #[test]
    fn busy_library_is_still_handed_to_the_linker() {
        static ENTRIES: &[(&str, &[u8])] = &[];
        let dir = tempfile::tempdir().unwrap();
        let loader = NativeLoader::new(
            BusyBundle {
                busy: "/natives/x86_64/linux/gnu/libwebview.so",
                entries: EmbeddedBundle::new(ENTRIES),
            },
            dir.path(),
        );
        let linux = descriptor(OsDistribution::Linux, ArchFamily::X86, "x86_64", Some(true));

        // The reused path reaches `Library::new` instead of yielding an empty
        // library list.
        match loader.load(&linux) {
            Err(WebViewError::LoadFailure { path, .. }) => {
                assert!(path.ends_with("libwebview.so"));
            }
            Err(err) => panic!("unexpected error: {err}"),
            Ok(_) => panic!("loaded a library that does not exist"),
        }
    }

    #[test]
    fn load_reports_missing_bundle_entry() {
        static ENTRIES: &[(&str, &[u8])] = &[];
        let dir = tempfile::tempdir().unwrap();
        let loader = NativeLoader::new(EmbeddedBundle::new(ENTRIES), dir.path());
        let mac = descriptor(OsDistribution::MacOs, ArchFamily::X86, "x86_64", None);
        assert!(matches!(
            loader.load(&mac),
            Err(WebViewError::ResourceMissing(_))
        ));
    }

    #[test]
    fn load_rejects_non_library_blob() {
        static ENTRIES: &[(&str, &[u8])] =
            &[("/natives/x86_64/linux/gnu/libwebview.so", b"not an elf")];
        let dir = tempfile::tempdir().unwrap();
        let loader = NativeLoader::new(EmbeddedBundle::new(ENTRIES), dir.path());
        let linux = descriptor(OsDistribution::Linux, ArchFamily::X86, "x86_64", Some(true));
        assert!(matches!(
            loader.load(&linux),
            Err(WebViewError::LoadFailure { .. })
        ));
    }
}
