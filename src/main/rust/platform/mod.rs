//! Host platform detection.
//!
//! [`current`] classifies the running host once per process: CPU family,
//! word size, byte order, OS family and distribution, and on Linux the libc
//! flavor. The result picks which bundled native webview library is loaded.

pub mod arch;
pub mod libc;
pub mod os;

use std::sync::OnceLock;

pub use arch::ArchFamily;
pub use os::{OsDistribution, OsFamily};

use crate::error::WebViewError;
use crate::settings;

/// Overrides the vendor bitmode hint used for word size detection.
pub const BITMODE: &str = "nativewebview.bitmode";

/// Raw host facts that detection classifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProbe {
    pub os_name: String,
    pub arch_name: String,
    pub path_separator: String,
    /// Pointer width of the build target, e.g. "64".
    pub data_model: Option<String>,
    pub bitmode: Option<String>,
    pub vm_name: Option<String>,
    pub big_endian: bool,
}

impl HostProbe {
    /// Facts about the running process.
    pub fn current() -> Self {
        Self {
            os_name: std::env::consts::OS.to_string(),
            arch_name: std::env::consts::ARCH.to_string(),
            path_separator: if cfg!(windows) { ";" } else { ":" }.to_string(),
            data_model: Some(usize::BITS.to_string()),
            bitmode: settings::property(BITMODE),
            vm_name: None,
            big_endian: cfg!(target_endian = "big"),
        }
    }

    /// Data model hint, then vendor bitmode, then a `64-bit`/`32-bit` tag in
    /// the VM name; -1 when nothing is known.
    pub fn word_size(&self) -> i32 {
        if let Some(bits) = self
            .data_model
            .as_deref()
            .filter(|model| *model != "unknown")
            .and_then(|model| model.trim().parse().ok())
        {
            return bits;
        }

        if let Some(bits) = self
            .bitmode
            .as_deref()
            .and_then(|mode| mode.trim().parse().ok())
        {
            return bits;
        }

        match self.vm_name.as_deref() {
            Some(name) if name.contains("64-bit") => 64,
            Some(name) if name.contains("32-bit") => 32,
            _ => -1,
        }
    }
}

/// Fully classified host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformDescriptor {
    pub arch_family: ArchFamily,
    pub word_size: i32,
    pub is_big_endian: bool,
    pub arch_target: &'static str,
    pub os_family: OsFamily,
    pub os_distribution: OsDistribution,
    /// Only set on Linux.
    pub linux_is_gnu: Option<bool>,
}

impl PlatformDescriptor {
    /// Classifies `probe`. An unknown OS degrades to `Generic`; an unknown
    /// CPU architecture is an error.
    pub fn detect(probe: &HostProbe) -> Result<Self, WebViewError> {
        Self::detect_with(probe, libc::is_gnu)
    }

    pub(crate) fn detect_with(
        probe: &HostProbe,
        is_gnu: impl FnOnce() -> bool,
    ) -> Result<Self, WebViewError> {
        let os_family = OsFamily::detect(&probe.os_name);
        let os_distribution =
            OsDistribution::detect(os_family, &probe.os_name, &probe.path_separator);

        let arch_family = ArchFamily::detect(&probe.arch_name).ok_or_else(|| {
            WebViewError::UnsupportedPlatform(format!("unknown cpu arch: {}", probe.arch_name))
        })?;
        let word_size = probe.word_size();
        let is_big_endian = probe.big_endian;
        let arch_target = arch_family.arch_target(word_size, is_big_endian);

        let linux_is_gnu = (os_distribution == OsDistribution::Linux).then(is_gnu);

        Ok(Self {
            arch_family,
            word_size,
            is_big_endian,
            arch_target,
            os_family,
            os_distribution,
            linux_is_gnu,
        })
    }

    /// Conventional library file name for this host, e.g. `libwebview.so`
    /// for `"libWebView"` on Linux.
    ///
    /// macOS gets `.dylib` and Windows `.dll`, the more common of the
    /// extensions each accepts.
    pub fn format_library(&self, base_name: &str) -> String {
        format_library(self.os_distribution, base_name)
    }
}

pub fn format_library(distribution: OsDistribution, base_name: &str) -> String {
    match distribution {
        OsDistribution::MsDos | OsDistribution::OpenVms => {
            format!("{base_name}.exe").to_uppercase()
        }
        OsDistribution::Windows9x | OsDistribution::WindowsNt => format!("{base_name}.dll"),
        OsDistribution::MacOs => format!("{base_name}.dylib").to_lowercase(),
        OsDistribution::Bsd | OsDistribution::Solaris | OsDistribution::Linux => {
            format!("{base_name}.so").to_lowercase()
        }
        OsDistribution::Generic => base_name.to_string(),
    }
}

static CURRENT: OnceLock<Result<PlatformDescriptor, String>> = OnceLock::new();

/// The running host, detected on first use.
pub fn current() -> Result<&'static PlatformDescriptor, WebViewError> {
    CURRENT
        .get_or_init(|| {
            let descriptor =
                PlatformDescriptor::detect(&HostProbe::current()).map_err(|err| err.to_string());
            if let Ok(descriptor) = &descriptor {
                tracing::debug!(?descriptor, "detected platform");
            }
            descriptor
        })
        .as_ref()
        .map_err(|reason| WebViewError::UnsupportedPlatform(reason.clone()))
}
