//! Operating system families and distributions.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static FAMILY_PATTERNS: LazyLock<Vec<(OsFamily, Regex)>> = LazyLock::new(|| {
    OsFamily::ALL
        .into_iter()
        .map(|family| {
            let re = Regex::new(family.pattern()).expect("os family pattern is a valid regex");
            (family, re)
        })
        .collect()
});

static DISTRIBUTION_PATTERNS: LazyLock<Vec<(OsDistribution, Regex)>> = LazyLock::new(|| {
    OsDistribution::ALL
        .into_iter()
        .filter_map(|dist| {
            let pattern = dist.pattern()?;
            let re = Regex::new(pattern).expect("os distribution pattern is a valid regex");
            Some((dist, re))
        })
        .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Unix,
    Windows,
    Dos,
    Vms,
    Generic,
}

impl OsFamily {
    /// Declaration order is match order; `Generic` matches anything.
    pub const ALL: [OsFamily; 5] = [
        OsFamily::Unix,
        OsFamily::Windows,
        OsFamily::Dos,
        OsFamily::Vms,
        OsFamily::Generic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            OsFamily::Unix => "Unix",
            OsFamily::Windows => "Windows",
            OsFamily::Dos => "DOS",
            OsFamily::Vms => "VMS",
            OsFamily::Generic => "Generic",
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            OsFamily::Unix => "nux|bsd|.ix|sun|solaris|hp-ux|mac|darwin",
            OsFamily::Windows => "win",
            OsFamily::Dos => "dos",
            OsFamily::Vms => "vms",
            OsFamily::Generic => "",
        }
    }

    pub fn detect(os_name: &str) -> OsFamily {
        let os_name = os_name.to_lowercase();
        FAMILY_PATTERNS
            .iter()
            .find(|(_, re)| re.is_match(&os_name))
            .map_or(OsFamily::Generic, |(family, _)| *family)
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsDistribution {
    MsDos,
    Windows9x,
    WindowsNt,
    MacOs,
    Solaris,
    Bsd,
    Linux,
    OpenVms,
    Generic,
}

impl OsDistribution {
    pub const ALL: [OsDistribution; 9] = [
        OsDistribution::MsDos,
        OsDistribution::Windows9x,
        OsDistribution::WindowsNt,
        OsDistribution::MacOs,
        OsDistribution::Solaris,
        OsDistribution::Bsd,
        OsDistribution::Linux,
        OsDistribution::OpenVms,
        OsDistribution::Generic,
    ];

    /// Owning family, `None` for the `Generic` fallback.
    pub fn family(self) -> Option<OsFamily> {
        match self {
            OsDistribution::MsDos => Some(OsFamily::Dos),
            OsDistribution::Windows9x | OsDistribution::WindowsNt => Some(OsFamily::Windows),
            OsDistribution::MacOs
            | OsDistribution::Solaris
            | OsDistribution::Bsd
            | OsDistribution::Linux => Some(OsFamily::Unix),
            OsDistribution::OpenVms => Some(OsFamily::Vms),
            OsDistribution::Generic => None,
        }
    }

    /// Friendly name, e.g. "macOS" or "Windows NT".
    pub fn name(self) -> &'static str {
        match self {
            OsDistribution::MsDos => "MS-DOS",
            OsDistribution::Windows9x => "Windows 9x",
            OsDistribution::WindowsNt => "Windows NT",
            OsDistribution::MacOs => "macOS",
            OsDistribution::Solaris => "Solaris",
            OsDistribution::Bsd => "BSD",
            OsDistribution::Linux => "Linux",
            OsDistribution::OpenVms => "OpenVMS",
            OsDistribution::Generic => "Generic",
        }
    }

    /// Directory name used in the bundled resource layout.
    pub fn resource_dir(self) -> &'static str {
        match self {
            OsDistribution::MsDos => "ms_dos",
            OsDistribution::Windows9x => "windows_9x",
            OsDistribution::WindowsNt => "windows_nt",
            OsDistribution::MacOs => "macos",
            OsDistribution::Solaris => "solaris",
            OsDistribution::Bsd => "bsd",
            OsDistribution::Linux => "linux",
            OsDistribution::OpenVms => "open_vms",
            OsDistribution::Generic => "generic",
        }
    }

    fn pattern(self) -> Option<&'static str> {
        match self {
            // Only reachable through the path separator check.
            OsDistribution::MsDos | OsDistribution::Generic => None,
            OsDistribution::Windows9x => Some("windows (95|98|me|ce)"),
            OsDistribution::WindowsNt => Some("win"),
            OsDistribution::MacOs => Some("mac|darwin"),
            OsDistribution::Solaris => Some("sun|solaris"),
            OsDistribution::Bsd => Some("bsd"),
            OsDistribution::Linux => Some("nux"),
            OsDistribution::OpenVms => Some("vms"),
        }
    }

    /// Picks the first distribution of `family` whose pattern is found in the
    /// lowercased OS name. DOS hosts with a `;` path separator are MS-DOS.
    pub fn detect(family: OsFamily, os_name: &str, path_separator: &str) -> OsDistribution {
        if family == OsFamily::Dos && path_separator == ";" {
            return OsDistribution::MsDos;
        }

        let os_name = os_name.to_lowercase();
        DISTRIBUTION_PATTERNS
            .iter()
            .filter(|(dist, _)| dist.family() == Some(family))
            .find(|(_, re)| re.is_match(&os_name))
            .map_or(OsDistribution::Generic, |(dist, _)| *dist)
    }
}

impl fmt::Display for OsDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
