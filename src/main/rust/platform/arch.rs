//! CPU architecture families and their LLVM target names.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

static PATTERNS: LazyLock<Vec<(ArchFamily, Regex)>> = LazyLock::new(|| {
    ArchFamily::ALL
        .into_iter()
        .map(|family| {
            let re = Regex::new(family.pattern()).expect("arch family pattern is a valid regex");
            (family, re)
        })
        .collect()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchFamily {
    X86,
    Arm,
    Ppc,
    Sparc,
    Mips,
    S390,
    Riscv,
}

impl ArchFamily {
    /// Declaration order is match order.
    pub const ALL: [ArchFamily; 7] = [
        ArchFamily::X86,
        ArchFamily::Arm,
        ArchFamily::Ppc,
        ArchFamily::Sparc,
        ArchFamily::Mips,
        ArchFamily::S390,
        ArchFamily::Riscv,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ArchFamily::X86 => "x86",
            ArchFamily::Arm => "arm",
            ArchFamily::Ppc => "ppc",
            ArchFamily::Sparc => "sparc",
            ArchFamily::Mips => "mips",
            ArchFamily::S390 => "s390",
            ArchFamily::Riscv => "riscv",
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            ArchFamily::X86 => "x86|i[0-9]86|ia32|amd64|ia64|itanium64",
            ArchFamily::Arm => "arm|aarch",
            ArchFamily::Ppc => "ppc|power",
            ArchFamily::Sparc => "sparc",
            ArchFamily::Mips => "mips",
            ArchFamily::S390 => "s390",
            ArchFamily::Riscv => "riscv",
        }
    }

    /// Classifies a host architecture string; the first family whose pattern
    /// is found anywhere in the lowercased name wins.
    pub fn detect(arch_name: &str) -> Option<ArchFamily> {
        let arch_name = arch_name.to_lowercase();
        PATTERNS
            .iter()
            .find(|(_, re)| re.is_match(&arch_name))
            .map(|(family, _)| *family)
    }

    /// LLVM-style target component for this family.
    ///
    /// Any word size other than 64 resolves to the 32-bit name. Families that
    /// have a single byte order ignore `big_endian`.
    pub fn arch_target(self, word_size: i32, big_endian: bool) -> &'static str {
        let wide = word_size == 64;
        match self {
            ArchFamily::X86 => {
                if wide {
                    "x86_64"
                } else {
                    "x86"
                }
            }
            ArchFamily::Arm => match (wide, big_endian) {
                (true, true) => "aarch64_be",
                (true, false) => "aarch64",
                (false, true) => "armeb",
                (false, false) => "arm",
            },
            ArchFamily::Ppc => match (wide, big_endian) {
                (true, true) => "ppc64",
                (true, false) => "ppc64le",
                (false, true) => "ppc",
                (false, false) => "ppcle",
            },
            ArchFamily::Mips => match (wide, big_endian) {
                (true, true) => "mips64",
                (true, false) => "mips64el",
                (false, true) => "mips",
                (false, false) => "mipsel",
            },
            ArchFamily::Sparc => match (wide, big_endian) {
                (true, _) => "sparcv9",
                (false, true) => "sparc",
                (false, false) => "sparcel",
            },
            // LLVM has no separate s390x name.
            ArchFamily::S390 => "systemz",
            ArchFamily::Riscv => {
                if wide {
                    "riscv64"
                } else {
                    "riscv32"
                }
            }
        }
    }
}

impl fmt::Display for ArchFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_compiles() {
        assert_eq!(PATTERNS.len(), ArchFamily::ALL.len());
    }

    #[test]
    fn detects_rust_arch_names() {
        assert_eq!(ArchFamily::detect("x86_64"), Some(ArchFamily::X86));
        assert_eq!(ArchFamily::detect("x86"), Some(ArchFamily::X86));
        assert_eq!(ArchFamily::detect("aarch64"), Some(ArchFamily::Arm));
        assert_eq!(ArchFamily::detect("arm"), Some(ArchFamily::Arm));
        assert_eq!(ArchFamily::detect("powerpc64"), Some(ArchFamily::Ppc));
        assert_eq!(ArchFamily::detect("sparc64"), Some(ArchFamily::Sparc));
        assert_eq!(ArchFamily::detect("mips64"), Some(ArchFamily::Mips));
        assert_eq!(ArchFamily::detect("s390x"), Some(ArchFamily::S390));
        assert_eq!(ArchFamily::detect("riscv64"), Some(ArchFamily::Riscv));
    }

    #[test]
    fn detects_vendor_arch_names() {
        assert_eq!(ArchFamily::detect("AMD64"), Some(ArchFamily::X86));
        assert_eq!(ArchFamily::detect("i686"), Some(ArchFamily::X86));
        assert_eq!(ArchFamily::detect("ia64"), Some(ArchFamily::X86));
        assert_eq!(ArchFamily::detect("ppc64le"), Some(ArchFamily::Ppc));
    }

    #[test]
    fn unknown_arch_is_none() {
        assert_eq!(ArchFamily::detect("wasm32"), None);
        assert_eq!(ArchFamily::detect(""), None);
    }

    #[test]
    fn target_table() {
        use ArchFamily::*;
        let table: &[(ArchFamily, [&str; 4])] = &[
            (X86, ["x86_64", "x86_64", "x86", "x86"]),
            (Arm, ["aarch64_be", "aarch64", "armeb", "arm"]),
            (Ppc, ["ppc64", "ppc64le", "ppc", "ppcle"]),
            (Mips, ["mips64", "mips64el", "mips", "mipsel"]),
            (Sparc, ["sparcv9", "sparcv9", "sparc", "sparcel"]),
            (S390, ["systemz", "systemz", "systemz", "systemz"]),
            (Riscv, ["riscv64", "riscv64", "riscv32", "riscv32"]),
        ];
        for (family, [be64, le64, be32, le32]) in table {
            assert_eq!(family.arch_target(64, true), *be64, "{family} 64 BE");
            assert_eq!(family.arch_target(64, false), *le64, "{family} 64 LE");
            assert_eq!(family.arch_target(32, true), *be32, "{family} 32 BE");
            assert_eq!(family.arch_target(32, false), *le32, "{family} 32 LE");
        }
    }

    #[test]
    fn unknown_word_size_uses_narrow_target() {
        assert_eq!(ArchFamily::X86.arch_target(-1, false), "x86");
        assert_eq!(ArchFamily::Arm.arch_target(-1, true), "armeb");
    }
}
