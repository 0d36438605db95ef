//! Engine specifications and classification.
//!
//! An [`EngineSpec`] is the configured command for an engine: an executable
//! followed by fixed leading arguments. [`EngineProfile::classify`] maps it
//! to the command-line conventions that engine expects.
//!
//! Classification looks only at the base name of the executable, using
//! case-sensitive substring matches so that suffixed builds (`d8_g`,
//! `wasmtime-dev`, ...) are recognized:
//!
//! | base name contains     | profile                  |
//! |------------------------|--------------------------|
//! | `wasmer`               | [`EngineProfile::Wasmer`]         |
//! | `wasmtime`             | [`EngineProfile::Wasmtime`]       |
//! | `d8` or `v8`           | [`EngineProfile::V8`]             |
//! | `jsc`                  | [`EngineProfile::JavaScriptCore`] |
//!
//! The configured ahead-of-time compiler is matched on the full executable
//! string and wins over every substring rule.

use std::fmt;
use std::path::Path;

use engine_dispatch_common::{DispatchError, EngineEntry};

/// Shell flag passed to V8 shells to keep Wasm compilation synchronous.
pub const V8_SHELL_FLAGS: &[&str] = &["--no-wasm-async-compilation"];

/// Token separating engine flags from script flags.
pub const ARG_SEPARATOR: &str = "--";

/// An engine command: executable path plus fixed leading arguments.
///
/// Immutable once constructed and never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EngineSpec {
    tokens: Vec<String>,
}

impl EngineSpec {
    /// Create an engine spec from its command tokens.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `tokens` is empty or the executable is blank.
    pub fn new<I, S>(tokens: I) -> Result<Self, DispatchError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens: Vec<String> = tokens.into_iter().map(Into::into).collect();
        match tokens.first() {
            None => Err(DispatchError::invalid_config(
                "engine command must name an executable",
            )),
            Some(exe) if exe.trim().is_empty() => Err(DispatchError::invalid_config(
                "engine executable must not be blank",
            )),
            Some(_) => Ok(Self { tokens }),
        }
    }

    /// Create an engine spec consisting of a single executable.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `executable` is blank.
    pub fn executable_only(executable: impl Into<String>) -> Result<Self, DispatchError> {
        let executable: String = executable.into();
        Self::new([executable])
    }

    /// The executable path. This is the engine's identity for health caching.
    pub fn executable(&self) -> &str {
        &self.tokens[0]
    }

    /// The fixed arguments that follow the executable.
    pub fn leading_args(&self) -> &[String] {
        &self.tokens[1..]
    }

    /// All tokens, executable first.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// The last path component of the executable.
    pub fn base_name(&self) -> &str {
        let exe = self.executable();
        Path::new(exe)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(exe)
    }
}

impl fmt::Display for EngineSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{token:?}")?;
        }
        write!(f, "]")
    }
}

impl TryFrom<&EngineEntry> for EngineSpec {
    type Error = DispatchError;

    fn try_from(entry: &EngineEntry) -> Result<Self, Self::Error> {
        Self::new(entry.command.iter().cloned()).map_err(|_| {
            DispatchError::invalid_config(format!("engine '{}' has an empty command", entry.id))
        })
    }
}

/// Command-line conventions of an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineProfile {
    /// A V8 shell (`d8`, `d8_g`, `v8`, ...).
    V8,
    /// A JavaScriptCore shell (`jsc`).
    JavaScriptCore,
    /// Wasmer: runs the `.wasm` binary through its `run` subcommand.
    Wasmer,
    /// Wasmtime: runs the `.wasm` binary directly.
    Wasmtime,
    /// A C compiler used as a pseudo-engine to build a native executable.
    AotCompiler,
    /// Anything else: `engine file args...` with no separator.
    Generic,
}

impl EngineProfile {
    /// Classify an engine.
    ///
    /// `aot_compiler` is the configured compiler identity; an engine whose
    /// executable equals it exactly is an [`EngineProfile::AotCompiler`].
    pub fn classify(engine: &EngineSpec, aot_compiler: Option<&str>) -> Self {
        if aot_compiler.is_some_and(|cc| cc == engine.executable()) {
            return Self::AotCompiler;
        }
        Self::from_base_name(engine.base_name())
    }

    /// Classify an executable base name by substring.
    pub fn from_base_name(name: &str) -> Self {
        if name.contains("wasmer") {
            Self::Wasmer
        } else if name.contains("wasmtime") {
            Self::Wasmtime
        } else if name.contains("d8") || name.contains("v8") {
            Self::V8
        } else if name.contains("jsc") {
            Self::JavaScriptCore
        } else {
            Self::Generic
        }
    }

    /// Engine-specific flags placed right after the artifact.
    pub fn shell_flags(self) -> &'static [&'static str] {
        match self {
            Self::V8 => V8_SHELL_FLAGS,
            _ => &[],
        }
    }

    /// Whether script arguments must follow an [`ARG_SEPARATOR`].
    pub fn needs_separator(self) -> bool {
        matches!(self, Self::V8 | Self::JavaScriptCore)
    }

    /// Subcommand placed right after the engine tokens, if any.
    pub fn subcommand(self) -> Option<&'static str> {
        match self {
            Self::Wasmer => Some("run"),
            _ => None,
        }
    }

    /// Whether the engine runs the `.wasm` binary instead of the script.
    pub fn runs_wasm_binary(self) -> bool {
        matches!(self, Self::Wasmer | Self::Wasmtime)
    }

    /// Whether the engine is a compiler rather than a runtime.
    pub fn is_compiler(self) -> bool {
        matches!(self, Self::AotCompiler)
    }
}

impl fmt::Display for EngineProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::V8 => "v8",
            Self::JavaScriptCore => "jsc",
            Self::Wasmer => "wasmer",
            Self::Wasmtime => "wasmtime",
            Self::AotCompiler => "aot-compiler",
            Self::Generic => "generic",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(tokens: &[&str]) -> EngineSpec {
        EngineSpec::new(tokens.iter().copied()).unwrap()
    }

    #[test]
    fn test_engine_spec_rejects_empty() {
        let empty: [&str; 0] = [];
        assert!(EngineSpec::new(empty).is_err());
        assert!(EngineSpec::executable_only("  ").is_err());
    }

    #[test]
    fn test_engine_spec_accessors() {
        let engine = spec(&["/opt/v8/d8", "--expose-gc"]);

        assert_eq!(engine.executable(), "/opt/v8/d8");
        assert_eq!(engine.leading_args(), ["--expose-gc".to_string()]);
        assert_eq!(engine.base_name(), "d8");
        assert_eq!(engine.to_string(), r#"["/opt/v8/d8", "--expose-gc"]"#);
    }

    #[test]
    fn test_classify_v8_variants() {
        for name in ["d8", "d8_g", "/usr/local/bin/d8", "v8", "v8-debug"] {
            assert_eq!(
                EngineProfile::classify(&spec(&[name]), None),
                EngineProfile::V8,
                "{name}"
            );
        }
    }

    #[test]
    fn test_classify_other_engines() {
        assert_eq!(
            EngineProfile::classify(&spec(&["/usr/bin/jsc"]), None),
            EngineProfile::JavaScriptCore
        );
        assert_eq!(
            EngineProfile::classify(&spec(&["wasmer"]), None),
            EngineProfile::Wasmer
        );
        assert_eq!(
            EngineProfile::classify(&spec(&["~/.wasmtime/bin/wasmtime"]), None),
            EngineProfile::Wasmtime
        );
        assert_eq!(
            EngineProfile::classify(&spec(&["node"]), None),
            EngineProfile::Generic
        );
    }

    #[test]
    fn test_classify_is_case_sensitive() {
        assert_eq!(
            EngineProfile::classify(&spec(&["D8"]), None),
            EngineProfile::Generic
        );
    }

    #[test]
    fn test_classify_ignores_directories() {
        // A `d8` directory must not turn node into a V8 shell.
        assert_eq!(
            EngineProfile::classify(&spec(&["/home/d8/bin/node"]), None),
            EngineProfile::Generic
        );
    }

    #[test]
    fn test_classify_aot_compiler_exact_match() {
        let clang = spec(&["/usr/bin/clang"]);

        assert_eq!(
            EngineProfile::classify(&clang, Some("/usr/bin/clang")),
            EngineProfile::AotCompiler
        );
        // Only the exact configured string is the compiler.
        assert_eq!(
            EngineProfile::classify(&clang, Some("clang")),
            EngineProfile::Generic
        );
    }

    #[test]
    fn test_profile_traits() {
        assert_eq!(EngineProfile::V8.shell_flags(), V8_SHELL_FLAGS);
        assert!(EngineProfile::JavaScriptCore.shell_flags().is_empty());
        assert!(EngineProfile::V8.needs_separator());
        assert!(EngineProfile::JavaScriptCore.needs_separator());
        assert!(!EngineProfile::Generic.needs_separator());
        assert_eq!(EngineProfile::Wasmer.subcommand(), Some("run"));
        assert_eq!(EngineProfile::Wasmtime.subcommand(), None);
        assert!(EngineProfile::Wasmtime.runs_wasm_binary());
        assert!(!EngineProfile::V8.runs_wasm_binary());
        assert!(EngineProfile::AotCompiler.is_compiler());
    }

    #[test]
    fn test_try_from_entry() {
        let entry = EngineEntry {
            id: "node".into(),
            command: vec!["node".into(), "--stack-size=8192".into()],
        };
        let engine = EngineSpec::try_from(&entry).unwrap();
        assert_eq!(engine.executable(), "node");

        let empty = EngineEntry {
            id: "broken".into(),
            command: Vec::new(),
        };
        let err = EngineSpec::try_from(&empty).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }
}
