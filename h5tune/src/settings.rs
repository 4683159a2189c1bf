//! Runtime settings for the interception shim.
//!
//! The shim never keeps mutable process globals: where the rule document
//! lives, how chatty to be and how file scopes are matched are all carried by
//! a [`TunerSettings`] value handed to [`crate::shim::Tuner`]. The
//! environment-backed sources are re-read on every intercepted call, so a
//! job script can change them between calls.

use std::path::PathBuf;

use crate::matcher::FileMatchPolicy;

/// Environment variable naming the rule document.
pub const CONFIG_FILE_ENV: &str = "H5TUNER_CONFIG_FILE";

/// Rule document used when [`CONFIG_FILE_ENV`] is unset.
pub const DEFAULT_CONFIG_FILE: &str = "config.xml";

/// Environment variable holding the integer verbosity level.
pub const VERBOSE_ENV: &str = "H5TUNER_VERBOSE";

/// Where the rule document is read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigPath {
    /// `$H5TUNER_CONFIG_FILE`, falling back to `config.xml`.
    #[default]
    Env,
    /// A fixed path.
    Fixed(PathBuf),
}

impl ConfigPath {
    /// The path to load for the current call.
    pub fn resolve(&self) -> PathBuf {
        match self {
            Self::Env => std::env::var_os(CONFIG_FILE_ENV)
                .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from),
            Self::Fixed(path) => path.clone(),
        }
    }
}

/// Operator-facing verbosity level; 0 is silent.
///
/// Each level includes the ones below it:
///
/// | Level | Output |
/// |-------|--------|
/// | 1 | one-time "library loaded" notice |
/// | 2 | one line per intercepted call |
/// | 3 | the rule document path |
/// | 4 | every setting applied |
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Verbosity(pub u8);

impl Verbosity {
    /// No output besides failures.
    pub const SILENT: Verbosity = Verbosity(0);
    /// Library-loaded notice.
    pub const NOTICE: Verbosity = Verbosity(1);
    /// Entry-point notices.
    pub const CALLS: Verbosity = Verbosity(2);
    /// Rule document path.
    pub const DOCUMENT: Verbosity = Verbosity(3);
    /// Applied settings.
    pub const SETTINGS: Verbosity = Verbosity(4);

    /// Parses a verbosity value the way `strtol` reads it: optional leading
    /// whitespace and sign, then digits; anything unparsable is silent.
    /// Negative values are silent, values above 255 saturate.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use h5tune::settings::Verbosity;
    ///
    /// assert_eq!(Verbosity::parse(Some("4")), Verbosity(4));
    /// assert_eq!(Verbosity::parse(Some(" 3 levels")), Verbosity(3));
    /// assert_eq!(Verbosity::parse(Some("loud")), Verbosity::SILENT);
    /// assert_eq!(Verbosity::parse(None), Verbosity::SILENT);
    /// ```
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::SILENT;
        };

        let value = value.trim_start();
        let (negative, digits) = match value.as_bytes().first() {
            Some(b'-') => (true, &value[1..]),
            Some(b'+') => (false, &value[1..]),
            _ => (false, value),
        };
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        let digits = &digits[..end];

        if negative || digits.is_empty() {
            return Self::SILENT;
        }
        // all-digit strings only fail to parse on overflow
        Self(digits.parse::<u8>().unwrap_or(u8::MAX))
    }

    /// Reads [`VERBOSE_ENV`].
    pub fn from_env() -> Self {
        Self::parse(std::env::var(VERBOSE_ENV).ok().as_deref())
    }

    /// Whether output at `level` should be shown.
    pub fn allows(self, level: Verbosity) -> bool {
        self >= level
    }
}

/// Where the verbosity level comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VerbositySource {
    /// `$H5TUNER_VERBOSE`, re-read on every call.
    #[default]
    Env,
    /// A fixed level.
    Fixed(Verbosity),
}

impl VerbositySource {
    /// The level in effect for the current call.
    pub fn current(self) -> Verbosity {
        match self {
            Self::Env => Verbosity::from_env(),
            Self::Fixed(level) => level,
        }
    }
}

/// Everything the shim needs besides the backend.
///
/// The default reads both the document path and the verbosity from the
/// environment and matches file scopes against path basenames.
///
/// ```rust
/// use h5tune::matcher::FileMatchPolicy;
/// use h5tune::settings::{ConfigPath, TunerSettings, Verbosity, VerbositySource};
///
/// let settings = TunerSettings::default()
///     .with_config_path(ConfigPath::Fixed("tuning.xml".into()))
///     .with_verbosity(VerbositySource::Fixed(Verbosity::SETTINGS))
///     .with_policy(FileMatchPolicy::Suffix);
/// assert_eq!(settings.config_path.resolve(), std::path::PathBuf::from("tuning.xml"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunerSettings {
    /// Rule document location.
    pub config_path: ConfigPath,
    /// Verbosity source.
    pub verbosity: VerbositySource,
    /// File scope matching policy.
    pub policy: FileMatchPolicy,
}

impl TunerSettings {
    /// Replaces the document location.
    #[must_use]
    pub fn with_config_path(mut self, config_path: ConfigPath) -> Self {
        self.config_path = config_path;
        self
    }

    /// Replaces the verbosity source.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: VerbositySource) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Replaces the file matching policy.
    #[must_use]
    pub fn with_policy(mut self, policy: FileMatchPolicy) -> Self {
        self.policy = policy;
        self
    }
}
