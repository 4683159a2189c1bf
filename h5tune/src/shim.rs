//! The interception shim.
//!
//! [`Tuner`] stands in for the library's file-create, file-open,
//! dataset-create and dataset-write entry points. For each call it loads the
//! rule document, copies the caller's property list, applies every matching
//! rule to the copy and forwards to the real entry point with it. The
//! caller's own list is never touched.
//!
//! Each entry point comes in two flavours: a C-style one returning the
//! library's negative sentinel on failure (after logging the error chain and
//! the application's call site), and a `try_*` one returning [`Result`].
//!
//! # Example
//!
//! ```rust,no_run
//! use h5tune::backend::DEFAULT_PLIST;
//! use h5tune::memory::InMemoryBackend;
//! use h5tune::settings::{ConfigPath, TunerSettings};
//! use h5tune::shim::Tuner;
//!
//! let settings = TunerSettings::default()
//!     .with_config_path(ConfigPath::Fixed("/etc/h5tune/config.xml".into()));
//! let tuner = Tuner::with_settings(InMemoryBackend::new(), settings);
//!
//! let file = tuner.file_create("data.h5", 0, DEFAULT_PLIST, DEFAULT_PLIST);
//! assert!(file >= 0);
//! ```

use std::error::Error as _;
use std::panic::Location;
use std::sync::Once;

use crate::applier::{PropertyApplier, RuleContext};
use crate::backend::{DEFAULT_PLIST, Driver, Hdf5Backend, Hid, INVALID_HID, MpioAccess, PlistClass};
use crate::codec::{self, ParsedValue};
use crate::document::RuleDocument;
use crate::error::{BackendError, Result, TuneError};
use crate::matcher::{MatchRequest, RuleMatcher};
use crate::params::{LOCKLESS_PREFIX, Parameter};
use crate::settings::{TunerSettings, Verbosity};

static LIBRARY_NOTICE: Once = Once::new();

/// An intercepted library entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    /// `H5Fcreate`.
    FileCreate,
    /// `H5Fopen`.
    FileOpen,
    /// `H5Dcreate1`.
    DatasetCreate1,
    /// `H5Dcreate2`.
    DatasetCreate2,
    /// `H5Dwrite`.
    DatasetWrite,
}

impl EntryPoint {
    /// The library function name.
    pub fn name(self) -> &'static str {
        match self {
            Self::FileCreate => "H5Fcreate",
            Self::FileOpen => "H5Fopen",
            Self::DatasetCreate1 => "H5Dcreate1",
            Self::DatasetCreate2 => "H5Dcreate2",
            Self::DatasetWrite => "H5Dwrite",
        }
    }
}

/// Owns a property list copy until a forwarded call takes it over.
///
/// Dropping an armed guard closes the list, so every early return releases
/// it exactly once.
struct PlistGuard<'b, B: Hdf5Backend + ?Sized> {
    backend: &'b B,
    id: Hid,
    armed: bool,
}

impl<'b, B: Hdf5Backend + ?Sized> PlistGuard<'b, B> {
    /// Copies `caller`, or creates a fresh list of `class` for the default.
    fn acquire(backend: &'b B, class: PlistClass, caller: Hid) -> Result<Self> {
        let id = if caller == DEFAULT_PLIST {
            backend.create_plist(class)?
        } else {
            backend.copy_plist(caller)?
        };
        Ok(Self {
            backend,
            id,
            armed: true,
        })
    }

    fn id(&self) -> Hid {
        self.id
    }

    /// Settles ownership after forwarding: a non-negative `status` means the
    /// callee consumed the list.
    fn forwarded(mut self, entry: EntryPoint, status: Hid) -> Result<Hid> {
        if status < 0 {
            return Err(BackendError::Forward {
                entry: entry.name(),
                status,
            }
            .into());
        }
        self.armed = false;
        Ok(status)
    }
}

impl<B: Hdf5Backend + ?Sized> Drop for PlistGuard<'_, B> {
    fn drop(&mut self) {
        if self.armed
            && let Err(e) = self.backend.close_plist(self.id)
        {
            tracing::error!("failed to release property list {}: {e}", self.id);
        }
    }
}

/// A file-access list ready to forward, plus the name to forward with.
struct PreparedFile<'b, B: Hdf5Backend + ?Sized> {
    fapl: PlistGuard<'b, B>,
    renamed: Option<String>,
}

/// Per-call state: which entry point, at what verbosity.
#[derive(Debug, Clone, Copy)]
struct Call {
    entry: EntryPoint,
    verbosity: Verbosity,
}

/// Rule-driven property tuning in front of a [`Hdf5Backend`].
///
/// The rule document is read again on every intercepted call and nothing is
/// cached between calls. If the document changes while a parallel job is
/// running, processes opening the same file may see different versions and
/// configure it inconsistently; deployments should leave the document alone
/// for the duration of a run.
#[derive(Debug)]
pub struct Tuner<B> {
    backend: B,
    settings: TunerSettings,
}

impl<B: Hdf5Backend> Tuner<B> {
    /// Creates a tuner that takes its settings from the environment.
    pub fn new(backend: B) -> Self {
        Self::with_settings(backend, TunerSettings::default())
    }

    /// Creates a tuner with explicit settings.
    pub fn with_settings(backend: B, settings: TunerSettings) -> Self {
        Self { backend, settings }
    }

    /// The wrapped backend.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The settings in use.
    pub fn settings(&self) -> &TunerSettings {
        &self.settings
    }

    /// Tuned `H5Fcreate`; returns a negative identifier on failure.
    #[track_caller]
    pub fn file_create(&self, name: &str, flags: u32, fcpl: Hid, fapl: Hid) -> Hid {
        let caller = Location::caller();
        self.try_file_create(name, flags, fcpl, fapl)
            .unwrap_or_else(|e| report_failure(EntryPoint::FileCreate, caller, &e))
    }

    /// Tuned `H5Fcreate`.
    ///
    /// # Errors
    ///
    /// Returns [`TuneError`] if the document cannot be loaded, a matching
    /// rule is invalid, a property update fails or the real call fails.
    pub fn try_file_create(&self, name: &str, flags: u32, fcpl: Hid, fapl: Hid) -> Result<Hid> {
        let call = self.begin(EntryPoint::FileCreate);
        let prepared = self.prepare_file_access(call, name, fapl)?;
        let target = prepared.renamed.as_deref().unwrap_or(name);
        let status = self.backend.file_create(target, flags, fcpl, prepared.fapl.id());
        prepared.fapl.forwarded(call.entry, status)
    }

    /// Tuned `H5Fopen`; returns a negative identifier on failure.
    #[track_caller]
    pub fn file_open(&self, name: &str, flags: u32, fapl: Hid) -> Hid {
        let caller = Location::caller();
        self.try_file_open(name, flags, fapl)
            .unwrap_or_else(|e| report_failure(EntryPoint::FileOpen, caller, &e))
    }

    /// Tuned `H5Fopen`.
    ///
    /// # Errors
    ///
    /// Same as [`Tuner::try_file_create`].
    pub fn try_file_open(&self, name: &str, flags: u32, fapl: Hid) -> Result<Hid> {
        let call = self.begin(EntryPoint::FileOpen);
        let prepared = self.prepare_file_access(call, name, fapl)?;
        let target = prepared.renamed.as_deref().unwrap_or(name);
        let status = self.backend.file_open(target, flags, prepared.fapl.id());
        prepared.fapl.forwarded(call.entry, status)
    }

    /// Tuned `H5Dcreate1`; returns a negative identifier on failure.
    #[track_caller]
    pub fn dataset_create1(&self, loc: Hid, name: &str, dtype: Hid, space: Hid, dcpl: Hid) -> Hid {
        let caller = Location::caller();
        self.try_dataset_create1(loc, name, dtype, space, dcpl)
            .unwrap_or_else(|e| report_failure(EntryPoint::DatasetCreate1, caller, &e))
    }

    /// Tuned `H5Dcreate1`.
    ///
    /// # Errors
    ///
    /// Returns [`TuneError`] if the document cannot be loaded, the file name
    /// of `loc` cannot be determined, a matching chunk rule is invalid for the
    /// dataspace, or the real call fails.
    pub fn try_dataset_create1(
        &self,
        loc: Hid,
        name: &str,
        dtype: Hid,
        space: Hid,
        dcpl: Hid,
    ) -> Result<Hid> {
        let call = self.begin(EntryPoint::DatasetCreate1);
        let dcpl = self.prepare_dataset_creation(call, loc, name, space, dcpl)?;
        let status = self
            .backend
            .dataset_create1(loc, name, dtype, space, dcpl.id());
        dcpl.forwarded(call.entry, status)
    }

    /// Tuned `H5Dcreate2`; returns a negative identifier on failure.
    #[allow(clippy::too_many_arguments)] // mirrors the library signature
    #[track_caller]
    pub fn dataset_create2(
        &self,
        loc: Hid,
        name: &str,
        dtype: Hid,
        space: Hid,
        lcpl: Hid,
        dcpl: Hid,
        dapl: Hid,
    ) -> Hid {
        let caller = Location::caller();
        self.try_dataset_create2(loc, name, dtype, space, lcpl, dcpl, dapl)
            .unwrap_or_else(|e| report_failure(EntryPoint::DatasetCreate2, caller, &e))
    }

    /// Tuned `H5Dcreate2`.
    ///
    /// # Errors
    ///
    /// Same as [`Tuner::try_dataset_create1`].
    #[allow(clippy::too_many_arguments)] // mirrors the library signature
    pub fn try_dataset_create2(
        &self,
        loc: Hid,
        name: &str,
        dtype: Hid,
        space: Hid,
        lcpl: Hid,
        dcpl: Hid,
        dapl: Hid,
    ) -> Result<Hid> {
        let call = self.begin(EntryPoint::DatasetCreate2);
        let dcpl = self.prepare_dataset_creation(call, loc, name, space, dcpl)?;
        let status = self
            .backend
            .dataset_create2(loc, name, dtype, space, lcpl, dcpl.id(), dapl);
        dcpl.forwarded(call.entry, status)
    }

    /// `H5Dwrite` passthrough; returns the real call's status unchanged.
    pub fn dataset_write(
        &self,
        dataset: Hid,
        mem_type: Hid,
        mem_space: Hid,
        file_space: Hid,
        xfer: Hid,
        buf: &[u8],
    ) -> i32 {
        self.begin(EntryPoint::DatasetWrite);
        self.backend
            .dataset_write(dataset, mem_type, mem_space, file_space, xfer, buf)
    }

    /// `H5Dwrite` passthrough.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Forward`] carrying the real call's status if
    /// it fails.
    pub fn try_dataset_write(
        &self,
        dataset: Hid,
        mem_type: Hid,
        mem_space: Hid,
        file_space: Hid,
        xfer: Hid,
        buf: &[u8],
    ) -> Result<()> {
        let status = self.dataset_write(dataset, mem_type, mem_space, file_space, xfer, buf);
        if status < 0 {
            return Err(BackendError::Forward {
                entry: EntryPoint::DatasetWrite.name(),
                status: i64::from(status),
            }
            .into());
        }
        Ok(())
    }

    fn begin(&self, entry: EntryPoint) -> Call {
        let verbosity = self.settings.verbosity.current();
        LIBRARY_NOTICE.call_once(|| {
            if verbosity.allows(Verbosity::NOTICE) {
                tracing::info!("h5tune library loaded");
            }
        });
        if verbosity.allows(Verbosity::CALLS) {
            tracing::info!("Entering h5tune/{}()", entry.name());
        }
        Call { entry, verbosity }
    }

    fn load_document(&self, call: Call) -> Result<RuleDocument> {
        let path = self.settings.config_path.resolve();
        if call.verbosity.allows(Verbosity::DOCUMENT) {
            tracing::info!("Loading parameters file: {}", path.display());
        }
        RuleDocument::load(&path)
    }

    fn prepare_file_access(&self, call: Call, file: &str, fapl: Hid) -> Result<PreparedFile<'_, B>> {
        let document = self.load_document(call)?;
        let matcher = RuleMatcher::new(self.settings.policy);
        let applier = PropertyApplier::new(&self.backend, call.verbosity);
        let fapl = PlistGuard::acquire(&self.backend, PlistClass::FileAccess, fapl)?;
        let mut renamed = None;

        if self.backend.driver(fapl.id())? == Driver::Mpio {
            let MpioAccess { comm, hints } = self.backend.mpio(fapl.id())?;
            let mut hints = hints.unwrap_or_default();

            let lockless = RuleContext::file(Parameter::LocklessIo, file);
            if let Some(value) = resolve(&matcher, &document, &lockless)? {
                renamed = applier.filename_override(file, &value);
            }
            for parameter in Parameter::HINTS {
                let ctx = RuleContext::file(parameter, file);
                if let Some(value) = resolve(&matcher, &document, &ctx)? {
                    applier.hint(&mut hints, parameter, &value);
                }
            }
            self.backend.set_mpio(fapl.id(), comm, hints)?;
        }

        for parameter in Parameter::FILE_ACCESS {
            let ctx = RuleContext::file(parameter, file);
            if let Some(value) = resolve(&matcher, &document, &ctx)? {
                applier.file_access(fapl.id(), &value)?;
            }
        }

        Ok(PreparedFile { fapl, renamed })
    }

    fn prepare_dataset_creation(
        &self,
        call: Call,
        loc: Hid,
        name: &str,
        space: Hid,
        dcpl: Hid,
    ) -> Result<PlistGuard<'_, B>> {
        let document = self.load_document(call)?;
        let file_name = self.backend.file_name(loc)?;
        let file = file_name.strip_prefix(LOCKLESS_PREFIX).unwrap_or(&file_name);

        let matcher = RuleMatcher::new(self.settings.policy);
        let applier = PropertyApplier::new(&self.backend, call.verbosity);
        let dcpl = PlistGuard::acquire(&self.backend, PlistClass::DatasetCreation, dcpl)?;

        let ctx = RuleContext::dataset(Parameter::Chunk, file, name);
        if let Some(ParsedValue::Chunk(dims)) = resolve(&matcher, &document, &ctx)? {
            applier.chunk(dcpl.id(), space, &dims, &ctx)?;
        }

        Ok(dcpl)
    }
}

/// Finds the rule for `ctx` and parses its value.
///
/// `Ok(None)` means no rule applies and the parameter keeps its default.
fn resolve(matcher: &RuleMatcher, document: &RuleDocument, ctx: &RuleContext<'_>) -> Result<Option<ParsedValue>> {
    let request = MatchRequest {
        parameter: ctx.parameter.name(),
        file: ctx.file,
        variable: ctx.variable,
    };
    let Some(rule) = matcher.find(document, &request) else {
        return Ok(None);
    };
    codec::parse(ctx.parameter.kind(), &rule.value)
        .map(Some)
        .map_err(|source| ctx.invalid(source))
}

/// Logs a failed call with the application's call site and the full error
/// chain, and returns the sentinel.
fn report_failure(entry: EntryPoint, caller: &Location<'_>, err: &TuneError) -> Hid {
    tracing::error!(
        "h5tune/{}() called at {}:{} failed: {}",
        entry.name(),
        caller.file(),
        caller.line(),
        error_chain(err)
    );
    INVALID_HID
}

/// Renders `err` followed by every source not already in its message.
fn error_chain(err: &TuneError) -> String {
    let mut chain = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        // most messages already embed their source
        if !chain.ends_with(&message) {
            chain.push_str(": ");
            chain.push_str(&message);
        }
        source = cause.source();
    }
    chain
}
