//! # h5tune
//!
//! Rule-driven I/O tuning for HDF5 applications.
//!
//! h5tune sits between an application and the HDF5 library. When the
//! application creates or opens a file, or creates a dataset, h5tune reads an
//! XML rule document, picks the rules that apply to that file (and dataset),
//! and applies them to a private copy of the caller's property list before
//! forwarding the call. Applications get tuned striping, collective
//! buffering, alignment and chunking without a code change.
//!
//! **Status**: This crate is in early development. The API is not yet stable.
//!
//! ## Key Properties
//!
//! - The caller's property lists are never modified
//! - First matching rule wins; unscoped rules are fallbacks
//! - Every rule value is validated before it reaches the library
//! - No rule is a normal outcome: the library default stays in effect
//! - No caching and no mutable globals; the document is read on every call
//!
//! ## Quick Start
//!
//! ```rust
//! use h5tune::backend::{Dataspace, DEFAULT_PLIST, Layout};
//! use h5tune::memory::InMemoryBackend;
//! use h5tune::settings::{ConfigPath, TunerSettings, Verbosity, VerbositySource};
//! use h5tune::Tuner;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dir = tempfile::tempdir()?;
//! let config = dir.path().join("config.xml");
//! std::fs::write(&config, r#"
//!     <Parameters>
//!       <sieve_buf_size FileName="data.h5">77</sieve_buf_size>
//!       <chunk FileName="data.h5" VariableName="Data1">6,5</chunk>
//!     </Parameters>"#)?;
//!
//! let settings = TunerSettings::default()
//!     .with_config_path(ConfigPath::Fixed(config))
//!     .with_verbosity(VerbositySource::Fixed(Verbosity::SILENT));
//! let tuner = Tuner::with_settings(InMemoryBackend::new(), settings);
//!
//! let file = tuner.try_file_create("data.h5", 0, DEFAULT_PLIST, DEFAULT_PLIST)?;
//! assert_eq!(tuner.backend().file(file).unwrap().access.sieve_buf_size, 77);
//!
//! let space = tuner.backend().insert_dataspace(Dataspace::fixed(&[24, 24]));
//! let dset = tuner.try_dataset_create2(file, "Data1", 0, space, 0, DEFAULT_PLIST, 0)?;
//! assert_eq!(tuner.backend().dataset(dset).unwrap().layout, Layout::Chunked(vec![6, 5]));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Tuner`]: The interception shim; one method per intercepted entry point
//! - [`RuleDocument`]: Parsed rule set, in document order
//! - [`RuleMatcher`]: First-match-wins rule selection
//! - [`Hdf5Backend`]: The library seam the shim configures and forwards to
//!
//! ## Modules
//!
//! For lower-level access, the individual modules are also public:
//!
//! - [`shim`]: Intercepted entry points and property list ownership
//! - [`document`]: XML rule documents
//! - [`matcher`]: Rule selection and file matching policies
//! - [`params`]: Recognised parameters, their grammars and targets
//! - [`codec`]: Value parsing and validation
//! - [`applier`]: Writing values to their configuration targets
//! - [`hints`]: MPI-IO hint maps
//! - [`backend`]: The library seam
//! - [`memory`]: In-memory backend for tests and dry runs
//! - [`settings`]: Document location, verbosity and match policy
//! - [`error`]: Error types

pub mod applier;
pub mod backend;
pub mod codec;
pub mod document;
pub mod error;
pub mod hints;
pub mod matcher;
pub mod memory;
pub mod params;
pub mod settings;
pub mod shim;

// Re-export primary API types at crate root for convenience.
pub use backend::{Hdf5Backend, Hid};
pub use codec::ParsedValue;
pub use document::{Rule, RuleDocument};
pub use error::{Result, TuneError};
pub use hints::HintMap;
pub use matcher::{FileMatchPolicy, MatchRequest, RuleMatcher};
pub use params::Parameter;
pub use settings::TunerSettings;
pub use shim::Tuner;
