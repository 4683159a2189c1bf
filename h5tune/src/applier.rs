//! Applying resolved values to their configuration targets.
//!
//! [`PropertyApplier`] takes a value that already passed
//! [`crate::codec::parse`] and writes it to the object its parameter targets:
//! the file name, the MPI-IO hint map, the file-access list or the
//! dataset-creation list. Chunk values get one more check here, against the
//! shape of the dataspace they will be used with.

use crate::backend::{Hdf5Backend, Hid};
use crate::codec::ParsedValue;
use crate::error::{Result, TuneError, ValueError};
use crate::hints::HintMap;
use crate::params::{LOCKLESS_PREFIX, Parameter};
use crate::settings::Verbosity;

/// The parameter and target a value was resolved for.
///
/// Used to attach scope to value errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleContext<'a> {
    /// The parameter being applied.
    pub parameter: Parameter,
    /// Target file path.
    pub file: &'a str,
    /// Target dataset, for dataset-creation parameters.
    pub variable: Option<&'a str>,
}

impl<'a> RuleContext<'a> {
    /// Context for a file-level parameter.
    pub fn file(parameter: Parameter, file: &'a str) -> Self {
        Self {
            parameter,
            file,
            variable: None,
        }
    }

    /// Context for a dataset-level parameter.
    pub fn dataset(parameter: Parameter, file: &'a str, variable: &'a str) -> Self {
        Self {
            parameter,
            file,
            variable: Some(variable),
        }
    }

    /// Wraps `source` into a [`TuneError::InvalidRule`] scoped to this context.
    pub fn invalid(&self, source: ValueError) -> TuneError {
        TuneError::InvalidRule {
            parameter: self.parameter.name().to_string(),
            file: self.file.to_string(),
            variable: self.variable.map(str::to_string),
            source,
        }
    }
}

/// Writes parsed values to the backend's configuration objects.
#[derive(Debug)]
pub struct PropertyApplier<'b, B: ?Sized> {
    backend: &'b B,
    verbosity: Verbosity,
}

impl<'b, B: Hdf5Backend + ?Sized> PropertyApplier<'b, B> {
    /// Creates an applier; settings are reported when `verbosity` allows it.
    pub fn new(backend: &'b B, verbosity: Verbosity) -> Self {
        Self { backend, verbosity }
    }

    /// The file name to forward when lockless I/O is requested.
    ///
    /// Returns `Some` with the prefixed name only for a `true` flag.
    ///
    /// ```rust
    /// use h5tune::applier::PropertyApplier;
    /// use h5tune::codec::ParsedValue;
    /// use h5tune::memory::InMemoryBackend;
    /// use h5tune::settings::Verbosity;
    ///
    /// let backend = InMemoryBackend::new();
    /// let applier = PropertyApplier::new(&backend, Verbosity::SILENT);
    /// assert_eq!(
    ///     applier.filename_override("/gpfs/run/data.h5", &ParsedValue::Flag(true)).as_deref(),
    ///     Some("bglockless:/gpfs/run/data.h5")
    /// );
    /// assert_eq!(applier.filename_override("data.h5", &ParsedValue::Flag(false)), None);
    /// ```
    pub fn filename_override(&self, path: &str, value: &ParsedValue) -> Option<String> {
        match value {
            ParsedValue::Flag(true) => {
                let name = format!("{LOCKLESS_PREFIX}{path}");
                self.report(format_args!("Setting file name to {name}"));
                Some(name)
            }
            _ => None,
        }
    }

    /// Stores a hint value in `hints` under the parameter's name.
    ///
    /// Non-hint values are ignored.
    pub fn hint(&self, hints: &mut HintMap, parameter: Parameter, value: &ParsedValue) {
        if let ParsedValue::Hint(text) = value {
            self.report(format_args!("Setting {parameter} to {text}"));
            hints.set(parameter.name(), text.as_str());
        }
    }

    /// Applies a sieve buffer size or alignment pair to a file-access list.
    ///
    /// Other values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`TuneError::Backend`] if the library rejects the setting.
    pub fn file_access(&self, fapl: Hid, value: &ParsedValue) -> Result<()> {
        match *value {
            ParsedValue::Size(size) => {
                self.report(format_args!("Setting sieve_buf_size to {size}"));
                self.backend.set_sieve_buf_size(fapl, size)?;
            }
            ParsedValue::Alignment {
                threshold,
                alignment,
            } => {
                self.report(format_args!("Setting alignment to {threshold},{alignment}"));
                self.backend.set_alignment(fapl, threshold, alignment)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Sets a chunked layout on `dcpl` after checking `dims` against the
    /// dataspace `space`.
    ///
    /// The chunk must have one entry per axis, and no entry may exceed the
    /// axis' maximum extent. Unlimited axes accept any size.
    ///
    /// # Errors
    ///
    /// - [`TuneError::InvalidRule`] with [`ValueError::RankMismatch`] or
    ///   [`ValueError::ChunkExceedsExtent`] when the shape check fails
    /// - [`TuneError::Backend`] if the dataspace query or the layout update
    ///   fails
    pub fn chunk(&self, dcpl: Hid, space: Hid, dims: &[u64], ctx: &RuleContext<'_>) -> Result<()> {
        let shape = self.backend.dataspace(space)?;

        if dims.len() != shape.rank() {
            return Err(ctx.invalid(ValueError::RankMismatch {
                rank: shape.rank(),
                found: dims.len(),
            }));
        }
        for (axis, (&chunk, extent)) in dims.iter().zip(&shape.max_dims).enumerate() {
            if let Some(extent) = *extent
                && chunk > extent
            {
                return Err(ctx.invalid(ValueError::ChunkExceedsExtent {
                    axis,
                    chunk,
                    extent,
                }));
            }
        }

        self.report(format_args!("Setting chunk to {}", join_dims(dims)));
        self.backend.set_chunk(dcpl, dims)?;
        Ok(())
    }

    fn report(&self, message: std::fmt::Arguments<'_>) {
        if self.verbosity.allows(Verbosity::SETTINGS) {
            tracing::info!("{message}");
        }
    }
}

fn join_dims(dims: &[u64]) -> String {
    dims.iter()
        .map(u64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Dataspace, Layout, PlistClass};
    use crate::error::BackendError;
    use crate::memory::{DEFAULT_ALIGNMENT, InMemoryBackend};

    fn applier(backend: &InMemoryBackend) -> PropertyApplier<'_, InMemoryBackend> {
        PropertyApplier::new(backend, Verbosity::SILENT)
    }

    #[test]
    fn test_hint_is_stored_verbatim() {
        let backend = InMemoryBackend::new();
        let mut hints = HintMap::new();
        hints.set("cb_nodes", "2");

        applier(&backend).hint(
            &mut hints,
            Parameter::CbNodes,
            &ParsedValue::Hint("16".to_string()),
        );
        applier(&backend).hint(
            &mut hints,
            Parameter::LargeBlockIo,
            &ParsedValue::Hint("true".to_string()),
        );

        assert_eq!(hints.get("cb_nodes"), Some("16"));
        assert_eq!(hints.get("IBM_largeblock_io"), Some("true"));
        assert_eq!(hints.len(), 2);
    }

    #[test]
    fn test_file_access_settings() {
        let backend = InMemoryBackend::new();
        let fapl = backend.create_plist(PlistClass::FileAccess).unwrap();

        applier(&backend)
            .file_access(fapl, &ParsedValue::Size(77))
            .unwrap();
        assert_eq!(backend.sieve_buf_size(fapl).unwrap(), 77);
        assert_eq!(backend.alignment(fapl).unwrap(), DEFAULT_ALIGNMENT);

        applier(&backend)
            .file_access(
                fapl,
                &ParsedValue::Alignment {
                    threshold: 88,
                    alignment: 44,
                },
            )
            .unwrap();
        assert_eq!(backend.alignment(fapl).unwrap(), (88, 44));
    }

    #[test]
    fn test_file_access_backend_failure() {
        let backend = InMemoryBackend::new();
        let fapl = backend.create_plist(PlistClass::FileAccess).unwrap();
        backend.fail("H5Pset_alignment");

        let err = applier(&backend)
            .file_access(
                fapl,
                &ParsedValue::Alignment {
                    threshold: 88,
                    alignment: 44,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            TuneError::Backend(BackendError::Call {
                operation: "H5Pset_alignment",
                ..
            })
        ));
    }

    #[test]
    fn test_chunk_applied() {
        let backend = InMemoryBackend::new();
        let dcpl = backend.create_plist(PlistClass::DatasetCreation).unwrap();
        let space = backend.insert_dataspace(Dataspace::fixed(&[24, 24]));
        let ctx = RuleContext::dataset(Parameter::Chunk, "data.h5", "Data1");

        applier(&backend).chunk(dcpl, space, &[6, 5], &ctx).unwrap();
        assert_eq!(backend.layout(dcpl).unwrap(), Layout::Chunked(vec![6, 5]));
    }

    #[test]
    fn test_chunk_rank_mismatch() {
        let backend = InMemoryBackend::new();
        let dcpl = backend.create_plist(PlistClass::DatasetCreation).unwrap();
        let space = backend.insert_dataspace(Dataspace::fixed(&[24, 24]));
        let ctx = RuleContext::dataset(Parameter::Chunk, "data.h5", "Data1");

        let err = applier(&backend).chunk(dcpl, space, &[6], &ctx).unwrap_err();
        assert!(matches!(
            err,
            TuneError::InvalidRule {
                source: ValueError::RankMismatch { rank: 2, found: 1 },
                ..
            }
        ));
        assert_eq!(backend.layout(dcpl).unwrap(), Layout::Contiguous);
    }

    #[test]
    fn test_chunk_exceeds_fixed_extent() {
        let backend = InMemoryBackend::new();
        let dcpl = backend.create_plist(PlistClass::DatasetCreation).unwrap();
        let space = backend.insert_dataspace(Dataspace::fixed(&[24, 4]));
        let ctx = RuleContext::dataset(Parameter::Chunk, "data.h5", "Data1");

        let err = applier(&backend).chunk(dcpl, space, &[6, 5], &ctx).unwrap_err();
        assert!(matches!(
            err,
            TuneError::InvalidRule {
                source: ValueError::ChunkExceedsExtent {
                    axis: 1,
                    chunk: 5,
                    extent: 4
                },
                ..
            }
        ));
    }

    #[test]
    fn test_chunk_on_unlimited_axis() {
        let backend = InMemoryBackend::new();
        let dcpl = backend.create_plist(PlistClass::DatasetCreation).unwrap();
        let space = backend.insert_dataspace(Dataspace {
            dims: vec![0, 4],
            max_dims: vec![None, Some(4)],
        });
        let ctx = RuleContext::dataset(Parameter::Chunk, "data.h5", "Series");

        applier(&backend).chunk(dcpl, space, &[1024, 4], &ctx).unwrap();
        assert_eq!(backend.layout(dcpl).unwrap(), Layout::Chunked(vec![1024, 4]));
    }

    #[test]
    fn test_context_error_scope() {
        let ctx = RuleContext::file(Parameter::Alignment, "data.h5");
        let err = ctx.invalid(ValueError::Empty);
        assert!(matches!(
            err,
            TuneError::InvalidRule { ref parameter, variable: None, .. } if parameter == "alignment"
        ));
    }
}
