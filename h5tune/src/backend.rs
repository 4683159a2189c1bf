//! The underlying I/O library, seen from the tuning layer.
//!
//! [`Hdf5Backend`] is the seam between the rule engine and the real library:
//! property-list manipulation, dataspace and file queries, and the real entry
//! points the shim forwards to. A production build binds these to the C
//! library; [`crate::memory::InMemoryBackend`] provides a complete simulation
//! for tests and dry runs.
//!
//! Handles follow the library's integer-identifier convention: non-negative
//! values name live objects, [`DEFAULT_PLIST`] asks for library defaults and
//! negative values signal failure.

use serde::Serialize;

use crate::error::BackendError;
use crate::hints::HintMap;

/// Integer identifier for a library object (property list, file, dataset...).
pub type Hid = i64;

/// Sentinel returned by failed entry points.
pub const INVALID_HID: Hid = -1;

/// Stand-in for "use the library default property list".
pub const DEFAULT_PLIST: Hid = 0;

/// Type alias for results of collaborator calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Property list classes the tuning layer creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PlistClass {
    /// File-access property list.
    FileAccess,
    /// Dataset-creation property list.
    DatasetCreation,
}

/// Low-level file driver configured on a file-access property list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Driver {
    /// The default POSIX driver.
    Sec2,
    /// The MPI-IO driver; the only distributed access mode.
    Mpio,
}

/// Opaque communicator handle attached to an MPI-IO file-access list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Comm(pub i64);

/// Communicator and hints fetched from an MPI-IO file-access list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MpioAccess {
    /// The communicator the file is opened on.
    pub comm: Comm,
    /// The hint map currently attached, if any.
    pub hints: Option<HintMap>,
}

/// Storage layout of a dataset-creation property list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Layout {
    /// Data stored in one contiguous block (library default).
    Contiguous,
    /// Data stored in chunks of the given per-axis size.
    Chunked(Vec<u64>),
}

/// Shape of a simple dataspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dataspace {
    /// Current extent of each axis.
    pub dims: Vec<u64>,
    /// Maximum extent of each axis; `None` for unlimited axes.
    pub max_dims: Vec<Option<u64>>,
}

impl Dataspace {
    /// A fixed-size dataspace whose maximum extents equal its current ones.
    pub fn fixed(dims: &[u64]) -> Self {
        Self {
            dims: dims.to_vec(),
            max_dims: dims.iter().copied().map(Some).collect(),
        }
    }

    /// Number of axes.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }
}

/// The real I/O library the shim augments and forwards to.
///
/// Methods take `&self`: the library is process-global state, so
/// implementations manage their own interior mutability. A successful
/// `file_create`, `file_open`, `dataset_create1` or `dataset_create2` takes
/// ownership of the property list passed to it; the caller must not close it
/// afterwards. On failure ownership stays with the caller.
pub trait Hdf5Backend {
    /// Creates a property list of the given class with library defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if the library refuses the creation.
    fn create_plist(&self, class: PlistClass) -> BackendResult<Hid>;

    /// Copies an existing property list.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `plist` is not a live property list.
    fn copy_plist(&self, plist: Hid) -> BackendResult<Hid>;

    /// Releases a property list.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `plist` is not a live property list.
    fn close_plist(&self, plist: Hid) -> BackendResult<()>;

    /// Returns the file driver configured on a file-access list.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `fapl` is not a file-access list.
    fn driver(&self, fapl: Hid) -> BackendResult<Driver>;

    /// Returns the communicator and hint map of an MPI-IO file-access list.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `fapl` is not an MPI-IO file-access list.
    fn mpio(&self, fapl: Hid) -> BackendResult<MpioAccess>;

    /// Configures MPI-IO on a file-access list, taking ownership of `hints`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `fapl` is not a file-access list.
    fn set_mpio(&self, fapl: Hid, comm: Comm, hints: HintMap) -> BackendResult<()>;

    /// Returns the sieve buffer size of a file-access list.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `fapl` is not a file-access list.
    fn sieve_buf_size(&self, fapl: Hid) -> BackendResult<u64>;

    /// Sets the sieve buffer size of a file-access list.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `fapl` is not a file-access list.
    fn set_sieve_buf_size(&self, fapl: Hid, size: u64) -> BackendResult<()>;

    /// Returns the `(threshold, alignment)` pair of a file-access list.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `fapl` is not a file-access list.
    fn alignment(&self, fapl: Hid) -> BackendResult<(u64, u64)>;

    /// Sets the `(threshold, alignment)` pair of a file-access list.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `fapl` is not a file-access list or the
    /// library rejects the values.
    fn set_alignment(&self, fapl: Hid, threshold: u64, alignment: u64) -> BackendResult<()>;

    /// Returns the layout of a dataset-creation list.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `dcpl` is not a dataset-creation list.
    fn layout(&self, dcpl: Hid) -> BackendResult<Layout>;

    /// Sets a chunked layout with the given per-axis chunk sizes.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `dcpl` is not a dataset-creation list or
    /// the library rejects the dimensions.
    fn set_chunk(&self, dcpl: Hid, dims: &[u64]) -> BackendResult<()>;

    /// Returns the shape of a dataspace.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `space` is not a dataspace.
    fn dataspace(&self, space: Hid) -> BackendResult<Dataspace>;

    /// Returns the name of the file containing the object `loc`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] if `loc` does not belong to an open file.
    fn file_name(&self, loc: Hid) -> BackendResult<String>;

    /// Real `H5Fcreate`.
    fn file_create(&self, name: &str, flags: u32, fcpl: Hid, fapl: Hid) -> Hid;

    /// Real `H5Fopen`.
    fn file_open(&self, name: &str, flags: u32, fapl: Hid) -> Hid;

    /// Real `H5Dcreate1`.
    fn dataset_create1(&self, loc: Hid, name: &str, dtype: Hid, space: Hid, dcpl: Hid) -> Hid;

    /// Real `H5Dcreate2`.
    #[allow(clippy::too_many_arguments)] // mirrors the library signature
    fn dataset_create2(
        &self,
        loc: Hid,
        name: &str,
        dtype: Hid,
        space: Hid,
        lcpl: Hid,
        dcpl: Hid,
        dapl: Hid,
    ) -> Hid;

    /// Real `H5Dwrite`; returns a negative status on failure.
    fn dataset_write(
        &self,
        dataset: Hid,
        mem_type: Hid,
        mem_space: Hid,
        file_space: Hid,
        xfer: Hid,
        buf: &[u8],
    ) -> i32;
}
