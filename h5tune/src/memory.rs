//! In-memory implementation of [`Hdf5Backend`].
//!
//! [`InMemoryBackend`] simulates the parts of the library the tuning layer
//! touches: property lists with library defaults, MPI-IO access settings,
//! dataspaces, and files and datasets created through the real entry points.
//! It also keeps an account of which property lists were closed and which
//! were consumed by a successful entry point, so ownership discipline can be
//! checked, and lets any operation be made to fail on demand.
//!
//! ```rust
//! use h5tune::backend::{Hdf5Backend, PlistClass, DEFAULT_PLIST};
//! use h5tune::memory::InMemoryBackend;
//!
//! let backend = InMemoryBackend::new();
//! let fapl = backend.create_plist(PlistClass::FileAccess).unwrap();
//! backend.set_sieve_buf_size(fapl, 77).unwrap();
//!
//! let file = backend.file_create("data.h5", 0, DEFAULT_PLIST, fapl);
//! assert!(file >= 0);
//! assert_eq!(backend.file(file).unwrap().access.sieve_buf_size, 77);
//! assert_eq!(backend.consumed_plists(), vec![fapl]);
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::backend::{
    BackendResult, Comm, DEFAULT_PLIST, Dataspace, Driver, Hdf5Backend, Hid, INVALID_HID, Layout,
    MpioAccess, PlistClass,
};
use crate::error::BackendError;
use crate::hints::HintMap;

/// Library default sieve buffer size (64 KiB).
pub const DEFAULT_SIEVE_BUF_SIZE: u64 = 65_536;

/// Library default `(threshold, alignment)`.
pub const DEFAULT_ALIGNMENT: (u64, u64) = (1, 1);

/// First identifier handed out; everything below is reserved.
const FIRST_ID: Hid = 100;

/// Settings held by a file-access property list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileAccessProps {
    /// Configured driver.
    pub driver: Driver,
    /// Communicator, for MPI-IO lists.
    pub comm: Option<Comm>,
    /// Attached hint map, for MPI-IO lists.
    pub hints: Option<HintMap>,
    /// Sieve buffer size in bytes.
    pub sieve_buf_size: u64,
    /// `(threshold, alignment)`.
    pub alignment: (u64, u64),
}

impl Default for FileAccessProps {
    fn default() -> Self {
        Self {
            driver: Driver::Sec2,
            comm: None,
            hints: None,
            sieve_buf_size: DEFAULT_SIEVE_BUF_SIZE,
            alignment: DEFAULT_ALIGNMENT,
        }
    }
}

/// Settings held by a dataset-creation property list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetCreationProps {
    /// Storage layout.
    pub layout: Layout,
}

impl Default for DatasetCreationProps {
    fn default() -> Self {
        Self {
            layout: Layout::Contiguous,
        }
    }
}

/// A simulated property list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PropertyList {
    /// File-access list.
    FileAccess(FileAccessProps),
    /// Dataset-creation list.
    DatasetCreation(DatasetCreationProps),
}

/// A file created or opened through the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    /// The name exactly as passed to the entry point.
    pub name: String,
    /// Access flags.
    pub flags: u32,
    /// The access settings the file was opened with.
    pub access: FileAccessProps,
    /// Whether the file came from `file_create` rather than `file_open`.
    pub created: bool,
}

/// A dataset created through the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetRecord {
    /// The containing file.
    pub file: Hid,
    /// Dataset name.
    pub name: String,
    /// Dataset shape.
    pub space: Dataspace,
    /// Layout the dataset was created with.
    pub layout: Layout,
}

#[derive(Debug)]
struct State {
    next_id: Hid,
    plists: HashMap<Hid, PropertyList>,
    spaces: HashMap<Hid, Dataspace>,
    files: HashMap<Hid, FileRecord>,
    datasets: HashMap<Hid, DatasetRecord>,
    failing: HashSet<&'static str>,
    write_status: Option<i32>,
    closed: Vec<Hid>,
    consumed: Vec<Hid>,
    writes: usize,
}

impl State {
    fn allocate(&mut self) -> Hid {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn check(&self, operation: &'static str) -> BackendResult<()> {
        if self.failing.contains(operation) {
            return Err(BackendError::Call {
                operation,
                status: -1,
            });
        }
        Ok(())
    }

    fn fapl(&mut self, operation: &'static str, id: Hid) -> BackendResult<&mut FileAccessProps> {
        self.check(operation)?;
        match self.plists.get_mut(&id) {
            Some(PropertyList::FileAccess(props)) => Ok(props),
            _ => Err(BackendError::UnknownHandle {
                operation,
                handle: id,
                expected: "file-access property list",
            }),
        }
    }

    fn dcpl(&mut self, operation: &'static str, id: Hid) -> BackendResult<&mut DatasetCreationProps> {
        self.check(operation)?;
        match self.plists.get_mut(&id) {
            Some(PropertyList::DatasetCreation(props)) => Ok(props),
            _ => Err(BackendError::UnknownHandle {
                operation,
                handle: id,
                expected: "dataset-creation property list",
            }),
        }
    }

    /// Resolves the access settings for an entry point, consuming `fapl`.
    fn take_fapl(&mut self, fapl: Hid) -> Option<FileAccessProps> {
        if fapl == DEFAULT_PLIST {
            return Some(FileAccessProps::default());
        }
        match self.plists.remove(&fapl) {
            Some(PropertyList::FileAccess(props)) => {
                self.consumed.push(fapl);
                Some(props)
            }
            Some(other) => {
                self.plists.insert(fapl, other);
                None
            }
            None => None,
        }
    }

    fn create_dataset(&mut self, operation: &'static str, loc: Hid, name: &str, space: Hid, dcpl: Hid) -> Hid {
        if self.check(operation).is_err() {
            return INVALID_HID;
        }
        let file = match (self.files.contains_key(&loc), self.datasets.get(&loc)) {
            (true, _) => loc,
            (false, Some(dataset)) => dataset.file,
            (false, None) => return INVALID_HID,
        };
        let Some(space) = self.spaces.get(&space).cloned() else {
            return INVALID_HID;
        };

        let layout = if dcpl == DEFAULT_PLIST {
            Layout::Contiguous
        } else {
            match self.plists.get(&dcpl) {
                Some(PropertyList::DatasetCreation(props)) => props.layout.clone(),
                _ => return INVALID_HID,
            }
        };
        if let Layout::Chunked(dims) = &layout
            && dims.len() != space.rank()
        {
            return INVALID_HID;
        }

        if dcpl != DEFAULT_PLIST {
            self.plists.remove(&dcpl);
            self.consumed.push(dcpl);
        }

        let id = self.allocate();
        self.datasets.insert(
            id,
            DatasetRecord {
                file,
                name: name.to_string(),
                space,
                layout,
            },
        );
        id
    }
}

/// Simulated I/O library for tests and dry runs.
///
/// Single-threaded: state lives in a `RefCell`.
#[derive(Debug)]
pub struct InMemoryBackend {
    state: RefCell<State>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self {
            state: RefCell::new(State {
                next_id: FIRST_ID,
                plists: HashMap::new(),
                spaces: HashMap::new(),
                files: HashMap::new(),
                datasets: HashMap::new(),
                failing: HashSet::new(),
                write_status: None,
                closed: Vec::new(),
                consumed: Vec::new(),
                writes: 0,
            }),
        }
    }

    /// Registers a property list owned by the caller.
    pub fn insert_plist(&self, plist: PropertyList) -> Hid {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.plists.insert(id, plist);
        id
    }

    /// Registers an MPI-IO file-access list owned by the caller.
    pub fn mpio_file_access(&self, comm: Comm, hints: Option<HintMap>) -> Hid {
        self.insert_plist(PropertyList::FileAccess(FileAccessProps {
            driver: Driver::Mpio,
            comm: Some(comm),
            hints,
            ..FileAccessProps::default()
        }))
    }

    /// Registers a dataspace.
    pub fn insert_dataspace(&self, space: Dataspace) -> Hid {
        let mut state = self.state.borrow_mut();
        let id = state.allocate();
        state.spaces.insert(id, space);
        id
    }

    /// Snapshot of a live property list.
    pub fn plist(&self, id: Hid) -> Option<PropertyList> {
        self.state.borrow().plists.get(&id).cloned()
    }

    /// Snapshot of a file record.
    pub fn file(&self, id: Hid) -> Option<FileRecord> {
        self.state.borrow().files.get(&id).cloned()
    }

    /// Snapshot of a dataset record.
    pub fn dataset(&self, id: Hid) -> Option<DatasetRecord> {
        self.state.borrow().datasets.get(&id).cloned()
    }

    /// Makes every subsequent call to `operation` fail.
    ///
    /// Operation names are the library function names, e.g. `H5Fcreate`
    /// or `H5Pset_alignment`.
    pub fn fail(&self, operation: &'static str) {
        self.state.borrow_mut().failing.insert(operation);
    }

    /// Makes every subsequent `dataset_write` return `status`.
    pub fn fail_writes_with(&self, status: i32) {
        self.state.borrow_mut().write_status = Some(status);
    }

    /// Undoes [`InMemoryBackend::fail`].
    pub fn recover(&self, operation: &'static str) {
        self.state.borrow_mut().failing.remove(operation);
    }

    /// Property lists released through `close_plist`, in order.
    pub fn closed_plists(&self) -> Vec<Hid> {
        self.state.borrow().closed.clone()
    }

    /// Property lists taken over by successful entry points, in order.
    pub fn consumed_plists(&self) -> Vec<Hid> {
        self.state.borrow().consumed.clone()
    }

    /// Number of property lists still alive.
    pub fn live_plists(&self) -> usize {
        self.state.borrow().plists.len()
    }

    /// Number of successful `dataset_write` calls.
    pub fn writes(&self) -> usize {
        self.state.borrow().writes
    }
}

impl Hdf5Backend for InMemoryBackend {
    fn create_plist(&self, class: PlistClass) -> BackendResult<Hid> {
        let mut state = self.state.borrow_mut();
        state.check("H5Pcreate")?;
        let plist = match class {
            PlistClass::FileAccess => PropertyList::FileAccess(FileAccessProps::default()),
            PlistClass::DatasetCreation => {
                PropertyList::DatasetCreation(DatasetCreationProps::default())
            }
        };
        let id = state.allocate();
        state.plists.insert(id, plist);
        Ok(id)
    }

    fn copy_plist(&self, plist: Hid) -> BackendResult<Hid> {
        let mut state = self.state.borrow_mut();
        state.check("H5Pcopy")?;
        let copy = state
            .plists
            .get(&plist)
            .cloned()
            .ok_or(BackendError::UnknownHandle {
                operation: "H5Pcopy",
                handle: plist,
                expected: "property list",
            })?;
        let id = state.allocate();
        state.plists.insert(id, copy);
        Ok(id)
    }

    fn close_plist(&self, plist: Hid) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.check("H5Pclose")?;
        if state.plists.remove(&plist).is_none() {
            return Err(BackendError::UnknownHandle {
                operation: "H5Pclose",
                handle: plist,
                expected: "property list",
            });
        }
        state.closed.push(plist);
        Ok(())
    }

    fn driver(&self, fapl: Hid) -> BackendResult<Driver> {
        let mut state = self.state.borrow_mut();
        Ok(state.fapl("H5Pget_driver", fapl)?.driver)
    }

    fn mpio(&self, fapl: Hid) -> BackendResult<MpioAccess> {
        let mut state = self.state.borrow_mut();
        let props = state.fapl("H5Pget_fapl_mpio", fapl)?;
        match (props.driver, props.comm) {
            (Driver::Mpio, Some(comm)) => Ok(MpioAccess {
                comm,
                hints: props.hints.clone(),
            }),
            _ => Err(BackendError::Call {
                operation: "H5Pget_fapl_mpio",
                status: -1,
            }),
        }
    }

    fn set_mpio(&self, fapl: Hid, comm: Comm, hints: HintMap) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let props = state.fapl("H5Pset_fapl_mpio", fapl)?;
        props.driver = Driver::Mpio;
        props.comm = Some(comm);
        props.hints = Some(hints);
        Ok(())
    }

    fn sieve_buf_size(&self, fapl: Hid) -> BackendResult<u64> {
        let mut state = self.state.borrow_mut();
        Ok(state.fapl("H5Pget_sieve_buf_size", fapl)?.sieve_buf_size)
    }

    fn set_sieve_buf_size(&self, fapl: Hid, size: u64) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.fapl("H5Pset_sieve_buf_size", fapl)?.sieve_buf_size = size;
        Ok(())
    }

    fn alignment(&self, fapl: Hid) -> BackendResult<(u64, u64)> {
        let mut state = self.state.borrow_mut();
        Ok(state.fapl("H5Pget_alignment", fapl)?.alignment)
    }

    fn set_alignment(&self, fapl: Hid, threshold: u64, alignment: u64) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        state.fapl("H5Pset_alignment", fapl)?.alignment = (threshold, alignment);
        Ok(())
    }

    fn layout(&self, dcpl: Hid) -> BackendResult<Layout> {
        let mut state = self.state.borrow_mut();
        Ok(state.dcpl("H5Pget_layout", dcpl)?.layout.clone())
    }

    fn set_chunk(&self, dcpl: Hid, dims: &[u64]) -> BackendResult<()> {
        let mut state = self.state.borrow_mut();
        let props = state.dcpl("H5Pset_chunk", dcpl)?;
        if dims.is_empty() || dims.contains(&0) {
            return Err(BackendError::Call {
                operation: "H5Pset_chunk",
                status: -1,
            });
        }
        props.layout = Layout::Chunked(dims.to_vec());
        Ok(())
    }

    fn dataspace(&self, space: Hid) -> BackendResult<Dataspace> {
        let state = self.state.borrow();
        state.check("H5Sget_simple_extent_dims")?;
        state
            .spaces
            .get(&space)
            .cloned()
            .ok_or(BackendError::UnknownHandle {
                operation: "H5Sget_simple_extent_dims",
                handle: space,
                expected: "dataspace",
            })
    }

    fn file_name(&self, loc: Hid) -> BackendResult<String> {
        let state = self.state.borrow();
        state.check("H5Fget_name")?;
        let file = state
            .datasets
            .get(&loc)
            .map_or(loc, |dataset| dataset.file);
        state
            .files
            .get(&file)
            .map(|record| record.name.clone())
            .ok_or(BackendError::UnknownHandle {
                operation: "H5Fget_name",
                handle: loc,
                expected: "file or dataset",
            })
    }

    fn file_create(&self, name: &str, flags: u32, _fcpl: Hid, fapl: Hid) -> Hid {
        let mut state = self.state.borrow_mut();
        if state.check("H5Fcreate").is_err() {
            return INVALID_HID;
        }
        let Some(access) = state.take_fapl(fapl) else {
            return INVALID_HID;
        };
        let id = state.allocate();
        state.files.insert(
            id,
            FileRecord {
                name: name.to_string(),
                flags,
                access,
                created: true,
            },
        );
        id
    }

    fn file_open(&self, name: &str, flags: u32, fapl: Hid) -> Hid {
        let mut state = self.state.borrow_mut();
        if state.check("H5Fopen").is_err() {
            return INVALID_HID;
        }
        let Some(access) = state.take_fapl(fapl) else {
            return INVALID_HID;
        };
        let id = state.allocate();
        state.files.insert(
            id,
            FileRecord {
                name: name.to_string(),
                flags,
                access,
                created: false,
            },
        );
        id
    }

    fn dataset_create1(&self, loc: Hid, name: &str, _dtype: Hid, space: Hid, dcpl: Hid) -> Hid {
        self.state
            .borrow_mut()
            .create_dataset("H5Dcreate1", loc, name, space, dcpl)
    }

    fn dataset_create2(
        &self,
        loc: Hid,
        name: &str,
        _dtype: Hid,
        space: Hid,
        _lcpl: Hid,
        dcpl: Hid,
        _dapl: Hid,
    ) -> Hid {
        self.state
            .borrow_mut()
            .create_dataset("H5Dcreate2", loc, name, space, dcpl)
    }

    fn dataset_write(
        &self,
        dataset: Hid,
        _mem_type: Hid,
        _mem_space: Hid,
        _file_space: Hid,
        _xfer: Hid,
        _buf: &[u8],
    ) -> i32 {
        let mut state = self.state.borrow_mut();
        if let Some(status) = state.write_status {
            return status;
        }
        if state.check("H5Dwrite").is_err() || !state.datasets.contains_key(&dataset) {
            return -1;
        }
        state.writes += 1;
        0
    }
}
