//! Recognised tuning parameters.
//!
//! Each parameter has a textual name (the element tag used in rule
//! documents), a value grammar ([`ParameterKind`]) and the configuration
//! object its value is applied to ([`Target`]).

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

/// Literal prepended to the file name when lockless I/O is requested.
pub const LOCKLESS_PREFIX: &str = "bglockless:";

/// A tuning parameter understood by the shim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Parameter {
    /// `IBM_lockless_io`: select the lockless GPFS backend by file-name prefix.
    LocklessIo,
    /// `IBM_largeblock_io`: GPFS large-block I/O hint.
    LargeBlockIo,
    /// `striping_factor`: number of I/O devices to stripe across.
    StripingFactor,
    /// `striping_unit`: stripe size in bytes.
    StripingUnit,
    /// `cb_buffer_size`: collective buffering buffer size.
    CbBufferSize,
    /// `cb_nodes`: number of collective buffering aggregators.
    CbNodes,
    /// `bgl_nodes_pset`: Blue Gene aggregators per processor set.
    BglNodesPset,
    /// `sieve_buf_size`: data sieve buffer size in bytes.
    SieveBufSize,
    /// `alignment`: `threshold,alignment` for file object placement.
    Alignment,
    /// `chunk`: per-axis chunk sizes for a dataset.
    Chunk,
}

/// Value grammar of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ParameterKind {
    /// Set only when the text is exactly `true`.
    Flag,
    /// Free text forwarded verbatim.
    Hint,
    /// Non-negative integer.
    Size,
    /// `threshold,alignment` pair of non-negative integers.
    Pair,
    /// Comma-separated strictly positive integers, one per axis.
    ChunkDims,
}

/// Where a parameter's value ends up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Target {
    /// Rewrites the file name passed to the real entry point.
    FilenameOverride,
    /// The MPI-IO hint map.
    HintMap,
    /// The file-access property list.
    FileAccess,
    /// The dataset-creation property list.
    DatasetCreation,
}

impl Parameter {
    /// Every recognised parameter.
    pub const ALL: [Parameter; 10] = [
        Parameter::LocklessIo,
        Parameter::LargeBlockIo,
        Parameter::StripingFactor,
        Parameter::StripingUnit,
        Parameter::CbBufferSize,
        Parameter::CbNodes,
        Parameter::BglNodesPset,
        Parameter::SieveBufSize,
        Parameter::Alignment,
        Parameter::Chunk,
    ];

    /// Hint-map parameters, in resolution order.
    pub const HINTS: [Parameter; 6] = [
        Parameter::LargeBlockIo,
        Parameter::StripingFactor,
        Parameter::StripingUnit,
        Parameter::CbBufferSize,
        Parameter::CbNodes,
        Parameter::BglNodesPset,
    ];

    /// File-access scalar parameters, in resolution order.
    pub const FILE_ACCESS: [Parameter; 2] = [Parameter::SieveBufSize, Parameter::Alignment];

    /// The element tag naming this parameter in rule documents.
    pub fn name(self) -> &'static str {
        match self {
            Self::LocklessIo => "IBM_lockless_io",
            Self::LargeBlockIo => "IBM_largeblock_io",
            Self::StripingFactor => "striping_factor",
            Self::StripingUnit => "striping_unit",
            Self::CbBufferSize => "cb_buffer_size",
            Self::CbNodes => "cb_nodes",
            Self::BglNodesPset => "bgl_nodes_pset",
            Self::SieveBufSize => "sieve_buf_size",
            Self::Alignment => "alignment",
            Self::Chunk => "chunk",
        }
    }

    /// The grammar this parameter's value is parsed with.
    pub fn kind(self) -> ParameterKind {
        match self {
            Self::LocklessIo => ParameterKind::Flag,
            Self::LargeBlockIo
            | Self::StripingFactor
            | Self::StripingUnit
            | Self::CbBufferSize
            | Self::CbNodes
            | Self::BglNodesPset => ParameterKind::Hint,
            Self::SieveBufSize => ParameterKind::Size,
            Self::Alignment => ParameterKind::Pair,
            Self::Chunk => ParameterKind::ChunkDims,
        }
    }

    /// The configuration object this parameter is applied to.
    pub fn target(self) -> Target {
        match self.kind() {
            ParameterKind::Flag => Target::FilenameOverride,
            ParameterKind::Hint => Target::HintMap,
            ParameterKind::Size | ParameterKind::Pair => Target::FileAccess,
            ParameterKind::ChunkDims => Target::DatasetCreation,
        }
    }

    /// Whether rules for this parameter may carry a variable scope.
    pub fn is_dataset_scoped(self) -> bool {
        self.target() == Target::DatasetCreation
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when parsing an unrecognised parameter name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownParameter(pub String);

impl fmt::Display for UnknownParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown tuning parameter '{}'", self.0)
    }
}

impl std::error::Error for UnknownParameter {}

impl FromStr for Parameter {
    type Err = UnknownParameter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| UnknownParameter(s.to_string()))
    }
}
