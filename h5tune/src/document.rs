//! Rule documents.
//!
//! A rule document is an XML tree in which every element is a candidate
//! rule: the tag names the parameter, the optional `FileName` and
//! `VariableName` attributes scope it, and the element text is its value.
//! Elements may be nested arbitrarily; rules are kept in document order
//! (pre-order), which is the order [`crate::matcher::RuleMatcher`] consults
//! them in.
//!
//! ```xml
//! <Parameters>
//!   <High_Level_IO_Library>
//!     <alignment FileName="data.h5">88,44</alignment>
//!     <chunk FileName="data.h5" VariableName="Data1">6,5</chunk>
//!   </High_Level_IO_Library>
//!   <Middleware_Layer>
//!     <cb_nodes>16</cb_nodes>
//!   </Middleware_Layer>
//!   <Parallel_File_System>
//!     <striping_factor FileName="data.h5">7</striping_factor>
//!   </Parallel_File_System>
//! </Parameters>
//! ```
//!
//! Documents are loaded fresh for every intercepted call and never cached.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{DocumentError, Result};

/// Attribute restricting a rule to one file.
pub const FILE_NAME_ATTR: &str = "FileName";

/// Attribute restricting a dataset rule to one dataset.
pub const VARIABLE_NAME_ATTR: &str = "VariableName";

/// Path reported for documents parsed from in-memory text.
const INLINE_SOURCE: &str = "<inline>";

/// One scoped tuning directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rule {
    /// Parameter name (the element tag).
    pub parameter: String,
    /// File scope; `None` applies to every file.
    pub file_name: Option<String>,
    /// Dataset scope; `None` applies to every dataset.
    pub variable_name: Option<String>,
    /// Raw text value, trimmed of surrounding whitespace.
    pub value: String,
}

impl Rule {
    /// Creates an unscoped rule.
    pub fn new(parameter: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            parameter: parameter.into(),
            file_name: None,
            variable_name: None,
            value: value.into(),
        }
    }

    /// Restricts the rule to files named `file_name`.
    #[must_use]
    pub fn for_file(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    /// Restricts the rule to datasets named `variable_name`.
    #[must_use]
    pub fn for_variable(mut self, variable_name: impl Into<String>) -> Self {
        self.variable_name = Some(variable_name.into());
        self
    }
}

/// The parsed rule set of one configuration source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleDocument {
    /// Where the document came from.
    source: PathBuf,
    /// Every element of the tree, in document order.
    rules: Vec<Rule>,
}

impl RuleDocument {
    /// Builds a document from rules already in document order.
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self {
            source: PathBuf::from(INLINE_SOURCE),
            rules,
        }
    }

    /// Parses a document from XML text.
    ///
    /// # Errors
    ///
    /// Returns [`DocumentError::Parse`] if the text is not well-formed XML.
    pub fn from_xml_str(text: &str) -> Result<Self> {
        Self::parse(text, PathBuf::from(INLINE_SOURCE))
    }

    /// Reads and parses the document at `path`.
    ///
    /// The file is read in one go and closed before parsing begins.
    ///
    /// # Errors
    ///
    /// - [`DocumentError::Read`] if the file cannot be opened or read
    /// - [`DocumentError::Parse`] if its content is not well-formed XML
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let text = fs::read_to_string(&path).map_err(|e| DocumentError::Read {
            path: path.clone(),
            source: e,
        })?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, source: PathBuf) -> Result<Self> {
        let tree = roxmltree::Document::parse(text).map_err(|e| DocumentError::Parse {
            path: source.clone(),
            source: e,
        })?;

        // descendants() walks the tree in document order
        let rules = tree
            .descendants()
            .filter(roxmltree::Node::is_element)
            .map(|node| Rule {
                parameter: node.tag_name().name().to_string(),
                file_name: node.attribute(FILE_NAME_ATTR).map(str::to_string),
                variable_name: node.attribute(VARIABLE_NAME_ATTR).map(str::to_string),
                value: text_content(node),
            })
            .collect();

        Ok(Self { source, rules })
    }

    /// Where the document was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// All rules in document order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules tagged `parameter`, in document order.
    pub fn rules_named<'a>(&'a self, parameter: &str) -> impl Iterator<Item = &'a Rule> {
        self.rules.iter().filter(move |rule| rule.parameter == parameter)
    }

    /// Number of elements in the document.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the document holds no elements.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Joins the element's own text nodes, skipping comments and child elements.
fn text_content(node: roxmltree::Node<'_, '_>) -> String {
    let text: String = node
        .children()
        .filter(roxmltree::Node::is_text)
        .filter_map(|child| child.text())
        .collect();
    text.trim().to_string()
}
