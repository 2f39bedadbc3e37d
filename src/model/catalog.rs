//! Operation codes and the per-tree operation catalog

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::error::TreeError;

/// Short code (1–2 characters) identifying an operation type.
///
/// Codes are unique within a catalog and act as the key for per-node
/// operation state (e.g. `"R"` for Read).
///
/// # Example
///
/// ```
/// use tree_action::model::OpCode;
///
/// let code = OpCode::from("R");
/// assert_eq!(code.as_str(), "R");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpCode(String);

impl OpCode {
    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the code has a valid length (1–2 characters).
    pub fn is_valid(&self) -> bool {
        let len = self.0.chars().count();
        (1..=2).contains(&len)
    }
}

impl From<&str> for OpCode {
    fn from(code: &str) -> Self {
        Self(code.to_string())
    }
}

impl From<String> for OpCode {
    fn from(code: String) -> Self {
        Self(code)
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One operation definition: a code plus a human-readable label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationType {
    /// The operation code (e.g. `"C"`).
    pub code: OpCode,
    /// Display label (e.g. `"Create"`).
    pub label: String,
}

impl OperationType {
    /// Creates a new operation type.
    pub fn new(code: impl Into<OpCode>, label: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            label: label.into(),
        }
    }
}

/// Ordered list of the operation types known to one tree.
///
/// The catalog defines which codes may ever appear on a node. Adding a
/// code makes it available on the root only; removing a code purges it
/// from every node tree-wide (the purge itself is driven by the engine,
/// see [`TreeAction::remove_operation`](crate::TreeAction::remove_operation)).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationCatalog {
    operations: Vec<OperationType>,
}

impl OperationCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the default catalog: Create, Read, Update, Delete, Share.
    pub fn crud_share() -> Self {
        let mut catalog = Self::new();
        for (code, label) in [
            ("C", "Create"),
            ("R", "Read"),
            ("U", "Update"),
            ("D", "Delete"),
            ("S", "Share"),
        ] {
            // Codes are static and well-formed, add cannot fail here.
            let _ = catalog.add(code, label);
        }
        catalog
    }

    /// Builds a catalog from an ordered list of operation types.
    ///
    /// Fails on invalid or duplicate codes.
    pub fn from_operations(operations: impl IntoIterator<Item = OperationType>) -> Result<Self> {
        let mut catalog = Self::new();
        for op in operations {
            catalog.add(op.code, op.label)?;
        }
        Ok(catalog)
    }

    /// Adds a new operation type at the end of the catalog.
    ///
    /// # Errors
    ///
    /// Returns [`TreeError::InvalidOperationCode`] if the code is not 1–2
    /// characters, or [`TreeError::DuplicateOperation`] if the code is
    /// already present.
    pub fn add(&mut self, code: impl Into<OpCode>, label: impl Into<String>) -> Result<()> {
        let code = code.into();
        if !code.is_valid() {
            return Err(TreeError::InvalidOperationCode {
                code: code.as_str().to_string(),
            });
        }
        if self.contains(&code) {
            return Err(TreeError::DuplicateOperation { code });
        }
        self.operations.push(OperationType {
            code,
            label: label.into(),
        });
        Ok(())
    }

    /// Removes an operation type. Returns `false` (no-op) if absent.
    pub fn remove(&mut self, code: &OpCode) -> bool {
        let before = self.operations.len();
        self.operations.retain(|op| op.code != *code);
        self.operations.len() != before
    }

    /// Returns `true` if the catalog contains the given code.
    pub fn contains(&self, code: &OpCode) -> bool {
        self.operations.iter().any(|op| op.code == *code)
    }

    /// Iterates over the codes in catalog order.
    pub fn codes(&self) -> impl Iterator<Item = &OpCode> {
        self.operations.iter().map(|op| &op.code)
    }

    /// Returns the operation types in catalog order.
    pub fn operations(&self) -> &[OperationType] {
        &self.operations
    }

    /// Returns the number of operation types.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns `true` if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}
