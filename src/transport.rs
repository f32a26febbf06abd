//! Transports.
//!
//! A transport moves encoded blocks between a writing [`Engine`](crate::engine::Engine) and a reading one, and owns their durability and physical layout.
//! It is consumed through two narrow traits:
//!  - [`WritableTransportTraits`]: stage blocks of a step, then commit (flush) or discard the step, and
//!  - [`ReadableTransportTraits`]: recover the metadata catalog, read blocks of committed steps, and wait for the next step.
//!
//! Only committed steps are ever visible to a reader.
//!
//! This module provides two transports:
//!  - [`MemoryTransport`](memory::MemoryTransport): an in-memory stream shared between engines in the same process, and
//!  - [`FilesystemTransport`](filesystem::FilesystemTransport): an append-only stream in a directory.

pub mod filesystem;
pub mod memory;

use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    data_type::DataType,
    operator::InversionMetadata,
    shape::{Block, ShapeId},
};

/// Describes one encoded block of a variable in a step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// The index of the block within the step.
    pub block_id: usize,
    /// The data type of the variable.
    pub data_type: DataType,
    /// The shape id of the variable.
    pub shape_id: ShapeId,
    /// The global shape of the variable in this step.
    pub shape: Vec<u64>,
    /// The start of the block.
    pub start: Vec<u64>,
    /// The count of the block.
    pub count: Vec<u64>,
    /// The applied operators, in application order.
    pub operations: Vec<InversionMetadata>,
    /// The length of the encoded block in bytes.
    pub encoded_length: u64,
}

impl BlockDescriptor {
    /// Return the block.
    #[must_use]
    pub fn block(&self) -> Block {
        Block::new(self.start.clone(), self.count.clone())
    }

    /// Return the length of the decoded block in bytes.
    #[must_use]
    pub fn decoded_length(&self) -> u64 {
        self.count.iter().product::<u64>() * self.data_type.size() as u64
    }
}

/// Describes a variable and its blocks in every committed step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDescriptor {
    /// The variable name.
    pub name: String,
    /// The data type of the variable.
    pub data_type: DataType,
    /// The shape id of the variable.
    pub shape_id: ShapeId,
    /// The blocks of the variable, keyed by step.
    pub steps: BTreeMap<u64, Vec<BlockDescriptor>>,
}

impl VariableDescriptor {
    /// Create a variable descriptor with no steps.
    #[must_use]
    pub fn new(name: String, data_type: DataType, shape_id: ShapeId) -> Self {
        Self {
            name,
            data_type,
            shape_id,
            steps: BTreeMap::new(),
        }
    }
}

/// The availability of the next step.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepAvailability {
    /// The step has been committed and can be read.
    Available,
    /// The writer has closed the stream and the step does not exist.
    EndOfStream,
    /// The step was not committed in time.
    Timeout,
}

/// Writable transport traits.
pub trait WritableTransportTraits: Send + Sync {
    /// Acquire the write handle of the stream.
    ///
    /// # Errors
    /// Returns [`TransportError::WriterActive`] if another writer holds the stream, or another [`TransportError`] on failure.
    fn open_write(&self) -> Result<(), TransportError>;

    /// Stage the `encoded` bytes of a block of `variable_name` in `step`.
    ///
    /// # Errors
    /// Returns a [`TransportError`] if the transport is not open for writing or on failure.
    fn write_block(
        &self,
        step: u64,
        variable_name: &str,
        encoded: Vec<u8>,
        descriptor: &BlockDescriptor,
    ) -> Result<(), TransportError>;

    /// Commit every block staged in `step`, making the step visible to readers.
    ///
    /// # Errors
    /// Returns a [`TransportError`] if the step cannot be committed.
    fn flush_step(&self, step: u64) -> Result<(), TransportError>;

    /// Drop every block staged in `step`.
    ///
    /// # Errors
    /// Returns a [`TransportError`] on failure.
    fn discard_step(&self, step: u64) -> Result<(), TransportError>;

    /// Release the write handle and mark the end of the stream.
    ///
    /// # Errors
    /// Returns a [`TransportError`] on failure.
    fn close_write(&self) -> Result<(), TransportError>;
}

/// Readable transport traits.
pub trait ReadableTransportTraits: Send + Sync {
    /// Prepare the stream for reading.
    ///
    /// # Errors
    /// Returns a [`TransportError`] if the stream cannot be opened.
    fn open_read(&self) -> Result<(), TransportError>;

    /// Read the descriptors of every variable in the committed steps.
    ///
    /// # Errors
    /// Returns a [`TransportError`] on failure.
    fn read_metadata_catalog(&self) -> Result<Vec<VariableDescriptor>, TransportError>;

    /// Read the encoded bytes of a block.
    ///
    /// # Errors
    /// Returns [`TransportError::BlockNotFound`] if the block does not exist, or another [`TransportError`] on failure.
    fn read_block(
        &self,
        step: u64,
        variable_name: &str,
        descriptor: &BlockDescriptor,
    ) -> Result<Vec<u8>, TransportError>;

    /// Check whether `step` has been committed, optionally waiting for the writer.
    ///
    /// # Errors
    /// Returns a [`TransportError`] on failure.
    fn advance_to_next_step(
        &self,
        step: u64,
        blocking: bool,
    ) -> Result<StepAvailability, TransportError>;
}

/// A transport that is both readable and writable.
pub trait ReadableWritableTransportTraits:
    ReadableTransportTraits + WritableTransportTraits
{
}

impl<T> ReadableWritableTransportTraits for T where T: ReadableTransportTraits + WritableTransportTraits {}

/// [`Arc`] wrapped readable transport.
pub type ReadableTransport = Arc<dyn ReadableTransportTraits>;

/// [`Arc`] wrapped writable transport.
pub type WritableTransport = Arc<dyn WritableTransportTraits>;

/// [`Arc`] wrapped readable and writable transport.
pub type ReadableWritableTransport = Arc<dyn ReadableWritableTransportTraits>;

/// A transport error.
#[derive(Debug, Error)]
pub enum TransportError {
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// An error serialising or deserialising JSON.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// A block does not exist.
    #[error("block {block_id} of variable {name} not found at step {step}")]
    BlockNotFound {
        /// The step.
        step: u64,
        /// The variable name.
        name: String,
        /// The block id.
        block_id: usize,
    },
    /// A stored block checksum does not match its payload.
    #[error("checksum mismatch for block {block_id} of variable {name} at step {step}")]
    InvalidChecksum {
        /// The step.
        step: u64,
        /// The variable name.
        name: String,
        /// The block id.
        block_id: usize,
    },
    /// Another writer holds the stream.
    #[error("another writer is active")]
    WriterActive,
    /// The transport is not open for an operation.
    #[error("the transport is not open for {0}")]
    NotOpen(&'static str),
    /// Stored data is malformed.
    #[error("corrupt transport data: {0}")]
    Corrupt(String),
    /// Any other error.
    #[error("{0}")]
    Other(String),
}

impl From<&str> for TransportError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for TransportError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}
