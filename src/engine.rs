//! The step engine.
//!
//! An [`Engine`] drives the lifecycle of one producer or consumer of a stream:
//! ```text
//! Closed -> Open -> StepActive -> Open -> ... -> Closed
//! ```
//! A write-mode engine stages blocks with [`Engine::put`] and commits them at [`Engine::end_step`].
//! A read-mode engine waits for committed steps with [`Engine::begin_step`] and reads selections with [`Engine::get`].

use derive_more::Display;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use thiserror::Error;

use crate::{
    array_subset::ArraySubset,
    catalog::{Catalog, CatalogError, Variable, VariableHandle},
    config::global_config,
    data_type::{elements_as_bytes, elements_from_bytes, Element},
    operator::{OperatorChain, OperatorError},
    shape::{
        block_intersect, validate_block, Block, BlockIntersection, InvalidShapeError,
        SelectionRangeError, ShapeId,
    },
    transport::{
        BlockDescriptor, ReadableTransport, StepAvailability, TransportError, WritableTransport,
    },
};

/// The mode of an engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum EngineMode {
    /// A producer.
    #[display("write")]
    Write,
    /// A consumer.
    #[display("read")]
    Read,
}

/// The state of an engine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum EngineState {
    /// Not open.
    #[display("closed")]
    Closed,
    /// Open, between steps.
    #[display("open")]
    Open,
    /// Inside a step.
    #[display("step active")]
    StepActive,
}

/// How a reader waits for the next step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum StepMode {
    /// Wait for the writer up to the transport timeout.
    #[default]
    Blocking,
    /// Return immediately if the step is not committed.
    NonBlocking,
}

/// The outcome of [`Engine::begin_step`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum StepStatus {
    /// A step has begun.
    #[display("ok")]
    Ok,
    /// The writer has closed the stream.
    #[display("end of stream")]
    EndOfStream,
    /// The next step was not committed in time.
    #[display("not ready")]
    NotReady,
}

/// An engine error.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine is already open.
    #[error("the engine is already open")]
    AlreadyOpen,
    /// The operation is not permitted in the current state.
    #[error("cannot {operation} in state {state}")]
    EngineState {
        /// The rejected operation.
        operation: &'static str,
        /// The engine state.
        state: EngineState,
    },
    /// The operation is not permitted in the engine mode.
    #[error("cannot {operation} in {mode} mode")]
    WrongMode {
        /// The rejected operation.
        operation: &'static str,
        /// The engine mode.
        mode: EngineMode,
    },
    /// A catalog error.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Data does not match the shape of a variable.
    #[error(transparent)]
    InvalidShape(#[from] InvalidShapeError),
    /// A selection is outside of the shape of a variable.
    #[error(transparent)]
    Range(#[from] SelectionRangeError),
    /// An operator failed.
    #[error("operator error for variable {variable}: {source}")]
    Operator {
        /// The variable name.
        variable: String,
        /// The operator error.
        #[source]
        source: OperatorError,
    },
    /// A transport failed.
    #[error("transport error at step {step}: {source}")]
    Transport {
        /// The step.
        step: u64,
        /// The transport error.
        #[source]
        source: TransportError,
    },
}

enum EngineTransport {
    Writer(WritableTransport),
    Reader(ReadableTransport),
}

struct StagedBlock {
    name: String,
    descriptor: BlockDescriptor,
    encoded: Vec<u8>,
}

/// A step engine.
pub struct Engine {
    mode: EngineMode,
    state: EngineState,
    catalog: Catalog,
    transport: EngineTransport,
    current_step: u64,
    next_step: u64,
    closed_once: bool,
    staged: Vec<StagedBlock>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("current_step", &self.current_step)
            .field("staged", &self.staged.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Create a write-mode engine over `transport` writing the variables of `catalog`.
    #[must_use]
    pub fn new_writer(catalog: Catalog, transport: WritableTransport) -> Self {
        Self::new(EngineMode::Write, catalog, EngineTransport::Writer(transport))
    }

    /// Create a read-mode engine over `transport`.
    ///
    /// The variables of the stream are added to `catalog` when the engine is opened and at each step.
    #[must_use]
    pub fn new_reader(catalog: Catalog, transport: ReadableTransport) -> Self {
        Self::new(EngineMode::Read, catalog, EngineTransport::Reader(transport))
    }

    fn new(mode: EngineMode, catalog: Catalog, transport: EngineTransport) -> Self {
        Self {
            mode,
            state: EngineState::Closed,
            catalog,
            transport,
            current_step: 0,
            next_step: 0,
            closed_once: false,
            staged: Vec::new(),
        }
    }

    /// The engine mode.
    #[must_use]
    pub fn mode(&self) -> EngineMode {
        self.mode
    }

    /// The engine state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// The current step.
    ///
    /// For a writer this is the step being written, or the next step to be written between steps.
    /// For a reader this is the step being read, or the last step read between steps.
    #[must_use]
    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    /// The catalog.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The mutable catalog.
    #[must_use]
    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    /// Consume the engine and return its catalog.
    #[must_use]
    pub fn into_catalog(self) -> Catalog {
        self.catalog
    }

    fn require_state(&self, operation: &'static str, state: EngineState) -> Result<(), EngineError> {
        if self.state == state {
            Ok(())
        } else {
            Err(EngineError::EngineState {
                operation,
                state: self.state,
            })
        }
    }

    fn require_mode(&self, operation: &'static str, mode: EngineMode) -> Result<(), EngineError> {
        if self.mode == mode {
            Ok(())
        } else {
            Err(EngineError::WrongMode {
                operation,
                mode: self.mode,
            })
        }
    }

    /// Open the engine.
    ///
    /// A writer acquires the write handle of the transport, a reader recovers the variables already committed to the stream.
    ///
    /// # Errors
    /// Returns [`EngineError::AlreadyOpen`] if the engine is open, [`EngineError::EngineState`] if the engine has been closed, or [`EngineError::Transport`] if the transport cannot be opened.
    pub fn open(&mut self) -> Result<(), EngineError> {
        if self.state != EngineState::Closed {
            return Err(EngineError::AlreadyOpen);
        }
        if self.closed_once {
            return Err(EngineError::EngineState {
                operation: "reopen",
                state: self.state,
            });
        }
        let step = self.current_step;
        let transport_err = |source| EngineError::Transport { step, source };
        match &self.transport {
            EngineTransport::Writer(transport) => transport.open_write().map_err(transport_err)?,
            EngineTransport::Reader(transport) => {
                transport.open_read().map_err(transport_err)?;
                let descriptors = transport.read_metadata_catalog().map_err(transport_err)?;
                self.catalog.refresh(descriptors);
            }
        }
        self.state = EngineState::Open;
        log::debug!("opened {} engine", self.mode);
        Ok(())
    }

    /// Begin a step, waiting for the writer if the engine is a reader.
    ///
    /// # Errors
    /// See [`begin_step_with`](Self::begin_step_with).
    pub fn begin_step(&mut self) -> Result<StepStatus, EngineError> {
        self.begin_step_with(StepMode::Blocking)
    }

    /// Begin a step.
    ///
    /// A writer always begins a step.
    /// A reader begins the next committed step and returns [`StepStatus::Ok`], or returns [`StepStatus::EndOfStream`] or [`StepStatus::NotReady`] without changing state.
    /// A [`StepMode::NonBlocking`] reader does not wait for the writer.
    ///
    /// # Errors
    /// Returns [`EngineError::EngineState`] if the engine is not open or a step is active, or [`EngineError::Transport`] on transport failure.
    pub fn begin_step_with(&mut self, mode: StepMode) -> Result<StepStatus, EngineError> {
        self.require_state("begin a step", EngineState::Open)?;
        let reader = match &self.transport {
            EngineTransport::Writer(_) => {
                self.state = EngineState::StepActive;
                log::debug!("began write step {}", self.current_step);
                return Ok(StepStatus::Ok);
            }
            EngineTransport::Reader(transport) => transport.clone(),
        };

        let step = self.next_step;
        let transport_err = |source| EngineError::Transport { step, source };
        let availability = reader
            .advance_to_next_step(step, mode == StepMode::Blocking)
            .map_err(transport_err)?;
        match availability {
            StepAvailability::Available => {
                let descriptors = reader.read_metadata_catalog().map_err(transport_err)?;
                self.catalog.refresh(descriptors);
                self.catalog.set_read_step(Some(step));
                self.current_step = step;
                self.state = EngineState::StepActive;
                log::debug!("began read step {step}");
                Ok(StepStatus::Ok)
            }
            StepAvailability::EndOfStream => {
                log::debug!("end of stream at step {step}");
                Ok(StepStatus::EndOfStream)
            }
            StepAvailability::Timeout => Ok(StepStatus::NotReady),
        }
    }

    /// Stage `data` as the current block of the variable referenced by `handle`.
    ///
    /// The operator chain of the variable is applied immediately.
    /// Putting the same block of a global array, or a global value, again in the same step replaces the staged block.
    /// Blocks of local arrays and local values are appended.
    ///
    /// # Errors
    /// Returns
    ///  - [`EngineError::WrongMode`] if the engine is a reader,
    ///  - [`EngineError::EngineState`] if no step is active,
    ///  - [`EngineError::InvalidShape`] if `data` does not hold exactly the elements of the block, or the block no longer fits the shape,
    ///  - [`EngineError::Operator`] if an operator fails, or
    ///  - [`EngineError::Catalog`] if `handle` cannot be resolved.
    pub fn put<T: Element>(
        &mut self,
        handle: &VariableHandle<T>,
        data: &[T],
    ) -> Result<(), EngineError> {
        self.require_mode("put", EngineMode::Write)?;
        self.require_state("put", EngineState::StepActive)?;
        let variable = self.catalog.variable(handle)?;

        let expected = if variable.shape_id().is_value() {
            1
        } else {
            variable.block().num_elements()
        };
        if data.len() as u64 != expected {
            return Err(InvalidShapeError::new(
                variable.name(),
                format!(
                    "put {} elements, expected {expected} for block {}",
                    data.len(),
                    variable.block()
                ),
            )
            .into());
        }
        if !variable.constant_dims() && !validate_block(variable.shape(), variable.block()) {
            return Err(InvalidShapeError::new(
                variable.name(),
                format!(
                    "block {} is invalid for shape {:?}",
                    variable.block(),
                    variable.shape()
                ),
            )
            .into());
        }

        let (encoded, operations) = variable
            .operations()
            .apply(
                self.catalog.registry(),
                variable.data_type(),
                elements_as_bytes(data).to_vec(),
            )
            .map_err(|source| EngineError::Operator {
                variable: variable.name().to_string(),
                source,
            })?;

        let name = variable.name().to_string();
        let (start, count) = match variable.shape_id() {
            ShapeId::GlobalArray | ShapeId::LocalArray => {
                (variable.block().start.clone(), variable.block().count.clone())
            }
            ShapeId::GlobalValue | ShapeId::LocalValue => (vec![], vec![]),
        };
        let mut descriptor = BlockDescriptor {
            block_id: 0,
            data_type: variable.data_type(),
            shape_id: variable.shape_id(),
            shape: variable.shape().to_vec(),
            start,
            count,
            operations,
            encoded_length: encoded.len() as u64,
        };

        let replaces = |staged: &StagedBlock| {
            staged.name == name
                && match descriptor.shape_id {
                    ShapeId::GlobalArray => {
                        staged.descriptor.start == descriptor.start
                            && staged.descriptor.count == descriptor.count
                    }
                    ShapeId::GlobalValue => true,
                    ShapeId::LocalArray | ShapeId::LocalValue => false,
                }
        };
        if let Some(staged) = self.staged.iter_mut().find(|staged| replaces(staged)) {
            descriptor.block_id = staged.descriptor.block_id;
            log::trace!(
                "replaced block {} of {name} at step {}",
                descriptor.block_id,
                self.current_step
            );
            staged.descriptor = descriptor;
            staged.encoded = encoded;
        } else {
            descriptor.block_id = self
                .staged
                .iter()
                .filter(|staged| staged.name == name)
                .count();
            log::trace!(
                "staged block {} of {name} at step {} ({} bytes)",
                descriptor.block_id,
                self.current_step,
                encoded.len()
            );
            self.staged.push(StagedBlock {
                name: name.clone(),
                descriptor,
                encoded,
            });
        }
        self.catalog.mark_written(&name);
        Ok(())
    }

    /// End the active step.
    ///
    /// A writer commits the staged blocks to the transport.
    /// If the transport fails, the step is discarded and the engine returns to the open state without advancing the step.
    ///
    /// # Errors
    /// Returns [`EngineError::EngineState`] if no step is active, or [`EngineError::Transport`] if the step cannot be committed.
    pub fn end_step(&mut self) -> Result<(), EngineError> {
        self.require_state("end a step", EngineState::StepActive)?;
        let writer = match &self.transport {
            EngineTransport::Writer(transport) => transport.clone(),
            EngineTransport::Reader(_) => {
                self.catalog.set_read_step(None);
                self.next_step = self.current_step + 1;
                self.state = EngineState::Open;
                log::debug!("ended read step {}", self.current_step);
                return Ok(());
            }
        };

        let step = self.current_step;
        let staged = std::mem::take(&mut self.staged);
        let mut touched: Vec<String> = staged.iter().map(|staged| staged.name.clone()).collect();
        touched.sort();
        touched.dedup();

        let commit = || -> Result<(), TransportError> {
            for StagedBlock {
                name,
                descriptor,
                encoded,
            } in staged
            {
                writer.write_block(step, &name, encoded, &descriptor)?;
            }
            writer.flush_step(step)
        };
        self.state = EngineState::Open;
        if let Err(source) = commit() {
            log::warn!("discarding step {step}: {source}");
            if let Err(err) = writer.discard_step(step) {
                log::warn!("failed to discard step {step}: {err}");
            }
            for name in &touched {
                self.catalog.discard_written(name);
            }
            return Err(EngineError::Transport { step, source });
        }

        for name in &touched {
            self.catalog.increment_steps(name);
        }
        self.current_step += 1;
        log::debug!("committed step {step} with {} variables", touched.len());
        Ok(())
    }

    /// Read the selection of the variable referenced by `handle` in the active step into `out`.
    ///
    /// The selection is the one set with [`Catalog::set_selection`], or the full extent of the variable in the step.
    /// `out` is resized to the number of selected elements, and is cleared if the variable has no data in the step.
    ///
    /// # Errors
    /// Returns
    ///  - [`EngineError::WrongMode`] if the engine is a writer,
    ///  - [`EngineError::EngineState`] if no step is active,
    ///  - [`EngineError::Range`] if the selection is outside of the variable in the step,
    ///  - [`EngineError::Operator`] if an operator cannot be inverted,
    ///  - [`EngineError::Transport`] if a block cannot be read, or
    ///  - [`EngineError::Catalog`] if `handle` cannot be resolved.
    pub fn get<T: Element>(
        &self,
        handle: &VariableHandle<T>,
        out: &mut Vec<T>,
    ) -> Result<(), EngineError> {
        self.require_mode("get", EngineMode::Read)?;
        self.require_state("get", EngineState::StepActive)?;
        let EngineTransport::Reader(transport) = &self.transport else {
            return Err(EngineError::WrongMode {
                operation: "get",
                mode: self.mode,
            });
        };
        let step = self.current_step;
        let variable = self.catalog.variable(handle)?;
        let blocks = variable.blocks(step);
        if blocks.is_empty() {
            out.clear();
            return Ok(());
        }

        let (selection, contributions) = read_plan(variable, blocks, step)?;
        let element_size = variable.data_type().size();
        let range_err = || SelectionRangeError::new(variable.name(), selection.clone(), variable.shape().to_vec(), step);
        let selection_bytes = usize::try_from(selection.num_elements())
            .ok()
            .and_then(|elements| elements.checked_mul(element_size))
            .ok_or_else(range_err)?;

        let decode = |descriptor: &BlockDescriptor| -> Result<Vec<u8>, EngineError> {
            let encoded = transport
                .read_block(step, variable.name(), descriptor)
                .map_err(|source| EngineError::Transport { step, source })?;
            let decoded = OperatorChain::invert(
                self.catalog.registry(),
                &descriptor.operations,
                encoded,
            )
            .map_err(|source| EngineError::Operator {
                variable: variable.name().to_string(),
                source,
            })?;
            if decoded.len() as u64 == descriptor.decoded_length() {
                log::trace!(
                    "decoded block {} of {} at step {step}",
                    descriptor.block_id,
                    variable.name()
                );
                Ok(decoded)
            } else {
                Err(EngineError::Transport {
                    step,
                    source: TransportError::Corrupt(format!(
                        "block {} of variable {} decoded to {} bytes, expected {}",
                        descriptor.block_id,
                        variable.name(),
                        decoded.len(),
                        descriptor.decoded_length()
                    )),
                })
            }
        };
        let intersecting: Vec<(&Contribution, BlockIntersection)> = contributions
            .iter()
            .filter_map(|contribution| {
                block_intersect(&contribution.block, &selection)
                    .map(|intersection| (contribution, intersection))
            })
            .collect();
        let decoded: Vec<Vec<u8>> = if global_config().parallel_decode() && intersecting.len() > 1 {
            intersecting
                .par_iter()
                .map(|(contribution, _)| decode(contribution.descriptor))
                .collect::<Result<_, _>>()?
        } else {
            intersecting
                .iter()
                .map(|(contribution, _)| decode(contribution.descriptor))
                .collect::<Result<_, _>>()?
        };

        let mut bytes = vec![0u8; selection_bytes];
        let copy_err = |err: String| EngineError::Transport {
            step,
            source: TransportError::Corrupt(format!("variable {}: {err}", variable.name())),
        };
        for ((contribution, intersection), decoded) in std::iter::zip(&intersecting, decoded) {
            let region = if intersection.in_block.num_elements() == contribution.block.num_elements() {
                decoded
            } else {
                intersection
                    .in_block
                    .extract_bytes(&decoded, &contribution.block.count, element_size)
                    .map_err(|err| copy_err(err.to_string()))?
            };
            intersection
                .in_selection
                .store_bytes(&region, &mut bytes, selection.shape(), element_size)
                .map_err(|err| copy_err(err.to_string()))?;
        }
        *out = elements_from_bytes(&bytes);
        log::trace!(
            "read {} elements of {} at step {step}",
            out.len(),
            variable.name()
        );
        Ok(())
    }

    /// Close the engine.
    ///
    /// A writer releases the write handle of the transport and marks the end of the stream.
    ///
    /// # Errors
    /// Returns [`EngineError::EngineState`] if the engine is not open or a step is active, or [`EngineError::Transport`] if the transport cannot be closed.
    pub fn close(&mut self) -> Result<(), EngineError> {
        self.require_state("close", EngineState::Open)?;
        if let EngineTransport::Writer(transport) = &self.transport {
            transport
                .close_write()
                .map_err(|source| EngineError::Transport {
                    step: self.current_step,
                    source,
                })?;
        }
        self.state = EngineState::Closed;
        self.closed_once = true;
        log::debug!("closed {} engine", self.mode);
        Ok(())
    }
}

struct Contribution<'a> {
    descriptor: &'a BlockDescriptor,
    block: Block,
}

/// Resolve the selection read from `variable` at `step` and the blocks contributing to it, in application order.
fn read_plan<'a>(
    variable: &Variable,
    blocks: &'a [BlockDescriptor],
    step: u64,
) -> Result<(ArraySubset, Vec<Contribution<'a>>), EngineError> {
    let checked_selection = |extent: &[u64]| -> Result<ArraySubset, EngineError> {
        let selection = variable
            .selection()
            .cloned()
            .unwrap_or_else(|| ArraySubset::new_with_shape(extent.to_vec()));
        if selection.inbounds(extent) {
            Ok(selection)
        } else {
            Err(SelectionRangeError::new(variable.name(), selection, extent.to_vec(), step).into())
        }
    };

    match variable.shape_id() {
        ShapeId::GlobalArray => {
            let selection = checked_selection(variable.shape())?;
            let contributions = blocks
                .iter()
                .map(|descriptor| Contribution {
                    descriptor,
                    block: descriptor.block(),
                })
                .collect();
            Ok((selection, contributions))
        }
        ShapeId::LocalArray => {
            let block_id = variable.block_selection().unwrap_or(0);
            let Some(descriptor) = blocks.get(block_id) else {
                let block_ids = ArraySubset::new_with_ranges(&[
                    block_id as u64..(block_id as u64).saturating_add(1),
                ]);
                return Err(SelectionRangeError::new(
                    variable.name(),
                    block_ids,
                    vec![blocks.len() as u64],
                    step,
                )
                .into());
            };
            let block = Block::new(vec![], descriptor.count.clone());
            let selection = checked_selection(&block.count)?;
            Ok((selection, vec![Contribution { descriptor, block }]))
        }
        ShapeId::GlobalValue => {
            // the last put wins
            let contributions = blocks
                .last()
                .into_iter()
                .map(|descriptor| Contribution {
                    descriptor,
                    block: Block::new(vec![0], vec![1]),
                })
                .collect();
            Ok((ArraySubset::new_with_shape(vec![1]), contributions))
        }
        ShapeId::LocalValue => {
            let selection = checked_selection(&[blocks.len() as u64])?;
            let contributions = blocks
                .iter()
                .enumerate()
                .map(|(i, descriptor)| Contribution {
                    descriptor,
                    block: Block::new(vec![i as u64], vec![1]),
                })
                .collect();
            Ok((selection, contributions))
        }
    }
}
