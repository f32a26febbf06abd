//! The variable catalog.
//!
//! A [`Catalog`] owns the variables of one engine.
//! On the write side, variables are defined explicitly with [`Catalog::define_variable`] and operators are attached with [`Catalog::add_operation`].
//! On the read side, a read-mode [`Engine`](crate::engine::Engine) fills the catalog from the metadata recovered from its transport, and variables are found with [`Catalog::inquire_variable`].
//!
//! Variables are referenced through strongly typed [`VariableHandle`]s.
//! A handle is only valid for the catalog that issued it, and only until its variable is removed.

use std::{
    collections::BTreeMap,
    marker::PhantomData,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use thiserror::Error;

use crate::{
    array_subset::ArraySubset,
    data_type::{DataType, Element},
    operator::{Operation, OperatorChain, OperatorError, OperatorHandle, OperatorParameters, OperatorRegistry},
    shape::{validate_block, Block, InvalidShapeError, ShapeId},
    transport::{BlockDescriptor, VariableDescriptor},
};

static NEXT_CATALOG_ID: AtomicU64 = AtomicU64::new(0);

/// A strongly typed reference to a variable in a [`Catalog`].
pub struct VariableHandle<T: Element> {
    catalog_id: u64,
    variable_id: u64,
    name: Arc<str>,
    _phantom: PhantomData<fn() -> T>,
}

impl<T: Element> VariableHandle<T> {
    /// The variable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The data type of the variable.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }
}

impl<T: Element> Clone for VariableHandle<T> {
    fn clone(&self) -> Self {
        Self {
            catalog_id: self.catalog_id,
            variable_id: self.variable_id,
            name: self.name.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: Element> std::fmt::Debug for VariableHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariableHandle")
            .field("name", &self.name)
            .field("data_type", &T::DATA_TYPE)
            .finish_non_exhaustive()
    }
}

/// A variable.
#[derive(Clone, Debug)]
pub struct Variable {
    id: u64,
    name: Arc<str>,
    data_type: DataType,
    shape_id: ShapeId,
    shape: Vec<u64>,
    block: Block,
    constant_dims: bool,
    operations: OperatorChain,
    steps: u64,
    written: bool,
    selection: Option<ArraySubset>,
    block_selection: Option<usize>,
    step_blocks: BTreeMap<u64, Vec<BlockDescriptor>>,
}

impl Variable {
    /// The variable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The data type.
    #[must_use]
    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// The shape id.
    #[must_use]
    pub fn shape_id(&self) -> ShapeId {
        self.shape_id
    }

    /// The global shape.
    ///
    /// On the read side this is the shape in the current step, or in the latest step outside of a step.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The block written by [`Engine::put`](crate::engine::Engine::put).
    #[must_use]
    pub fn block(&self) -> &Block {
        &self.block
    }

    /// Returns true if the shape and block cannot change.
    #[must_use]
    pub fn constant_dims(&self) -> bool {
        self.constant_dims
    }

    /// The attached operations.
    #[must_use]
    pub fn operations(&self) -> &OperatorChain {
        &self.operations
    }

    /// The number of steps holding data for this variable.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// The selection for [`Engine::get`](crate::engine::Engine::get), if set.
    #[must_use]
    pub fn selection(&self) -> Option<&ArraySubset> {
        self.selection.as_ref()
    }

    /// The selected block of a local array, if set.
    #[must_use]
    pub fn block_selection(&self) -> Option<usize> {
        self.block_selection
    }

    /// The rank of the variable as seen by a reader.
    #[must_use]
    pub fn rank(&self) -> usize {
        match self.shape_id {
            ShapeId::GlobalArray => self.shape.len(),
            ShapeId::LocalArray => self.block.count.len(),
            ShapeId::GlobalValue => 0,
            ShapeId::LocalValue => 1,
        }
    }

    /// The blocks recovered for `step`.
    #[must_use]
    pub fn blocks(&self, step: u64) -> &[BlockDescriptor] {
        self.step_blocks
            .get(&step)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// The steps holding data for this variable, in increasing order.
    pub fn available_steps(&self) -> impl Iterator<Item = u64> + '_ {
        self.step_blocks.keys().copied()
    }

    fn has_data_in(&self, step: u64) -> bool {
        self.step_blocks.get(&step).is_some_and(|blocks| !blocks.is_empty())
    }

    /// Adopt the shape and block of `step`.
    fn show_step(&mut self, step: u64) {
        if let Some(first) = self.step_blocks.get(&step).and_then(|blocks| blocks.first()) {
            self.shape.clone_from(&first.shape);
            if self.shape_id != ShapeId::LocalValue {
                self.block = first.block();
            }
        }
    }
}

/// A catalog error.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A variable with the same name already exists.
    #[error("variable {_0} is already defined")]
    DuplicateName(String),
    /// An invalid shape, block or selection.
    #[error(transparent)]
    InvalidShape(#[from] InvalidShapeError),
    /// The handle was not issued by this catalog.
    #[error("variable {_0} is not known to this catalog")]
    UnknownVariable(String),
    /// The variable referenced by the handle has been removed.
    #[error("variable {_0} has been removed")]
    StaleHandle(String),
    /// The operation is not permitted once data has been written.
    #[error("cannot {operation} variable {name} after it has been written")]
    EngineState {
        /// The variable name.
        name: String,
        /// The rejected operation.
        operation: &'static str,
    },
    /// The variable has a different data type.
    #[error("variable {name} has data type {actual}, not {requested}")]
    DataTypeMismatch {
        /// The variable name.
        name: String,
        /// The data type of the variable.
        actual: DataType,
        /// The requested data type.
        requested: DataType,
    },
    /// An operator error.
    #[error("operator error for variable {name}: {source}")]
    Operator {
        /// The variable name.
        name: String,
        /// The operator error.
        #[source]
        source: OperatorError,
    },
}

/// A variable catalog.
#[derive(Debug)]
pub struct Catalog {
    id: u64,
    registry: Arc<OperatorRegistry>,
    variables: BTreeMap<String, Variable>,
    next_variable_id: u64,
    read_step: Option<u64>,
}

impl Catalog {
    /// Create an empty catalog creating operators with `registry`.
    #[must_use]
    pub fn new(registry: Arc<OperatorRegistry>) -> Self {
        Self {
            id: NEXT_CATALOG_ID.fetch_add(1, Ordering::Relaxed),
            registry,
            variables: BTreeMap::new(),
            next_variable_id: 0,
            read_step: None,
        }
    }

    /// The operator registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<OperatorRegistry> {
        &self.registry
    }

    fn insert(&mut self, mut variable: Variable) -> (u64, Arc<str>) {
        variable.id = self.next_variable_id;
        self.next_variable_id += 1;
        let handle = (variable.id, variable.name.clone());
        self.variables.insert(variable.name.to_string(), variable);
        handle
    }

    fn handle<T: Element>(&self, variable_id: u64, name: Arc<str>) -> VariableHandle<T> {
        VariableHandle {
            catalog_id: self.id,
            variable_id,
            name,
            _phantom: PhantomData,
        }
    }

    fn new_variable(
        name: &str,
        data_type: DataType,
        shape_id: ShapeId,
        shape: Vec<u64>,
        block: Block,
        constant_dims: bool,
    ) -> Variable {
        Variable {
            id: 0,
            name: name.into(),
            data_type,
            shape_id,
            shape,
            block,
            constant_dims,
            operations: OperatorChain::new(),
            steps: 0,
            written: false,
            selection: None,
            block_selection: None,
            step_blocks: BTreeMap::new(),
        }
    }

    /// Define a variable with elements of type `T`.
    ///
    /// The kind of variable is inferred from the dimensions:
    ///  - a non-empty `shape` defines a global array written as the block (`start`, `count`),
    ///  - an empty `shape` with a non-empty `count` defines a local array, and
    ///  - empty `shape`, `start` and `count` define a global value.
    ///
    /// If `constant_dims` is true, the shape and block can not be changed with [`set_shape`](Self::set_shape) or [`set_block`](Self::set_block).
    ///
    /// # Errors
    /// Returns [`CatalogError::DuplicateName`] if `name` is already defined, or [`CatalogError::InvalidShape`] if the block is invalid for `shape`.
    pub fn define_variable<T: Element>(
        &mut self,
        name: &str,
        shape: &[u64],
        start: &[u64],
        count: &[u64],
        constant_dims: bool,
    ) -> Result<VariableHandle<T>, CatalogError> {
        if self.variables.contains_key(name) {
            return Err(CatalogError::DuplicateName(name.to_string()));
        }
        let block = Block::new(start.to_vec(), count.to_vec());
        if !validate_block(shape, &block) {
            return Err(InvalidShapeError::new(
                name,
                format!("block {block} is invalid for shape {shape:?}"),
            )
            .into());
        }
        let shape_id = ShapeId::infer(shape, count);
        let variable = Self::new_variable(
            name,
            T::DATA_TYPE,
            shape_id,
            shape.to_vec(),
            block,
            constant_dims,
        );
        let (variable_id, name) = self.insert(variable);
        log::trace!("defined {shape_id} variable {name} of {}", T::DATA_TYPE);
        Ok(self.handle(variable_id, name))
    }

    /// Define a local value with elements of type `T`.
    ///
    /// Each [`put`](crate::engine::Engine::put) in a step contributes one value, and a reader gets the values of a step as a 1-D array.
    ///
    /// # Errors
    /// Returns [`CatalogError::DuplicateName`] if `name` is already defined.
    pub fn define_local_value<T: Element>(
        &mut self,
        name: &str,
    ) -> Result<VariableHandle<T>, CatalogError> {
        if self.variables.contains_key(name) {
            return Err(CatalogError::DuplicateName(name.to_string()));
        }
        let variable = Self::new_variable(
            name,
            T::DATA_TYPE,
            ShapeId::LocalValue,
            vec![],
            Block::default(),
            true,
        );
        let (variable_id, name) = self.insert(variable);
        Ok(self.handle(variable_id, name))
    }

    fn resolve_id<'a>(
        &self,
        catalog_id: u64,
        variable_id: u64,
        name: &'a str,
    ) -> Result<&'a str, CatalogError> {
        if catalog_id != self.id {
            return Err(CatalogError::UnknownVariable(name.to_string()));
        }
        match self.variables.get(name) {
            Some(variable) if variable.id == variable_id => Ok(name),
            _ => Err(CatalogError::StaleHandle(name.to_string())),
        }
    }

    /// Return the variable referenced by `handle`.
    ///
    /// # Errors
    /// Returns [`CatalogError::UnknownVariable`] if the handle was issued by another catalog, or [`CatalogError::StaleHandle`] if the variable has been removed.
    pub fn variable<T: Element>(&self, handle: &VariableHandle<T>) -> Result<&Variable, CatalogError> {
        let name = self.resolve_id(handle.catalog_id, handle.variable_id, &handle.name)?;
        self.variables
            .get(name)
            .ok_or_else(|| CatalogError::StaleHandle(name.to_string()))
    }

    fn variable_mut<T: Element>(
        &mut self,
        handle: &VariableHandle<T>,
    ) -> Result<&mut Variable, CatalogError> {
        self.resolve_id(handle.catalog_id, handle.variable_id, &handle.name)?;
        self.variables
            .get_mut(handle.name())
            .ok_or_else(|| CatalogError::StaleHandle(handle.name().to_string()))
    }

    /// Attach the operator `operator` with per-variable `parameters` to the variable referenced by `handle`.
    ///
    /// Returns the index of the operation in the variable's operator chain.
    ///
    /// # Errors
    /// Returns
    ///  - [`CatalogError::EngineState`] if the variable has already been written,
    ///  - [`CatalogError::Operator`] if the operator is not registered, its parameters are invalid, or it does not support the data type of the variable, or
    ///  - an error from resolving `handle`.
    pub fn add_operation<T: Element>(
        &mut self,
        handle: &VariableHandle<T>,
        operator: &OperatorHandle,
        parameters: OperatorParameters,
    ) -> Result<usize, CatalogError> {
        let registry = self.registry.clone();
        let variable = self.variable_mut(handle)?;
        if variable.written || variable.steps > 0 {
            return Err(CatalogError::EngineState {
                name: variable.name.to_string(),
                operation: "add an operation to",
            });
        }
        let operation = Operation {
            operator: operator.clone(),
            parameters,
        };
        variable
            .operations
            .push(&registry, variable.data_type, operation)
            .map_err(|source| CatalogError::Operator {
                name: variable.name.to_string(),
                source,
            })
    }

    /// Find the variable `name` with elements of type `T`.
    ///
    /// Returns [`None`] if the variable does not exist or, while a read step is active, has no data in that step.
    ///
    /// # Errors
    /// Returns [`CatalogError::DataTypeMismatch`] if the variable exists with another data type.
    pub fn inquire_variable<T: Element>(
        &self,
        name: &str,
    ) -> Result<Option<VariableHandle<T>>, CatalogError> {
        let Some(variable) = self.visible_variable(name) else {
            return Ok(None);
        };
        if variable.data_type != T::DATA_TYPE {
            return Err(CatalogError::DataTypeMismatch {
                name: name.to_string(),
                actual: variable.data_type,
                requested: T::DATA_TYPE,
            });
        }
        Ok(Some(self.handle(variable.id, variable.name.clone())))
    }

    /// Return the data type of the variable `name`, if it is available.
    #[must_use]
    pub fn inquire_variable_data_type(&self, name: &str) -> Option<DataType> {
        self.visible_variable(name).map(Variable::data_type)
    }

    /// Return the available variables, ordered by name.
    ///
    /// While a read step is active, only variables with data in that step are available.
    pub fn available_variables(&self) -> impl Iterator<Item = &Variable> {
        self.variables
            .values()
            .filter(|variable| self.is_visible(variable))
    }

    fn is_visible(&self, variable: &Variable) -> bool {
        self.read_step.map_or(true, |step| variable.has_data_in(step))
    }

    fn visible_variable(&self, name: &str) -> Option<&Variable> {
        self.variables
            .get(name)
            .filter(|variable| self.is_visible(variable))
    }

    /// Remove the variable referenced by `handle`.
    ///
    /// Subsequent use of any handle to the variable fails with [`CatalogError::StaleHandle`].
    ///
    /// # Errors
    /// Returns an error from resolving `handle`.
    pub fn remove_variable<T: Element>(
        &mut self,
        handle: &VariableHandle<T>,
    ) -> Result<(), CatalogError> {
        self.variable(handle)?;
        self.variables.remove(handle.name());
        Ok(())
    }

    /// Remove every variable.
    pub fn remove_all_variables(&mut self) {
        self.variables.clear();
    }

    /// Set the selection read by [`Engine::get`](crate::engine::Engine::get).
    ///
    /// The rank is checked now, the bounds are checked against the shape of the step being read.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidShape`] if the rank of `selection` differs from the rank of the variable, or an error from resolving `handle`.
    pub fn set_selection<T: Element>(
        &mut self,
        handle: &VariableHandle<T>,
        selection: ArraySubset,
    ) -> Result<(), CatalogError> {
        let variable = self.variable_mut(handle)?;
        if selection.dimensionality() != variable.rank() {
            return Err(InvalidShapeError::new(
                variable.name(),
                format!(
                    "selection {selection} has rank {}, expected {}",
                    selection.dimensionality(),
                    variable.rank()
                ),
            )
            .into());
        }
        variable.selection = Some(selection);
        Ok(())
    }

    /// Clear the selection so that [`Engine::get`](crate::engine::Engine::get) reads the full extent.
    ///
    /// # Errors
    /// Returns an error from resolving `handle`.
    pub fn clear_selection<T: Element>(
        &mut self,
        handle: &VariableHandle<T>,
    ) -> Result<(), CatalogError> {
        self.variable_mut(handle)?.selection = None;
        Ok(())
    }

    /// Select the block of a local array read by [`Engine::get`](crate::engine::Engine::get).
    ///
    /// Without a block selection, block 0 is read.
    /// Any selection set with [`set_selection`](Self::set_selection) is relative to the selected block.
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidShape`] if the variable is not a local array, or an error from resolving `handle`.
    pub fn set_block_selection<T: Element>(
        &mut self,
        handle: &VariableHandle<T>,
        block_id: usize,
    ) -> Result<(), CatalogError> {
        let variable = self.variable_mut(handle)?;
        if variable.shape_id != ShapeId::LocalArray {
            return Err(InvalidShapeError::new(
                variable.name(),
                format!("block selection requires a local array, not a {}", variable.shape_id),
            )
            .into());
        }
        variable.block_selection = Some(block_id);
        Ok(())
    }

    /// Change the block written by [`Engine::put`](crate::engine::Engine::put).
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidShape`] if the variable has constant dimensions, is a value, or the block is invalid for the current shape.
    pub fn set_block<T: Element>(
        &mut self,
        handle: &VariableHandle<T>,
        start: &[u64],
        count: &[u64],
    ) -> Result<(), CatalogError> {
        let variable = self.variable_mut(handle)?;
        check_mutable_dims(variable)?;
        let block = Block::new(start.to_vec(), count.to_vec());
        if !validate_block(&variable.shape, &block) || block.count.len() != variable.block.count.len() {
            return Err(InvalidShapeError::new(
                variable.name(),
                format!("block {block} is invalid for shape {:?}", variable.shape),
            )
            .into());
        }
        variable.block = block;
        Ok(())
    }

    /// Change the global shape of a global array.
    ///
    /// The block is validated against the new shape at the next [`Engine::put`](crate::engine::Engine::put).
    ///
    /// # Errors
    /// Returns [`CatalogError::InvalidShape`] if the variable has constant dimensions, is not a global array, or `shape` changes the rank.
    pub fn set_shape<T: Element>(
        &mut self,
        handle: &VariableHandle<T>,
        shape: &[u64],
    ) -> Result<(), CatalogError> {
        let variable = self.variable_mut(handle)?;
        check_mutable_dims(variable)?;
        if variable.shape_id != ShapeId::GlobalArray || shape.len() != variable.shape.len() {
            return Err(InvalidShapeError::new(
                variable.name(),
                format!("cannot change shape {:?} to {shape:?}", variable.shape),
            )
            .into());
        }
        variable.shape = shape.to_vec();
        Ok(())
    }

    /// Record that `name` has been put in the current write step.
    pub(crate) fn mark_written(&mut self, name: &str) {
        if let Some(variable) = self.variables.get_mut(name) {
            variable.written = true;
        }
    }

    /// Forget the uncommitted puts of `name` after its step was discarded.
    pub(crate) fn discard_written(&mut self, name: &str) {
        if let Some(variable) = self.variables.get_mut(name) {
            variable.written = variable.steps > 0;
        }
    }

    /// Increment the step count of `name` after a step holding it was committed.
    pub(crate) fn increment_steps(&mut self, name: &str) {
        if let Some(variable) = self.variables.get_mut(name) {
            variable.steps += 1;
        }
    }

    /// Merge variable descriptors recovered from a transport.
    pub(crate) fn refresh(&mut self, descriptors: Vec<VariableDescriptor>) {
        for descriptor in descriptors {
            let steps = descriptor
                .steps
                .values()
                .filter(|blocks| !blocks.is_empty())
                .count() as u64;
            let latest = descriptor.steps.keys().next_back().copied();
            if let Some(variable) = self.variables.get_mut(&descriptor.name) {
                variable.step_blocks = descriptor.steps;
                variable.steps = steps;
                if self.read_step.is_none() {
                    if let Some(latest) = latest {
                        variable.show_step(latest);
                    }
                }
                continue;
            }
            let mut variable = Self::new_variable(
                &descriptor.name,
                descriptor.data_type,
                descriptor.shape_id,
                vec![],
                Block::default(),
                false,
            );
            variable.step_blocks = descriptor.steps;
            variable.steps = steps;
            if let Some(latest) = latest {
                variable.show_step(latest);
            }
            self.insert(variable);
        }
    }

    /// Set the step being read, or [`None`] outside of a read step.
    pub(crate) fn set_read_step(&mut self, step: Option<u64>) {
        self.read_step = step;
        if let Some(step) = step {
            for variable in self.variables.values_mut() {
                variable.show_step(step);
            }
        }
    }
}

fn check_mutable_dims(variable: &Variable) -> Result<(), CatalogError> {
    if variable.constant_dims || variable.shape_id.is_value() {
        Err(InvalidShapeError::new(
            variable.name(),
            "the variable has constant dimensions",
        )
        .into())
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Catalog {
        Catalog::new(Arc::new(OperatorRegistry::with_builtin()))
    }

    #[test]
    fn catalog_define_variable() {
        let mut catalog = catalog();
        let handle = catalog
            .define_variable::<f32>("temperature", &[100, 50], &[0, 0], &[100, 50], true)
            .unwrap();
        assert_eq!(handle.name(), "temperature");
        let variable = catalog.variable(&handle).unwrap();
        assert_eq!(variable.shape_id(), ShapeId::GlobalArray);
        assert_eq!(variable.data_type(), DataType::Float32);
        assert_eq!(variable.shape(), &[100, 50]);
        assert_eq!(variable.steps(), 0);
        assert_eq!(variable.rank(), 2);

        assert!(matches!(
            catalog.define_variable::<f32>("temperature", &[10], &[0], &[10], true),
            Err(CatalogError::DuplicateName(name)) if name == "temperature"
        ));
        assert!(matches!(
            catalog.define_variable::<f32>("bad", &[10], &[5], &[6], true),
            Err(CatalogError::InvalidShape(_))
        ));
        assert!(matches!(
            catalog.define_variable::<f32>("zero", &[10], &[0], &[0], true),
            Err(CatalogError::InvalidShape(_))
        ));
        assert!(catalog.inquire_variable::<f32>("bad").unwrap().is_none());
    }

    #[test]
    fn catalog_shape_ids() {
        let mut catalog = catalog();
        let local = catalog
            .define_variable::<i32>("local", &[], &[], &[4], false)
            .unwrap();
        let value = catalog
            .define_variable::<u8>("value", &[], &[], &[], true)
            .unwrap();
        let local_value = catalog.define_local_value::<i64>("rank").unwrap();
        assert_eq!(catalog.variable(&local).unwrap().shape_id(), ShapeId::LocalArray);
        assert_eq!(catalog.variable(&value).unwrap().shape_id(), ShapeId::GlobalValue);
        assert_eq!(
            catalog.variable(&local_value).unwrap().shape_id(),
            ShapeId::LocalValue
        );
        assert_eq!(catalog.variable(&local_value).unwrap().rank(), 1);
        assert_eq!(catalog.available_variables().count(), 3);
    }

    #[test]
    fn catalog_handles() {
        let mut catalog_a = catalog();
        let mut catalog_b = catalog();
        let a = catalog_a
            .define_variable::<f64>("x", &[4], &[0], &[4], true)
            .unwrap();
        catalog_b
            .define_variable::<f64>("x", &[4], &[0], &[4], true)
            .unwrap();
        assert!(matches!(
            catalog_b.variable(&a),
            Err(CatalogError::UnknownVariable(name)) if name == "x"
        ));

        catalog_a.remove_variable(&a).unwrap();
        assert!(matches!(
            catalog_a.variable(&a),
            Err(CatalogError::StaleHandle(_))
        ));
        // Redefining the name does not revive the old handle.
        let a2 = catalog_a
            .define_variable::<f64>("x", &[4], &[0], &[4], true)
            .unwrap();
        assert!(matches!(
            catalog_a.variable(&a),
            Err(CatalogError::StaleHandle(_))
        ));
        assert!(catalog_a.variable(&a2).is_ok());
        catalog_a.remove_all_variables();
        assert!(matches!(
            catalog_a.set_selection(&a2, ArraySubset::new_with_shape(vec![1])),
            Err(CatalogError::StaleHandle(_))
        ));
    }

    #[test]
    fn catalog_inquire() {
        let mut catalog = catalog();
        catalog
            .define_variable::<u32>("u", &[2, 80], &[0, 0], &[2, 80], true)
            .unwrap();
        let handle = catalog.inquire_variable::<u32>("u").unwrap().unwrap();
        assert_eq!(handle.data_type(), DataType::UInt32);
        assert!(matches!(
            catalog.inquire_variable::<i32>("u"),
            Err(CatalogError::DataTypeMismatch {
                actual: DataType::UInt32,
                requested: DataType::Int32,
                ..
            })
        ));
        assert_eq!(catalog.inquire_variable_data_type("u"), Some(DataType::UInt32));
        assert!(catalog.inquire_variable::<u32>("missing").unwrap().is_none());
    }

    #[test]
    fn catalog_add_operation() {
        let mut catalog = catalog();
        let registry = catalog.registry().clone();
        let floats = catalog
            .define_variable::<f32>("f", &[10], &[0], &[10], true)
            .unwrap();
        let ints = catalog
            .define_variable::<i32>("i", &[10], &[0], &[10], true)
            .unwrap();
        let shuffle = registry
            .define_operator("shuffle", OperatorParameters::new())
            .unwrap();
        assert_eq!(
            catalog
                .add_operation(&floats, &shuffle, OperatorParameters::new())
                .unwrap(),
            0
        );
        #[cfg(feature = "bitround")]
        {
            let bitround = registry
                .define_operator("bitround", OperatorParameters::new())
                .unwrap();
            let keepbits: OperatorParameters = [("keepbits".to_string(), "4".to_string())].into();
            assert!(matches!(
                catalog.add_operation(&ints, &bitround, keepbits.clone()),
                Err(CatalogError::Operator {
                    source: OperatorError::UnsupportedType { .. },
                    ..
                })
            ));
            // bitround after shuffle sees bytes, not floats
            assert!(catalog.add_operation(&floats, &bitround, keepbits).is_err());
        }
        assert_eq!(catalog.variable(&floats).unwrap().operations().operations().len(), 1);

        catalog.mark_written("i");
        assert!(matches!(
            catalog.add_operation(&ints, &shuffle, OperatorParameters::new()),
            Err(CatalogError::EngineState { .. })
        ));
        catalog.discard_written("i");
        assert!(catalog
            .add_operation(&ints, &shuffle, OperatorParameters::new())
            .is_ok());
        catalog.mark_written("i");
        catalog.increment_steps("i");
        catalog.discard_written("i");
        assert!(catalog
            .add_operation(&ints, &shuffle, OperatorParameters::new())
            .is_err());
    }

    #[test]
    fn catalog_selection() {
        let mut catalog = catalog();
        let global = catalog
            .define_variable::<f32>("g", &[100, 50], &[0, 0], &[100, 50], true)
            .unwrap();
        let local = catalog
            .define_variable::<f32>("l", &[], &[], &[10], false)
            .unwrap();
        assert!(matches!(
            catalog.set_selection(&global, ArraySubset::new_with_ranges(&[50..100])),
            Err(CatalogError::InvalidShape(_))
        ));
        catalog
            .set_selection(&global, ArraySubset::new_with_ranges(&[50..100, 0..50]))
            .unwrap();
        assert_eq!(
            catalog.variable(&global).unwrap().selection(),
            Some(&ArraySubset::new_with_ranges(&[50..100, 0..50]))
        );
        catalog.clear_selection(&global).unwrap();
        assert!(catalog.variable(&global).unwrap().selection().is_none());

        assert!(catalog.set_block_selection(&global, 0).is_err());
        catalog.set_block_selection(&local, 2).unwrap();
        assert_eq!(catalog.variable(&local).unwrap().block_selection(), Some(2));
    }

    #[test]
    fn catalog_set_block_and_shape() {
        let mut catalog = catalog();
        let fixed = catalog
            .define_variable::<f32>("fixed", &[10], &[0], &[10], true)
            .unwrap();
        let varying = catalog
            .define_variable::<f32>("varying", &[10], &[0], &[5], false)
            .unwrap();
        assert!(catalog.set_block(&fixed, &[0], &[5]).is_err());
        assert!(catalog.set_shape(&fixed, &[20]).is_err());

        catalog.set_block(&varying, &[5], &[5]).unwrap();
        assert!(catalog.set_block(&varying, &[6], &[5]).is_err());
        catalog.set_shape(&varying, &[20]).unwrap();
        catalog.set_block(&varying, &[10], &[10]).unwrap();
        assert!(catalog.set_shape(&varying, &[20, 1]).is_err());
        let variable = catalog.variable(&varying).unwrap();
        assert_eq!(variable.shape(), &[20]);
        assert_eq!(variable.block(), &Block::new(vec![10], vec![10]));
    }

    #[test]
    fn catalog_refresh() {
        let mut catalog = catalog();
        let block = |step_shape: Vec<u64>| BlockDescriptor {
            block_id: 0,
            data_type: DataType::Int16,
            shape_id: ShapeId::GlobalArray,
            shape: step_shape.clone(),
            start: vec![0],
            count: step_shape,
            operations: vec![],
            encoded_length: 0,
        };
        let mut descriptor =
            VariableDescriptor::new("v".to_string(), DataType::Int16, ShapeId::GlobalArray);
        descriptor.steps.insert(0, vec![block(vec![4])]);
        descriptor.steps.insert(2, vec![block(vec![8])]);
        catalog.refresh(vec![descriptor]);

        let handle = catalog.inquire_variable::<i16>("v").unwrap().unwrap();
        let variable = catalog.variable(&handle).unwrap();
        assert_eq!(variable.steps(), 2);
        assert_eq!(variable.shape(), &[8]);
        assert_eq!(variable.available_steps().collect::<Vec<_>>(), vec![0, 2]);

        catalog.set_read_step(Some(0));
        assert_eq!(catalog.variable(&handle).unwrap().shape(), &[4]);
        catalog.set_read_step(Some(1));
        assert!(catalog.inquire_variable::<i16>("v").unwrap().is_none());
        assert_eq!(catalog.available_variables().count(), 0);
        catalog.set_read_step(None);
        assert!(catalog.inquire_variable::<i16>("v").unwrap().is_some());
    }
}
