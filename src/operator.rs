//! Operators.
//!
//! An operator is a named, stateless byte transform applied to each block of a variable on write and inverted on read.
//! Operators are identified by a type tag (e.g. `zstd`) and configured with string parameters (e.g. `level=3`).
//!
//! Operators are created by an [`OperatorRegistry`], which maps type tags to factories.
//! A registry is built explicitly by the hosting application, typically with [`OperatorRegistry::with_builtin`], optionally extended with [`OperatorRegistry::register_operator`], and then shared read-only behind an [`Arc`].
//!
//! Built-in operators register themselves at compile time as [`OperatorPlugin`]s using the [inventory] crate:
//!
//! | Type tag   | Parameters                                      | Data types  | Lossless |
//! |------------|-------------------------------------------------|-------------|----------|
//! | `png`      | `compression_level` (0-9, default 6)            | all         | yes      |
//! | `gzip`     | `level` (0-9, default 6)                        | all         | yes      |
//! | `zstd`     | `level` (-7-22, default 3), `checksum` (bool)   | all         | yes      |
//! | `shuffle`  |                                                 | all         | yes      |
//! | `crc32c`   |                                                 | all         | yes      |
//! | `bitround` | `keepbits` (required)                           | float       | no       |
//!
//! Unrecognised parameters are ignored.

#[cfg(feature = "bitround")]
pub mod bitround;
pub mod crc32c;
#[cfg(feature = "gzip")]
pub mod gzip;
#[cfg(feature = "png")]
pub mod png;
pub mod shuffle;
#[cfg(feature = "zstd")]
pub mod zstd;

use std::{
    collections::BTreeMap,
    fmt::{Debug, Display},
    io::Read,
    ops::RangeInclusive,
    str::FromStr,
    sync::Arc,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data_type::DataType;

/// Operator parameters.
pub type OperatorParameters = BTreeMap<String, String>;

/// An operator instance.
pub type Operator = Arc<dyn OperatorTraits>;

/// Traits for an operator.
///
/// An operator holds only its parsed parameters.
pub trait OperatorTraits: Debug + Send + Sync {
    /// The type tag of the operator.
    fn type_tag(&self) -> &'static str;

    /// Returns true if the operator supports `data_type`.
    fn supports_data_type(&self, _data_type: DataType) -> bool {
        true
    }

    /// Returns true if the encoded bytes are still elements of the input data type.
    ///
    /// Operators after one that does not preserve the data type see the bytes as [`DataType::UInt8`].
    fn preserves_data_type(&self) -> bool {
        false
    }

    /// Operator specific header bytes stored in the [`InversionMetadata`].
    fn header(&self, _data_type: DataType) -> Vec<u8> {
        Vec::new()
    }

    /// Encode `decoded_value` holding elements of `data_type`.
    ///
    /// # Errors
    /// Returns [`OperatorError`] if encoding fails or the parameters are incompatible with `data_type`.
    fn encode(&self, decoded_value: Vec<u8>, data_type: DataType) -> Result<Vec<u8>, OperatorError>;

    /// Decode `encoded_value`.
    ///
    /// # Errors
    /// Returns [`OperatorError`] if decoding fails.
    fn decode(
        &self,
        encoded_value: Vec<u8>,
        metadata: &InversionMetadata,
    ) -> Result<Vec<u8>, OperatorError>;
}

/// An operator factory.
pub type OperatorFactory =
    Arc<dyn Fn(&OperatorParameters) -> Result<Operator, OperatorError> + Send + Sync>;

/// A compile-time operator registration.
pub struct OperatorPlugin {
    type_tag: &'static str,
    create_fn: fn(parameters: &OperatorParameters) -> Result<Operator, OperatorError>,
}

inventory::collect!(OperatorPlugin);

impl OperatorPlugin {
    /// Create a new plugin for registration.
    pub const fn new(
        type_tag: &'static str,
        create_fn: fn(parameters: &OperatorParameters) -> Result<Operator, OperatorError>,
    ) -> Self {
        Self {
            type_tag,
            create_fn,
        }
    }

    /// Create an operator from `parameters`.
    ///
    /// # Errors
    /// Returns [`OperatorError`] if the parameters are invalid.
    pub fn create(&self, parameters: &OperatorParameters) -> Result<Operator, OperatorError> {
        (self.create_fn)(parameters)
    }

    /// Returns the type tag of the plugin.
    #[must_use]
    pub const fn type_tag(&self) -> &'static str {
        self.type_tag
    }
}

/// An operator error.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// The type tag is not registered.
    #[error("operator {_0} is not registered")]
    UnsupportedOperator(String),
    /// The operator does not support a data type.
    #[error("operator {type_tag} does not support data type {data_type}")]
    UnsupportedType {
        /// The operator type tag.
        type_tag: String,
        /// The unsupported data type.
        data_type: DataType,
    },
    /// A parameter is missing, unparsable or out of range.
    #[error("invalid parameter {name} of operator {type_tag}: {reason}")]
    InvalidParameter {
        /// The operator type tag.
        type_tag: String,
        /// The parameter name.
        name: String,
        /// The reason the parameter is invalid.
        reason: String,
    },
    /// An embedded checksum does not match the decoded value.
    #[error("the checksum of operator {_0} is invalid")]
    InvalidChecksum(String),
    /// The decoded length does not match the length recorded at encode time.
    #[error("operator {type_tag} decoded {got} bytes, expected {expected}")]
    InvalidEncodedLength {
        /// The operator type tag.
        type_tag: String,
        /// The expected decoded length.
        expected: u64,
        /// The actual decoded length.
        got: u64,
    },
    /// An IO error.
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    /// Other
    #[error("{_0}")]
    Other(String),
}

impl From<&str> for OperatorError {
    fn from(err: &str) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<String> for OperatorError {
    fn from(err: String) -> Self {
        Self::Other(err)
    }
}

impl OperatorError {
    /// Create an [`OperatorError::InvalidParameter`].
    #[must_use]
    pub fn invalid_parameter(type_tag: &str, name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            type_tag: type_tag.to_string(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Parse the parameter `name`, falling back to `default` if it is absent.
///
/// # Errors
/// Returns [`OperatorError::InvalidParameter`] if the parameter is absent without a default or cannot be parsed.
pub fn parse_parameter<T: FromStr>(
    type_tag: &str,
    parameters: &OperatorParameters,
    name: &str,
    default: Option<T>,
) -> Result<T, OperatorError> {
    match (parameters.get(name), default) {
        (Some(value), _) => value.trim().parse::<T>().map_err(|_| {
            OperatorError::invalid_parameter(type_tag, name, format!("cannot parse {value:?}"))
        }),
        (None, Some(default)) => Ok(default),
        (None, None) => Err(OperatorError::invalid_parameter(
            type_tag,
            name,
            "missing required parameter",
        )),
    }
}

/// Parse the parameter `name` and check it lies in `range`.
///
/// # Errors
/// Returns [`OperatorError::InvalidParameter`] if the parameter is absent without a default, cannot be parsed, or is out of range.
pub fn parse_parameter_in_range<T: FromStr + PartialOrd + Display>(
    type_tag: &str,
    parameters: &OperatorParameters,
    name: &str,
    default: Option<T>,
    range: RangeInclusive<T>,
) -> Result<T, OperatorError> {
    let value = parse_parameter(type_tag, parameters, name, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(OperatorError::invalid_parameter(
            type_tag,
            name,
            format!(
                "{value} is outside of the range [{}, {}]",
                range.start(),
                range.end()
            ),
        ))
    }
}

/// Read a decompressed stream, stopping one byte past `decoded_length`.
///
/// A corrupt stream cannot expand beyond this, and the overrun is reported by the length check in [`OperatorRegistry::invert`].
///
/// # Errors
/// Returns [`OperatorError::IOError`] if the stream cannot be read.
pub(crate) fn read_decoded(reader: impl Read, decoded_length: u64) -> Result<Vec<u8>, OperatorError> {
    let mut out = Vec::with_capacity(usize::try_from(decoded_length).unwrap_or_default());
    reader
        .take(decoded_length.saturating_add(1))
        .read_to_end(&mut out)?;
    Ok(out)
}

/// Everything needed to invert an applied operator.
///
/// This is stored alongside each encoded block so that a reader can recreate the operator without the writer's catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InversionMetadata {
    /// The operator type tag.
    pub type_tag: String,
    /// The operator parameters, including defaults from the [`OperatorHandle`].
    pub parameters: OperatorParameters,
    /// The data type seen by the operator.
    pub data_type: DataType,
    /// The number of elements seen by the operator.
    pub element_count: u64,
    /// The length in bytes of the input to the operator.
    pub decoded_length: u64,
    /// Operator specific header bytes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub header: Vec<u8>,
}

/// A defined operator with global parameters, attached to variables with [`Catalog::add_operation`](crate::catalog::Catalog::add_operation).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OperatorHandle {
    type_tag: String,
    global_parameters: OperatorParameters,
}

impl OperatorHandle {
    /// The operator type tag.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// The global parameters of the operator.
    #[must_use]
    pub fn global_parameters(&self) -> &OperatorParameters {
        &self.global_parameters
    }

    /// Merge per-variable `parameters` over the global parameters.
    #[must_use]
    pub fn merged_parameters(&self, parameters: &OperatorParameters) -> OperatorParameters {
        let mut merged = self.global_parameters.clone();
        merged.extend(parameters.iter().map(|(k, v)| (k.clone(), v.clone())));
        merged
    }
}

/// A registry of operator factories.
#[derive(Clone, Default)]
pub struct OperatorRegistry {
    factories: BTreeMap<String, OperatorFactory>,
}

impl Debug for OperatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("type_tags", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl OperatorRegistry {
    /// Create an empty operator registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an operator registry holding every operator registered at compile time.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for plugin in inventory::iter::<OperatorPlugin> {
            registry.register_operator(plugin.type_tag(), plugin.create_fn);
        }
        registry
    }

    /// Register an operator factory for `type_tag`, replacing any existing factory.
    pub fn register_operator<F>(&mut self, type_tag: impl Into<String>, factory: F)
    where
        F: Fn(&OperatorParameters) -> Result<Operator, OperatorError> + Send + Sync + 'static,
    {
        self.factories.insert(type_tag.into(), Arc::new(factory));
    }

    /// Returns true if `type_tag` is registered.
    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.factories.contains_key(type_tag)
    }

    /// Returns the registered type tags.
    pub fn type_tags(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Define an operator with `global_parameters`.
    ///
    /// # Errors
    /// Returns [`OperatorError::UnsupportedOperator`] if `type_tag` is not registered.
    pub fn define_operator(
        &self,
        type_tag: &str,
        global_parameters: OperatorParameters,
    ) -> Result<OperatorHandle, OperatorError> {
        if !self.contains(type_tag) {
            return Err(OperatorError::UnsupportedOperator(type_tag.to_string()));
        }
        Ok(OperatorHandle {
            type_tag: type_tag.to_string(),
            global_parameters,
        })
    }

    /// Create an operator.
    ///
    /// # Errors
    /// Returns [`OperatorError::UnsupportedOperator`] if `type_tag` is not registered, or an error from the factory if the parameters are invalid.
    pub fn create(
        &self,
        type_tag: &str,
        parameters: &OperatorParameters,
    ) -> Result<Operator, OperatorError> {
        let factory = self
            .factories
            .get(type_tag)
            .ok_or_else(|| OperatorError::UnsupportedOperator(type_tag.to_string()))?;
        factory(parameters)
    }

    /// Check that the operator `handle` with per-variable `parameters` can be applied to `data_type`.
    ///
    /// Returns the data type seen by the next operator in a chain.
    ///
    /// # Errors
    /// Returns [`OperatorError`] if the operator is not registered, the parameters are invalid, or `data_type` is unsupported.
    pub fn validate(
        &self,
        handle: &OperatorHandle,
        parameters: &OperatorParameters,
        data_type: DataType,
    ) -> Result<DataType, OperatorError> {
        let operator = self.create(handle.type_tag(), &handle.merged_parameters(parameters))?;
        check_data_type(&*operator, data_type)?;
        Ok(next_data_type(&*operator, data_type))
    }

    /// Apply the operator `handle` with per-variable `parameters` to `decoded_value` holding elements of `data_type`.
    ///
    /// # Errors
    /// Returns [`OperatorError`] if the operator is not registered, the parameters are invalid, `data_type` is unsupported, or encoding fails.
    pub fn apply(
        &self,
        handle: &OperatorHandle,
        parameters: &OperatorParameters,
        data_type: DataType,
        decoded_value: Vec<u8>,
    ) -> Result<(Vec<u8>, InversionMetadata), OperatorError> {
        let parameters = handle.merged_parameters(parameters);
        let operator = self.create(handle.type_tag(), &parameters)?;
        check_data_type(&*operator, data_type)?;
        if decoded_value.len() % data_type.size() != 0 {
            return Err(OperatorError::Other(format!(
                "operator {} input of {} bytes is not a whole number of {data_type} elements",
                handle.type_tag(),
                decoded_value.len()
            )));
        }
        let metadata = InversionMetadata {
            type_tag: handle.type_tag().to_string(),
            parameters,
            data_type,
            element_count: (decoded_value.len() / data_type.size()) as u64,
            decoded_length: decoded_value.len() as u64,
            header: operator.header(data_type),
        };
        let encoded_value = operator.encode(decoded_value, data_type)?;
        Ok((encoded_value, metadata))
    }

    /// Invert an applied operator described by `metadata`.
    ///
    /// # Errors
    /// Returns [`OperatorError`] if the operator is not registered, decoding fails, or the decoded length differs from the length recorded in `metadata`.
    pub fn invert(
        &self,
        metadata: &InversionMetadata,
        encoded_value: Vec<u8>,
    ) -> Result<Vec<u8>, OperatorError> {
        let operator = self.create(&metadata.type_tag, &metadata.parameters)?;
        let decoded_value = operator.decode(encoded_value, metadata)?;
        if decoded_value.len() as u64 == metadata.decoded_length {
            Ok(decoded_value)
        } else {
            Err(OperatorError::InvalidEncodedLength {
                type_tag: metadata.type_tag.clone(),
                expected: metadata.decoded_length,
                got: decoded_value.len() as u64,
            })
        }
    }
}

fn check_data_type(operator: &dyn OperatorTraits, data_type: DataType) -> Result<(), OperatorError> {
    if operator.supports_data_type(data_type) {
        Ok(())
    } else {
        Err(OperatorError::UnsupportedType {
            type_tag: operator.type_tag().to_string(),
            data_type,
        })
    }
}

fn next_data_type(operator: &dyn OperatorTraits, data_type: DataType) -> DataType {
    if operator.preserves_data_type() {
        data_type
    } else {
        DataType::UInt8
    }
}

/// An operator attached to a variable with its per-variable parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    /// The operator.
    pub operator: OperatorHandle,
    /// The per-variable parameters.
    pub parameters: OperatorParameters,
}

/// An ordered list of operations, applied in order on write and inverted in reverse order on read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperatorChain {
    operations: Vec<Operation>,
}

impl OperatorChain {
    /// Create an empty (pass-through) operator chain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The operations of the chain.
    #[must_use]
    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    /// Returns true if the chain has no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Append `operation` after checking it against the data type it will see.
    ///
    /// Returns the index of the operation in the chain.
    ///
    /// # Errors
    /// Returns [`OperatorError`] if the operation cannot be applied to data of `data_type` after the existing operations.
    pub fn push(
        &mut self,
        registry: &OperatorRegistry,
        data_type: DataType,
        operation: Operation,
    ) -> Result<usize, OperatorError> {
        let mut data_type = data_type;
        for existing in &self.operations {
            data_type = registry.validate(&existing.operator, &existing.parameters, data_type)?;
        }
        registry.validate(&operation.operator, &operation.parameters, data_type)?;
        self.operations.push(operation);
        Ok(self.operations.len() - 1)
    }

    /// Apply every operation in order.
    ///
    /// # Errors
    /// Returns [`OperatorError`] if any operation fails.
    pub fn apply(
        &self,
        registry: &OperatorRegistry,
        data_type: DataType,
        decoded_value: Vec<u8>,
    ) -> Result<(Vec<u8>, Vec<InversionMetadata>), OperatorError> {
        let mut data_type = data_type;
        let mut value = decoded_value;
        let mut metadata = Vec::with_capacity(self.operations.len());
        for operation in &self.operations {
            let (encoded, inversion) =
                registry.apply(&operation.operator, &operation.parameters, data_type, value)?;
            let operator = registry.create(&inversion.type_tag, &inversion.parameters)?;
            data_type = next_data_type(&*operator, data_type);
            metadata.push(inversion);
            value = encoded;
        }
        Ok((value, metadata))
    }

    /// Invert the operations described by `metadata` in reverse order.
    ///
    /// # Errors
    /// Returns [`OperatorError`] if any inversion fails.
    pub fn invert(
        registry: &OperatorRegistry,
        metadata: &[InversionMetadata],
        encoded_value: Vec<u8>,
    ) -> Result<Vec<u8>, OperatorError> {
        metadata
            .iter()
            .rev()
            .try_fold(encoded_value, |value, inversion| {
                registry.invert(inversion, value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters(pairs: &[(&str, &str)]) -> OperatorParameters {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[derive(Debug)]
    struct Reverse;

    impl OperatorTraits for Reverse {
        fn type_tag(&self) -> &'static str {
            "reverse"
        }

        fn encode(
            &self,
            mut decoded_value: Vec<u8>,
            _data_type: DataType,
        ) -> Result<Vec<u8>, OperatorError> {
            decoded_value.reverse();
            Ok(decoded_value)
        }

        fn decode(
            &self,
            mut encoded_value: Vec<u8>,
            _metadata: &InversionMetadata,
        ) -> Result<Vec<u8>, OperatorError> {
            encoded_value.reverse();
            Ok(encoded_value)
        }
    }

    #[test]
    fn registry_empty() {
        let registry = OperatorRegistry::new();
        assert_eq!(registry.type_tags().count(), 0);
        assert!(matches!(
            registry.define_operator("crc32c", OperatorParameters::new()),
            Err(OperatorError::UnsupportedOperator(tag)) if tag == "crc32c"
        ));
    }

    #[test]
    fn registry_builtin() {
        let registry = OperatorRegistry::with_builtin();
        assert!(registry.contains("crc32c"));
        assert!(registry.contains("shuffle"));
        #[cfg(feature = "png")]
        assert!(registry.contains("png"));
        assert!(!registry.contains("sz"));
    }

    #[test]
    fn registry_custom_operator() {
        let mut registry = OperatorRegistry::new();
        registry.register_operator("reverse", |_: &OperatorParameters| {
            Ok(Arc::new(Reverse) as Operator)
        });
        let handle = registry
            .define_operator("reverse", OperatorParameters::new())
            .unwrap();
        let (encoded, metadata) = registry
            .apply(&handle, &OperatorParameters::new(), DataType::UInt8, vec![1, 2, 3])
            .unwrap();
        assert_eq!(encoded, vec![3, 2, 1]);
        assert_eq!(metadata.element_count, 3);
        assert_eq!(registry.invert(&metadata, encoded).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn invert_detects_length_mismatch() {
        let registry = OperatorRegistry::with_builtin();
        let handle = registry
            .define_operator("shuffle", OperatorParameters::new())
            .unwrap();
        let (encoded, mut metadata) = registry
            .apply(&handle, &OperatorParameters::new(), DataType::UInt16, vec![1, 2, 3, 4])
            .unwrap();
        metadata.decoded_length = 2;
        assert!(matches!(
            registry.invert(&metadata, encoded),
            Err(OperatorError::InvalidEncodedLength { expected: 2, got: 4, .. })
        ));
    }

    #[test]
    fn merged_parameters() {
        let registry = OperatorRegistry::with_builtin();
        let handle = registry
            .define_operator("crc32c", parameters(&[("a", "1"), ("b", "2")]))
            .unwrap();
        let merged = handle.merged_parameters(&parameters(&[("b", "3")]));
        assert_eq!(merged, parameters(&[("a", "1"), ("b", "3")]));
    }

    #[test]
    fn parse_parameters() {
        let params = parameters(&[("level", "4"), ("bad", "x")]);
        assert_eq!(parse_parameter::<u32>("t", &params, "level", None).unwrap(), 4);
        assert_eq!(parse_parameter::<u32>("t", &params, "other", Some(7)).unwrap(), 7);
        assert!(parse_parameter::<u32>("t", &params, "other", None).is_err());
        assert!(parse_parameter::<u32>("t", &params, "bad", Some(1)).is_err());
        assert!(parse_parameter_in_range::<u32>("t", &params, "level", None, 0..=3).is_err());
        assert!(parse_parameter_in_range::<u32>("t", &params, "level", None, 0..=9).is_ok());
    }

    #[test]
    fn chain_round_trip() {
        let registry = OperatorRegistry::with_builtin();
        let shuffle = registry
            .define_operator("shuffle", OperatorParameters::new())
            .unwrap();
        let crc32c = registry
            .define_operator("crc32c", OperatorParameters::new())
            .unwrap();
        let mut chain = OperatorChain::new();
        for operator in [shuffle, crc32c] {
            chain
                .push(
                    &registry,
                    DataType::Int32,
                    Operation {
                        operator,
                        parameters: OperatorParameters::new(),
                    },
                )
                .unwrap();
        }
        let elements: Vec<i32> = (-50..50).collect();
        let bytes = bytemuck::cast_slice::<i32, u8>(&elements).to_vec();
        let (encoded, metadata) = chain.apply(&registry, DataType::Int32, bytes.clone()).unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata[0].data_type, DataType::Int32);
        assert_eq!(metadata[1].data_type, DataType::UInt8);
        assert_eq!(encoded.len(), bytes.len() + 4);
        let decoded = OperatorChain::invert(&registry, &metadata, encoded).unwrap();
        assert_eq!(decoded, bytes);
    }

    #[test]
    fn chain_empty_is_pass_through() {
        let registry = OperatorRegistry::new();
        let chain = OperatorChain::new();
        let (encoded, metadata) = chain.apply(&registry, DataType::UInt8, vec![1, 2]).unwrap();
        assert!(metadata.is_empty());
        assert_eq!(OperatorChain::invert(&registry, &metadata, encoded).unwrap(), vec![1, 2]);
    }

    #[test]
    fn inversion_metadata_serde() {
        let metadata = InversionMetadata {
            type_tag: "png".to_string(),
            parameters: parameters(&[("compression_level", "1")]),
            data_type: DataType::Float32,
            element_count: 10,
            decoded_length: 40,
            header: vec![4],
        };
        let json = serde_json::to_string(&metadata).unwrap();
        let metadata_de: InversionMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(metadata, metadata_de);
    }
}
