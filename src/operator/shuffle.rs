//! The `shuffle` operator.
//!
//! Transposes the bytes of each element so that byte `i` of every element is stored contiguously.
//! This often makes data more compressible by a following operator.

use crate::data_type::DataType;

use super::{
    InversionMetadata, Operator, OperatorError, OperatorParameters, OperatorPlugin, OperatorTraits,
};

/// The type tag of the `shuffle` operator.
pub const IDENTIFIER: &str = "shuffle";

// Register the operator.
inventory::submit! {
    OperatorPlugin::new(IDENTIFIER, create_operator_shuffle)
}

fn create_operator_shuffle(_parameters: &OperatorParameters) -> Result<Operator, OperatorError> {
    Ok(std::sync::Arc::new(ShuffleOperator))
}

/// A `shuffle` operator implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShuffleOperator;

fn check_length(len: usize, elementsize: usize) -> Result<(), OperatorError> {
    if len % elementsize == 0 {
        Ok(())
    } else {
        Err(OperatorError::Other(format!(
            "the shuffle operator expects the input byte length {len} to be an integer multiple of the element size {elementsize}"
        )))
    }
}

impl OperatorTraits for ShuffleOperator {
    fn type_tag(&self) -> &'static str {
        IDENTIFIER
    }

    fn encode(
        &self,
        decoded_value: Vec<u8>,
        data_type: DataType,
    ) -> Result<Vec<u8>, OperatorError> {
        let elementsize = data_type.size();
        check_length(decoded_value.len(), elementsize)?;
        let mut encoded_value = decoded_value.clone();
        let count = decoded_value.len() / elementsize;
        for i in 0..count {
            let offset = i * elementsize;
            for byte_index in 0..elementsize {
                encoded_value[byte_index * count + i] = decoded_value[offset + byte_index];
            }
        }
        Ok(encoded_value)
    }

    fn decode(
        &self,
        encoded_value: Vec<u8>,
        metadata: &InversionMetadata,
    ) -> Result<Vec<u8>, OperatorError> {
        let elementsize = metadata.data_type.size();
        check_length(encoded_value.len(), elementsize)?;
        let mut decoded_value = encoded_value.clone();
        let count = encoded_value.len() / elementsize;
        for i in 0..elementsize {
            let offset = i * count;
            for byte_index in 0..count {
                decoded_value[byte_index * elementsize + i] = encoded_value[offset + byte_index];
            }
        }
        Ok(decoded_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorRegistry;

    #[test]
    fn operator_shuffle() {
        let bytes: Vec<u8> = vec![0, 1, 2, 3, 10, 11, 12, 13];
        let encoded = ShuffleOperator.encode(bytes.clone(), DataType::UInt32).unwrap();
        assert_eq!(encoded, vec![0, 10, 1, 11, 2, 12, 3, 13]);
        assert!(ShuffleOperator.encode(vec![0, 1, 2], DataType::UInt16).is_err());
    }

    #[test]
    fn operator_shuffle_round_trip() {
        let registry = OperatorRegistry::with_builtin();
        let handle = registry
            .define_operator(IDENTIFIER, OperatorParameters::new())
            .unwrap();
        for data_type in DataType::ALL {
            let bytes: Vec<u8> = (0..data_type.size() * 33).map(|i| (i % 256) as u8).collect();
            let (encoded, metadata) = registry
                .apply(&handle, &OperatorParameters::new(), data_type, bytes.clone())
                .unwrap();
            assert_eq!(registry.invert(&metadata, encoded).unwrap(), bytes);
        }
    }
}
