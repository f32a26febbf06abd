//! The `crc32c` (CRC32C checksum) operator.
//!
//! Appends a little-endian CRC32C checksum of the input.
//! The checksum is verified on decode if [`validate_checksums`](crate::config::Config#validate-checksums) is enabled.

use crate::{config::global_config, data_type::DataType};

use super::{
    InversionMetadata, Operator, OperatorError, OperatorParameters, OperatorPlugin, OperatorTraits,
};

/// The type tag of the `crc32c` operator.
pub const IDENTIFIER: &str = "crc32c";

const CHECKSUM_SIZE: usize = core::mem::size_of::<u32>();

// Register the operator.
inventory::submit! {
    OperatorPlugin::new(IDENTIFIER, create_operator_crc32c)
}

fn create_operator_crc32c(_parameters: &OperatorParameters) -> Result<Operator, OperatorError> {
    Ok(std::sync::Arc::new(Crc32cOperator))
}

/// A `crc32c` operator implementation.
#[derive(Clone, Copy, Debug, Default)]
pub struct Crc32cOperator;

impl OperatorTraits for Crc32cOperator {
    fn type_tag(&self) -> &'static str {
        IDENTIFIER
    }

    fn encode(
        &self,
        mut decoded_value: Vec<u8>,
        _data_type: DataType,
    ) -> Result<Vec<u8>, OperatorError> {
        let checksum = crc32c::crc32c(&decoded_value).to_le_bytes();
        decoded_value.reserve_exact(checksum.len());
        decoded_value.extend(&checksum);
        Ok(decoded_value)
    }

    fn decode(
        &self,
        mut encoded_value: Vec<u8>,
        _metadata: &InversionMetadata,
    ) -> Result<Vec<u8>, OperatorError> {
        if encoded_value.len() < CHECKSUM_SIZE {
            return Err(OperatorError::Other(
                "CRC32C checksum decoder expects a 32 bit input".to_string(),
            ));
        }
        let decoded_length = encoded_value.len() - CHECKSUM_SIZE;
        if global_config().validate_checksums() {
            let checksum = crc32c::crc32c(&encoded_value[..decoded_length]).to_le_bytes();
            if checksum != encoded_value[decoded_length..] {
                return Err(OperatorError::InvalidChecksum(IDENTIFIER.to_string()));
            }
        } else {
            log::warn!("skipping crc32c checksum validation");
        }
        encoded_value.truncate(decoded_length);
        Ok(encoded_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorRegistry;

    #[test]
    fn operator_crc32c() {
        let bytes: Vec<u8> = (0..6).collect();
        let encoded = Crc32cOperator.encode(bytes.clone(), DataType::UInt8).unwrap();
        let checksum: &[u8; 4] = &encoded[encoded.len() - CHECKSUM_SIZE..].try_into().unwrap();
        assert_eq!(checksum, &[20, 133, 9, 65]);

        let registry = OperatorRegistry::with_builtin();
        let handle = registry
            .define_operator(IDENTIFIER, OperatorParameters::new())
            .unwrap();
        let (encoded, metadata) = registry
            .apply(&handle, &OperatorParameters::new(), DataType::UInt8, bytes.clone())
            .unwrap();
        assert_eq!(registry.invert(&metadata, encoded).unwrap(), bytes);
    }

    #[test]
    fn operator_crc32c_corrupt() {
        let registry = OperatorRegistry::with_builtin();
        let handle = registry
            .define_operator(IDENTIFIER, OperatorParameters::new())
            .unwrap();
        let (mut encoded, metadata) = registry
            .apply(&handle, &OperatorParameters::new(), DataType::UInt8, vec![1, 2, 3])
            .unwrap();
        encoded[1] ^= 0xff;
        assert!(matches!(
            registry.invert(&metadata, encoded),
            Err(OperatorError::InvalidChecksum(_))
        ));
        assert!(Crc32cOperator.decode(vec![1, 2], &metadata).is_err());
    }
}
