//! The `zstd` operator.
//!
//! ### Parameters
//!  - `level`: the zstd compression level in `[-7, 22]`, default 3.
//!  - `checksum`: `true` to include a zstd frame checksum, default `false`.

use crate::data_type::DataType;

use super::{
    parse_parameter, parse_parameter_in_range, InversionMetadata, Operator, OperatorError,
    OperatorParameters, OperatorPlugin, OperatorTraits,
};

/// The type tag of the `zstd` operator.
pub const IDENTIFIER: &str = "zstd";

// Register the operator.
inventory::submit! {
    OperatorPlugin::new(IDENTIFIER, create_operator_zstd)
}

fn create_operator_zstd(parameters: &OperatorParameters) -> Result<Operator, OperatorError> {
    let level = parse_parameter_in_range(IDENTIFIER, parameters, "level", Some(3), -7..=22)?;
    let checksum = parse_parameter(IDENTIFIER, parameters, "checksum", Some(false))?;
    Ok(std::sync::Arc::new(ZstdOperator::new(level, checksum)))
}

/// A `zstd` operator implementation.
#[derive(Clone, Debug)]
pub struct ZstdOperator {
    level: zstd::zstd_safe::CompressionLevel,
    checksum: bool,
}

impl ZstdOperator {
    /// Create a new `zstd` operator.
    #[must_use]
    pub const fn new(level: zstd::zstd_safe::CompressionLevel, checksum: bool) -> Self {
        Self { level, checksum }
    }
}

impl OperatorTraits for ZstdOperator {
    fn type_tag(&self) -> &'static str {
        IDENTIFIER
    }

    fn encode(
        &self,
        decoded_value: Vec<u8>,
        _data_type: DataType,
    ) -> Result<Vec<u8>, OperatorError> {
        let mut compressor = zstd::bulk::Compressor::new(self.level)?;
        compressor.include_checksum(self.checksum)?;
        Ok(compressor.compress(&decoded_value)?)
    }

    fn decode(
        &self,
        encoded_value: Vec<u8>,
        metadata: &InversionMetadata,
    ) -> Result<Vec<u8>, OperatorError> {
        let capacity = usize::try_from(metadata.decoded_length)
            .map_err(|_| OperatorError::Other("zstd decoded length exceeds usize".to_string()))?;
        Ok(zstd::bulk::decompress(&encoded_value, capacity)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorRegistry;

    #[test]
    fn operator_zstd_round_trip() {
        let registry = OperatorRegistry::with_builtin();
        let global: OperatorParameters = [
            ("level".to_string(), "5".to_string()),
            ("checksum".to_string(), "true".to_string()),
        ]
        .into();
        let handle = registry.define_operator(IDENTIFIER, global).unwrap();
        let elements: Vec<i64> = (0..20_000).map(|i| i / 7).collect();
        for bytes in [
            vec![],
            1i64.to_ne_bytes().to_vec(),
            bytemuck::cast_slice::<i64, u8>(&elements).to_vec(),
        ] {
            let (encoded, metadata) = registry
                .apply(&handle, &OperatorParameters::new(), DataType::Int64, bytes.clone())
                .unwrap();
            assert_eq!(registry.invert(&metadata, encoded).unwrap(), bytes);
        }
    }

    #[test]
    fn operator_zstd_invalid_parameters() {
        let registry = OperatorRegistry::with_builtin();
        for (name, value) in [("level", "23"), ("level", "-8"), ("checksum", "maybe")] {
            let parameters: OperatorParameters = [(name.to_string(), value.to_string())].into();
            assert!(matches!(
                registry.create(IDENTIFIER, &parameters),
                Err(OperatorError::InvalidParameter { .. })
            ));
        }
    }
}
