//! The `bitround` operator.
//!
//! Rounds the mantissa of floating point elements to `keepbits` bits, so that a following compressing operator can exploit the trailing zero bits.
//! This operator is lossy: the reconstruction error of each element is at most half a unit in the last kept mantissa bit.
//! Decoding is the identity.
//!
//! ### Parameters
//!  - `keepbits`: the number of mantissa bits to keep (required).
//!    It must not exceed the mantissa width of the data type (23 for `float32`, 52 for `float64`), which is checked when the operator is first applied.

use crate::data_type::DataType;

use super::{
    parse_parameter, InversionMetadata, Operator, OperatorError, OperatorParameters,
    OperatorPlugin, OperatorTraits,
};

/// The type tag of the `bitround` operator.
pub const IDENTIFIER: &str = "bitround";

// Register the operator.
inventory::submit! {
    OperatorPlugin::new(IDENTIFIER, create_operator_bitround)
}

fn create_operator_bitround(parameters: &OperatorParameters) -> Result<Operator, OperatorError> {
    let keepbits = parse_parameter(IDENTIFIER, parameters, "keepbits", None)?;
    Ok(std::sync::Arc::new(BitroundOperator::new(keepbits)))
}

/// A `bitround` operator implementation.
#[derive(Clone, Debug)]
pub struct BitroundOperator {
    keepbits: u32,
}

impl BitroundOperator {
    /// Create a new `bitround` operator.
    #[must_use]
    pub const fn new(keepbits: u32) -> Self {
        Self { keepbits }
    }
}

const fn round_bits32(mut input: u32, keepbits: u32, maxbits: u32) -> u32 {
    if keepbits < maxbits {
        let maskbits = maxbits - keepbits;
        let mask = (u32::MAX >> maskbits) << maskbits;
        let half_quantum1 = (1 << (maskbits - 1)) - 1;
        input = input.saturating_add(((input >> maskbits) & 1) + half_quantum1) & mask;
    }
    input
}

const fn round_bits64(mut input: u64, keepbits: u32, maxbits: u32) -> u64 {
    if keepbits < maxbits {
        let maskbits = maxbits - keepbits;
        let mask = (u64::MAX >> maskbits) << maskbits;
        let half_quantum1 = (1 << (maskbits - 1)) - 1;
        input = input.saturating_add(((input >> maskbits) & 1) + half_quantum1) & mask;
    }
    input
}

const fn mantissa_bits(data_type: DataType) -> Option<u32> {
    match data_type {
        DataType::Float32 => Some(23),
        DataType::Float64 => Some(52),
        _ => None,
    }
}

impl OperatorTraits for BitroundOperator {
    fn type_tag(&self) -> &'static str {
        IDENTIFIER
    }

    fn supports_data_type(&self, data_type: DataType) -> bool {
        mantissa_bits(data_type).is_some()
    }

    fn preserves_data_type(&self) -> bool {
        true
    }

    fn header(&self, _data_type: DataType) -> Vec<u8> {
        self.keepbits.to_le_bytes().to_vec()
    }

    fn encode(
        &self,
        mut decoded_value: Vec<u8>,
        data_type: DataType,
    ) -> Result<Vec<u8>, OperatorError> {
        let maxbits = mantissa_bits(data_type).ok_or_else(|| OperatorError::UnsupportedType {
            type_tag: IDENTIFIER.to_string(),
            data_type,
        })?;
        if self.keepbits > maxbits {
            return Err(OperatorError::invalid_parameter(
                IDENTIFIER,
                "keepbits",
                format!(
                    "{} exceeds the {maxbits} mantissa bits of {data_type}",
                    self.keepbits
                ),
            ));
        }
        match data_type {
            DataType::Float32 => {
                for chunk in decoded_value.chunks_exact_mut(4) {
                    let element = u32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    let element = round_bits32(element, self.keepbits, maxbits);
                    chunk.copy_from_slice(&element.to_ne_bytes());
                }
            }
            _ => {
                for chunk in decoded_value.chunks_exact_mut(8) {
                    let mut element = [0u8; 8];
                    element.copy_from_slice(chunk);
                    let element = u64::from_ne_bytes(element);
                    let element = round_bits64(element, self.keepbits, maxbits);
                    chunk.copy_from_slice(&element.to_ne_bytes());
                }
            }
        }
        Ok(decoded_value)
    }

    fn decode(
        &self,
        encoded_value: Vec<u8>,
        _metadata: &InversionMetadata,
    ) -> Result<Vec<u8>, OperatorError> {
        Ok(encoded_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::OperatorRegistry;

    fn keepbits(keepbits: &str) -> OperatorParameters {
        [("keepbits".to_string(), keepbits.to_string())].into()
    }

    #[test]
    fn operator_bitround_float32() {
        let elements: Vec<f32> = vec![0.0, 1.5, 2.3, 3.0, -4.25, 1000.125];
        let bytes = bytemuck::cast_slice::<f32, u8>(&elements).to_vec();
        let encoded = BitroundOperator::new(3)
            .encode(bytes, DataType::Float32)
            .unwrap();
        let decoded: Vec<f32> = bytemuck::pod_collect_to_vec(&encoded);
        assert_eq!(decoded[0], 0.0);
        assert_eq!(decoded[1], 1.5);
        assert_eq!(decoded[3], 3.0);
        for (original, rounded) in std::iter::zip(&elements, &decoded) {
            // Half a unit in the last kept bit, relative to the magnitude.
            let bound = original.abs() * 2f32.powi(-(3 + 1));
            assert!((original - rounded).abs() <= bound, "{original} {rounded}");
        }
    }

    #[test]
    fn operator_bitround_float64_bound() {
        let registry = OperatorRegistry::with_builtin();
        let handle = registry
            .define_operator(IDENTIFIER, keepbits("10"))
            .unwrap();
        let elements: Vec<f64> = (1..1000).map(|i| f64::from(i) * 0.731).collect();
        let bytes = bytemuck::cast_slice::<f64, u8>(&elements).to_vec();
        let (encoded, metadata) = registry
            .apply(&handle, &OperatorParameters::new(), DataType::Float64, bytes)
            .unwrap();
        assert_eq!(metadata.header, 10u32.to_le_bytes().to_vec());
        let decoded = registry.invert(&metadata, encoded).unwrap();
        let decoded: Vec<f64> = bytemuck::pod_collect_to_vec(&decoded);
        for (original, rounded) in std::iter::zip(&elements, &decoded) {
            assert!((original - rounded).abs() <= original.abs() * 2f64.powi(-11));
        }
    }

    #[test]
    fn operator_bitround_keepbits_validated_on_apply() {
        let registry = OperatorRegistry::with_builtin();
        let handle = registry.define_operator(IDENTIFIER, keepbits("30")).unwrap();
        // Accepted for float32 until it is applied.
        assert!(registry
            .validate(&handle, &OperatorParameters::new(), DataType::Float32)
            .is_ok());
        assert!(matches!(
            registry.apply(&handle, &OperatorParameters::new(), DataType::Float32, vec![0; 4]),
            Err(OperatorError::InvalidParameter { .. })
        ));
        assert!(registry
            .apply(&handle, &OperatorParameters::new(), DataType::Float64, vec![0; 8])
            .is_ok());
    }

    #[test]
    fn operator_bitround_unsupported() {
        let registry = OperatorRegistry::with_builtin();
        let handle = registry.define_operator(IDENTIFIER, keepbits("3")).unwrap();
        assert!(matches!(
            registry.validate(&handle, &OperatorParameters::new(), DataType::Int32),
            Err(OperatorError::UnsupportedType { .. })
        ));
        let handle = registry
            .define_operator(IDENTIFIER, OperatorParameters::new())
            .unwrap();
        assert!(matches!(
            registry.validate(&handle, &OperatorParameters::new(), DataType::Float32),
            Err(OperatorError::InvalidParameter { .. })
        ));
    }
}
