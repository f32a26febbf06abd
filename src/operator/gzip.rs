//! The `gzip` operator.
//!
//! ### Parameters
//!  - `level`: the gzip compression level in `[0, 9]`, default 6.

use std::io::{Cursor, Read};

use flate2::bufread::{GzDecoder, GzEncoder};

use crate::data_type::DataType;

use super::{
    parse_parameter_in_range, read_decoded, InversionMetadata, Operator, OperatorError,
    OperatorParameters, OperatorPlugin, OperatorTraits,
};

/// The type tag of the `gzip` operator.
pub const IDENTIFIER: &str = "gzip";

// Register the operator.
inventory::submit! {
    OperatorPlugin::new(IDENTIFIER, create_operator_gzip)
}

fn create_operator_gzip(parameters: &OperatorParameters) -> Result<Operator, OperatorError> {
    let level = parse_parameter_in_range(IDENTIFIER, parameters, "level", Some(6), 0..=9)?;
    Ok(std::sync::Arc::new(GzipOperator { level }))
}

/// A `gzip` operator implementation.
#[derive(Clone, Debug)]
pub struct GzipOperator {
    level: u32,
}

impl OperatorTraits for GzipOperator {
    fn type_tag(&self) -> &'static str {
        IDENTIFIER
    }

    fn encode(
        &self,
        decoded_value: Vec<u8>,
        _data_type: DataType,
    ) -> Result<Vec<u8>, OperatorError> {
        let mut encoder = GzEncoder::new(
            Cursor::new(decoded_value),
            flate2::Compression::new(self.level),
        );
        let mut out: Vec<u8> = Vec::new();
        encoder.read_to_end(&mut out)?;
        Ok(out)
    }

    fn decode(
        &self,
        encoded_value: Vec<u8>,
        metadata: &InversionMetadata,
    ) -> Result<Vec<u8>, OperatorError> {
        read_decoded(
            GzDecoder::new(Cursor::new(encoded_value)),
            metadata.decoded_length,
        )
    }
}
