//! The `png` operator.
//!
//! A lossless image-style codec: each element byte is replaced by its difference from the same byte of the previous element (the PNG "sub" filter with one pixel per element), then the filtered bytes are deflated with zlib.
//!
//! ### Parameters
//!  - `compression_level`: the zlib compression level in `[0, 9]`, default 6.

use std::io::{Cursor, Read};

use flate2::bufread::{ZlibDecoder, ZlibEncoder};

use crate::data_type::DataType;

use super::{
    parse_parameter_in_range, read_decoded, InversionMetadata, Operator, OperatorError,
    OperatorParameters, OperatorPlugin, OperatorTraits,
};

/// The type tag of the `png` operator.
pub const IDENTIFIER: &str = "png";

/// The default compression level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

// Register the operator.
inventory::submit! {
    OperatorPlugin::new(IDENTIFIER, create_operator_png)
}

fn create_operator_png(parameters: &OperatorParameters) -> Result<Operator, OperatorError> {
    let compression_level = parse_parameter_in_range(
        IDENTIFIER,
        parameters,
        "compression_level",
        Some(DEFAULT_COMPRESSION_LEVEL),
        0..=9,
    )?;
    Ok(std::sync::Arc::new(PngOperator { compression_level }))
}

/// A `png` operator implementation.
#[derive(Clone, Debug)]
pub struct PngOperator {
    compression_level: u32,
}

impl PngOperator {
    /// Create a new `png` operator.
    ///
    /// # Errors
    /// Returns [`OperatorError::InvalidParameter`] if `compression_level` is greater than 9.
    pub fn new(compression_level: u32) -> Result<Self, OperatorError> {
        if compression_level > 9 {
            return Err(OperatorError::invalid_parameter(
                IDENTIFIER,
                "compression_level",
                format!("{compression_level} is outside of the range [0, 9]"),
            ));
        }
        Ok(Self { compression_level })
    }
}

fn filter_sub(bytes: &mut [u8], lanes: usize) {
    for i in (lanes..bytes.len()).rev() {
        bytes[i] = bytes[i].wrapping_sub(bytes[i - lanes]);
    }
}

fn unfilter_sub(bytes: &mut [u8], lanes: usize) {
    for i in lanes..bytes.len() {
        bytes[i] = bytes[i].wrapping_add(bytes[i - lanes]);
    }
}

impl OperatorTraits for PngOperator {
    fn type_tag(&self) -> &'static str {
        IDENTIFIER
    }

    fn header(&self, data_type: DataType) -> Vec<u8> {
        // Bytes per pixel, the distance used by the sub filter.
        vec![u8::try_from(data_type.size()).unwrap_or(u8::MAX)]
    }

    fn encode(
        &self,
        mut decoded_value: Vec<u8>,
        data_type: DataType,
    ) -> Result<Vec<u8>, OperatorError> {
        filter_sub(&mut decoded_value, data_type.size());
        let mut encoder = ZlibEncoder::new(
            Cursor::new(decoded_value),
            flate2::Compression::new(self.compression_level),
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
        let lanes = metadata
            .header
            .first()
            .map_or(metadata.data_type.size(), |&lanes| usize::from(lanes));
        if lanes == 0 {
            return Err(OperatorError::Other(
                "png operator header has zero bytes per pixel".to_string(),
            ));
        }
        let mut out = read_decoded(
            ZlibDecoder::new(Cursor::new(encoded_value)),
            metadata.decoded_length,
        )?;
        unfilter_sub(&mut out, lanes);
        Ok(out)
    }
}
