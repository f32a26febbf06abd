use std::{error::Error, path::Path, sync::Arc};

use steparray::{
    array_subset::ArraySubset,
    catalog::Catalog,
    engine::{Engine, EngineError, StepStatus},
    operator::{OperatorParameters, OperatorRegistry},
    transport::{filesystem::FilesystemTransport, TransportError},
};

fn write_stream(path: &Path, operators: &[(&str, OperatorParameters)]) -> Result<Vec<f64>, Box<dyn Error>> {
    let registry = Arc::new(OperatorRegistry::with_builtin());
    let transport = Arc::new(FilesystemTransport::new(path)?);
    let mut writer = Engine::new_writer(Catalog::new(registry), transport);
    let field = writer
        .catalog_mut()
        .define_variable::<f64>("field", &[8, 8], &[0, 0], &[4, 8], false)?;
    for (type_tag, parameters) in operators {
        let operator = writer
            .catalog()
            .registry()
            .define_operator(type_tag, OperatorParameters::new())?;
        writer
            .catalog_mut()
            .add_operation(&field, &operator, parameters.clone())?;
    }

    let data: Vec<f64> = (0..64u8).map(|i| f64::from(i) * 0.25).collect();
    writer.open()?;
    for step in 0..3u8 {
        writer.begin_step()?;
        let offset = f64::from(step) * 100.0;
        // two halves of the field as separate blocks
        writer.catalog_mut().set_block(&field, &[0, 0], &[4, 8])?;
        let top: Vec<f64> = data[..32].iter().map(|v| v + offset).collect();
        writer.put(&field, &top)?;
        writer.catalog_mut().set_block(&field, &[4, 0], &[4, 8])?;
        let bottom: Vec<f64> = data[32..].iter().map(|v| v + offset).collect();
        writer.put(&field, &bottom)?;
        writer.end_step()?;
    }
    writer.close()?;
    Ok(data)
}

fn round_trip(operators: &[(&str, OperatorParameters)]) -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    let data = write_stream(path.path(), operators)?;

    let registry = Arc::new(OperatorRegistry::with_builtin());
    let transport = Arc::new(FilesystemTransport::new(path.path())?);
    let mut reader = Engine::new_reader(Catalog::new(registry), transport);
    reader.open()?;
    let mut out = Vec::new();
    for step in 0..3u8 {
        assert_eq!(reader.begin_step()?, StepStatus::Ok);
        let field = reader
            .catalog()
            .inquire_variable::<f64>("field")?
            .ok_or("field not found")?;
        assert_eq!(reader.catalog().variable(&field)?.steps(), 3);
        reader
            .catalog_mut()
            .set_selection(&field, ArraySubset::new_with_ranges(&[2..6, 0..8]))?;
        reader.get(&field, &mut out)?;
        let offset = f64::from(step) * 100.0;
        let expected: Vec<f64> = data[16..48].iter().map(|v| v + offset).collect();
        assert_eq!(out, expected);
        reader.end_step()?;
    }
    assert_eq!(reader.begin_step()?, StepStatus::EndOfStream);
    reader.close()?;
    Ok(())
}

#[test]
fn filesystem_round_trip() -> Result<(), Box<dyn Error>> {
    round_trip(&[])
}

#[test]
fn filesystem_round_trip_operators() -> Result<(), Box<dyn Error>> {
    let mut operators = vec![
        ("shuffle", OperatorParameters::new()),
        ("crc32c", OperatorParameters::new()),
    ];
    #[cfg(feature = "zstd")]
    operators.insert(
        1,
        (
            "zstd",
            [
                ("level".to_string(), "5".to_string()),
                ("checksum".to_string(), "true".to_string()),
            ]
            .into(),
        ),
    );
    round_trip(&operators)
}

#[test]
fn filesystem_existing_stream() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    write_stream(path.path(), &[])?;
    let transport = Arc::new(FilesystemTransport::new(path.path())?);
    let mut writer = Engine::new_writer(
        Catalog::new(Arc::new(OperatorRegistry::with_builtin())),
        transport,
    );
    assert!(matches!(writer.open(), Err(EngineError::Transport { .. })));
    Ok(())
}

#[test]
fn filesystem_checksum_corruption() -> Result<(), Box<dyn Error>> {
    let path = tempfile::TempDir::new()?;
    write_stream(path.path(), &[])?;
    let data_path = path.path().join("data.bin");
    let mut bytes = std::fs::read(&data_path)?;
    bytes[3] ^= 0xff;
    std::fs::write(&data_path, bytes)?;

    let transport = Arc::new(FilesystemTransport::new(path.path())?);
    let mut reader = Engine::new_reader(
        Catalog::new(Arc::new(OperatorRegistry::with_builtin())),
        transport,
    );
    reader.open()?;
    reader.begin_step()?;
    let field = reader
        .catalog()
        .inquire_variable::<f64>("field")?
        .ok_or("field not found")?;
    let mut out = Vec::new();
    assert!(matches!(
        reader.get(&field, &mut out),
        Err(EngineError::Transport {
            step: 0,
            source: TransportError::InvalidChecksum { block_id: 0, .. },
        })
    ));
    // the second block is intact
    reader
        .catalog_mut()
        .set_selection(&field, ArraySubset::new_with_ranges(&[4..8, 0..8]))?;
    reader.get(&field, &mut out)?;
    assert_eq!(out.len(), 32);
    Ok(())
}
