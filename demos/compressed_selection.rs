use std::sync::Arc;

use steparray::{
    array_subset::ArraySubset,
    catalog::Catalog,
    engine::{Engine, StepStatus},
    operator::{OperatorParameters, OperatorRegistry},
    transport::memory::MemoryTransport,
};

fn compressed_selection() -> Result<(), Box<dyn std::error::Error>> {
    let registry = Arc::new(OperatorRegistry::with_builtin());
    let transport = Arc::new(MemoryTransport::new());

    // Two contributors each write half of a 100x50 field
    let mut writer = Engine::new_writer(Catalog::new(registry.clone()), transport.clone());
    let field = writer
        .catalog_mut()
        .define_variable::<i32>("field", &[100, 50], &[0, 0], &[50, 50], false)?;
    let png = registry.define_operator(
        "png",
        [("compression_level".to_string(), "6".to_string())].into(),
    )?;
    writer.catalog_mut().add_operation(
        &field,
        &png,
        [("compression_level".to_string(), "9".to_string())].into(), // overrides the global level
    )?;

    writer.open()?;
    writer.begin_step()?;
    for (row_start, offset) in [(0, 0), (50, 2500)] {
        writer
            .catalog_mut()
            .set_block(&field, &[row_start, 0], &[50, 50])?;
        let data: Vec<i32> = (0..2500).map(|i| i + offset).collect();
        writer.put(&field, &data)?;
    }
    writer.end_step()?;
    writer.close()?;

    // Read a selection spanning both blocks
    let mut reader = Engine::new_reader(Catalog::new(registry), transport);
    reader.open()?;
    if reader.begin_step()? == StepStatus::Ok {
        let field = reader
            .catalog()
            .inquire_variable::<i32>("field")?
            .ok_or("field not found")?;
        for block in reader.catalog().variable(&field)?.blocks(0) {
            println!(
                "block {} [{:?} + {:?}]: {} bytes encoded",
                block.block_id, block.start, block.count, block.encoded_length
            );
        }
        reader
            .catalog_mut()
            .set_selection(&field, ArraySubset::new_with_ranges(&[48..52, 0..4]))?;
        let mut values = Vec::new();
        reader.get(&field, &mut values)?;
        println!("field[48..52, 0..4]:");
        for row in values.chunks(4) {
            println!("  {row:?}");
        }
        reader.end_step()?;
    }
    reader.close()?;

    Ok(())
}

fn main() {
    if let Err(err) = compressed_selection() {
        println!("{}", err);
    }
}
