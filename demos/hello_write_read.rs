use std::sync::Arc;

use steparray::{
    catalog::Catalog,
    engine::{Engine, StepStatus},
    operator::OperatorRegistry,
    transport::filesystem::FilesystemTransport,
};

fn hello_write_read() -> Result<(), Box<dyn std::error::Error>> {
    // Create a stream in a temporary directory
    let path = tempfile::TempDir::new()?;
    let registry = Arc::new(OperatorRegistry::with_builtin());

    // Write three steps of a 1D variable
    let transport = Arc::new(FilesystemTransport::new(path.path())?);
    let mut writer = Engine::new_writer(Catalog::new(registry.clone()), transport);
    let temperature = writer.catalog_mut().define_variable::<f32>(
        "temperature",
        &[10], // global shape
        &[0],  // block start
        &[10], // block count
        true,
    )?;
    writer.open()?;
    for step in 0..3u8 {
        let data: Vec<f32> = (0..10u8)
            .map(|i| f32::from(step) * 10.0 + f32::from(i))
            .collect();
        writer.begin_step()?;
        writer.put(&temperature, &data)?;
        writer.end_step()?;
    }
    writer.close()?;

    // Read it back
    let transport = Arc::new(FilesystemTransport::new(path.path())?);
    let mut reader = Engine::new_reader(Catalog::new(registry), transport);
    reader.open()?;
    println!("The stream holds:");
    for variable in reader.catalog().available_variables() {
        println!(
            "  {} {} {:?} over {} steps",
            variable.data_type(),
            variable.name(),
            variable.shape(),
            variable.steps()
        );
    }
    let mut values = Vec::new();
    while reader.begin_step()? == StepStatus::Ok {
        let temperature = reader
            .catalog()
            .inquire_variable::<f32>("temperature")?
            .ok_or("temperature not found")?;
        reader.get(&temperature, &mut values)?;
        println!("step {}: {values:?}", reader.current_step());
        reader.end_step()?;
    }
    reader.close()?;

    Ok(())
}

fn main() {
    if let Err(err) = hello_write_read() {
        println!("{}", err);
    }
}
