use std::{
    error::Error,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use steparray::{
    catalog::Catalog,
    engine::{Engine, EngineError, EngineState, StepStatus},
    operator::{OperatorParameters, OperatorRegistry},
    transport::{
        memory::MemoryTransport, BlockDescriptor, TransportError, WritableTransportTraits,
    },
};

/// A memory transport that fails to flush while `fail` is set.
struct FlakyTransport {
    inner: Arc<MemoryTransport>,
    fail: AtomicBool,
    discarded: AtomicUsize,
}

impl WritableTransportTraits for FlakyTransport {
    fn open_write(&self) -> Result<(), TransportError> {
        self.inner.open_write()
    }

    fn write_block(
        &self,
        step: u64,
        variable_name: &str,
        encoded: Vec<u8>,
        descriptor: &BlockDescriptor,
    ) -> Result<(), TransportError> {
        self.inner
            .write_block(step, variable_name, encoded, descriptor)
    }

    fn flush_step(&self, step: u64) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            Err(TransportError::Other("disk full".to_string()))
        } else {
            self.inner.flush_step(step)
        }
    }

    fn discard_step(&self, step: u64) -> Result<(), TransportError> {
        self.discarded.fetch_add(1, Ordering::SeqCst);
        self.inner.discard_step(step)
    }

    fn close_write(&self) -> Result<(), TransportError> {
        self.inner.close_write()
    }
}

#[test]
fn failed_flush_discards_step() -> Result<(), Box<dyn Error>> {
    let registry = Arc::new(OperatorRegistry::with_builtin());
    let inner = Arc::new(MemoryTransport::new());
    let flaky = Arc::new(FlakyTransport {
        inner: inner.clone(),
        fail: AtomicBool::new(false),
        discarded: AtomicUsize::new(0),
    });
    let mut writer = Engine::new_writer(Catalog::new(registry.clone()), flaky.clone());
    let values = writer
        .catalog_mut()
        .define_variable::<i32>("values", &[2], &[0], &[2], true)?;
    writer.open()?;

    writer.begin_step()?;
    writer.put(&values, &[1, 2])?;
    writer.end_step()?;

    flaky.fail.store(true, Ordering::SeqCst);
    writer.begin_step()?;
    writer.put(&values, &[-1, -2])?;
    assert!(matches!(
        writer.end_step(),
        Err(EngineError::Transport {
            step: 1,
            source: TransportError::Other(_),
        })
    ));
    assert_eq!(writer.state(), EngineState::Open);
    assert_eq!(writer.current_step(), 1);
    assert_eq!(writer.catalog().variable(&values)?.steps(), 1);
    assert_eq!(flaky.discarded.load(Ordering::SeqCst), 1);
    assert_eq!(inner.committed_steps(), 1);

    // the step can be written again
    flaky.fail.store(false, Ordering::SeqCst);
    writer.begin_step()?;
    writer.put(&values, &[3, 4])?;
    writer.end_step()?;
    writer.close()?;
    assert_eq!(writer.catalog().variable(&values)?.steps(), 2);

    let mut reader = Engine::new_reader(Catalog::new(registry), inner);
    reader.open()?;
    let mut out = Vec::new();
    for expected in [[1, 2], [3, 4]] {
        assert_eq!(reader.begin_step()?, StepStatus::Ok);
        let values = reader
            .catalog()
            .inquire_variable::<i32>("values")?
            .ok_or("values not found")?;
        reader.get(&values, &mut out)?;
        assert_eq!(out, expected);
        reader.end_step()?;
    }
    assert_eq!(reader.begin_step()?, StepStatus::EndOfStream);
    Ok(())
}

#[test]
fn failed_first_step_allows_operations() -> Result<(), Box<dyn Error>> {
    let registry = Arc::new(OperatorRegistry::with_builtin());
    let flaky = Arc::new(FlakyTransport {
        inner: Arc::new(MemoryTransport::new()),
        fail: AtomicBool::new(true),
        discarded: AtomicUsize::new(0),
    });
    let mut writer = Engine::new_writer(Catalog::new(registry.clone()), flaky.clone());
    let values = writer
        .catalog_mut()
        .define_variable::<i32>("values", &[2], &[0], &[2], true)?;
    writer.open()?;
    writer.begin_step()?;
    writer.put(&values, &[1, 2])?;
    assert!(writer.end_step().is_err());
    assert_eq!(writer.catalog().variable(&values)?.steps(), 0);

    // nothing was committed, so the variable can still take operations
    let shuffle = registry.define_operator("shuffle", OperatorParameters::new())?;
    writer
        .catalog_mut()
        .add_operation(&values, &shuffle, OperatorParameters::new())?;

    flaky.fail.store(false, Ordering::SeqCst);
    writer.begin_step()?;
    writer.put(&values, &[3, 4])?;
    writer.end_step()?;
    assert!(writer
        .catalog_mut()
        .add_operation(&values, &shuffle, OperatorParameters::new())
        .is_err());
    writer.close()?;
    Ok(())
}
