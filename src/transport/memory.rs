//! An in-memory transport.

use std::{
    collections::BTreeMap,
    time::{Duration, Instant},
};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use crate::config::global_config;

use super::{
    BlockDescriptor, ReadableTransportTraits, StepAvailability, TransportError,
    VariableDescriptor, WritableTransportTraits,
};

type BlockKey = (u64, String, usize);

#[derive(Debug, Default)]
struct MemoryStream {
    writer_active: bool,
    end_of_stream: bool,
    committed_steps: u64,
    staged: BTreeMap<u64, Vec<(String, BlockDescriptor, Bytes)>>,
    variables: BTreeMap<String, VariableDescriptor>,
    blocks: BTreeMap<BlockKey, Bytes>,
}

/// An in-memory transport.
///
/// A writer and any number of readers in the same process share the stream through an [`Arc`](std::sync::Arc).
/// A blocking [`advance_to_next_step`](ReadableTransportTraits::advance_to_next_step) waits for the writer to commit a step for up to the transport timeout.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    stream: Mutex<MemoryStream>,
    step_committed: Condvar,
    timeout: Option<Duration>,
}

impl MemoryTransport {
    /// Create a new memory transport.
    ///
    /// Blocking reads wait for the [step timeout](crate::config::Config#step-timeout) of the global configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new memory transport with a blocking read `timeout`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    /// Return the number of committed steps.
    #[must_use]
    pub fn committed_steps(&self) -> u64 {
        self.stream.lock().committed_steps
    }

    fn timeout(&self) -> Duration {
        self.timeout
            .unwrap_or_else(|| global_config().step_timeout())
    }
}

impl WritableTransportTraits for MemoryTransport {
    fn open_write(&self) -> Result<(), TransportError> {
        let mut stream = self.stream.lock();
        if stream.writer_active {
            return Err(TransportError::WriterActive);
        }
        if stream.end_of_stream {
            return Err(TransportError::Other("the stream has been closed".to_string()));
        }
        stream.writer_active = true;
        Ok(())
    }

    fn write_block(
        &self,
        step: u64,
        variable_name: &str,
        encoded: Vec<u8>,
        descriptor: &BlockDescriptor,
    ) -> Result<(), TransportError> {
        let mut stream = self.stream.lock();
        if !stream.writer_active {
            return Err(TransportError::NotOpen("writing"));
        }
        stream.staged.entry(step).or_default().push((
            variable_name.to_string(),
            descriptor.clone(),
            Bytes::from(encoded),
        ));
        Ok(())
    }

    fn flush_step(&self, step: u64) -> Result<(), TransportError> {
        let mut guard = self.stream.lock();
        let stream = &mut *guard;
        if !stream.writer_active {
            return Err(TransportError::NotOpen("writing"));
        }
        if step != stream.committed_steps {
            return Err(TransportError::Other(format!(
                "cannot commit step {step}, the next step is {}",
                stream.committed_steps
            )));
        }
        let staged = stream.staged.remove(&step).unwrap_or_default();
        for (name, descriptor, bytes) in staged {
            stream
                .blocks
                .insert((step, name.clone(), descriptor.block_id), bytes);
            stream
                .variables
                .entry(name.clone())
                .or_insert_with(|| {
                    VariableDescriptor::new(name, descriptor.data_type, descriptor.shape_id)
                })
                .steps
                .entry(step)
                .or_default()
                .push(descriptor);
        }
        stream.committed_steps += 1;
        drop(guard);
        self.step_committed.notify_all();
        Ok(())
    }

    fn discard_step(&self, step: u64) -> Result<(), TransportError> {
        self.stream.lock().staged.remove(&step);
        Ok(())
    }

    fn close_write(&self) -> Result<(), TransportError> {
        let mut stream = self.stream.lock();
        if !stream.writer_active {
            return Err(TransportError::NotOpen("writing"));
        }
        stream.writer_active = false;
        stream.end_of_stream = true;
        stream.staged.clear();
        drop(stream);
        self.step_committed.notify_all();
        Ok(())
    }
}

impl ReadableTransportTraits for MemoryTransport {
    fn open_read(&self) -> Result<(), TransportError> {
        Ok(())
    }

    fn read_metadata_catalog(&self) -> Result<Vec<VariableDescriptor>, TransportError> {
        Ok(self.stream.lock().variables.values().cloned().collect())
    }

    fn read_block(
        &self,
        step: u64,
        variable_name: &str,
        descriptor: &BlockDescriptor,
    ) -> Result<Vec<u8>, TransportError> {
        let stream = self.stream.lock();
        let key = (step, variable_name.to_string(), descriptor.block_id);
        stream
            .blocks
            .get(&key)
            .map(|bytes| bytes.to_vec())
            .ok_or_else(|| TransportError::BlockNotFound {
                step,
                name: variable_name.to_string(),
                block_id: descriptor.block_id,
            })
    }

    fn advance_to_next_step(
        &self,
        step: u64,
        blocking: bool,
    ) -> Result<StepAvailability, TransportError> {
        let deadline = Instant::now() + self.timeout();
        let mut stream = self.stream.lock();
        loop {
            if step < stream.committed_steps {
                return Ok(StepAvailability::Available);
            }
            if stream.end_of_stream {
                return Ok(StepAvailability::EndOfStream);
            }
            if !blocking
                || self
                    .step_committed
                    .wait_until(&mut stream, deadline)
                    .timed_out()
            {
                break;
            }
        }
        // A step may have been committed as the wait timed out.
        if step < stream.committed_steps {
            Ok(StepAvailability::Available)
        } else if stream.end_of_stream {
            Ok(StepAvailability::EndOfStream)
        } else {
            Ok(StepAvailability::Timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{data_type::DataType, shape::ShapeId};

    fn descriptor(block_id: usize) -> BlockDescriptor {
        BlockDescriptor {
            block_id,
            data_type: DataType::UInt8,
            shape_id: ShapeId::GlobalArray,
            shape: vec![4],
            start: vec![0],
            count: vec![4],
            operations: vec![],
            encoded_length: 4,
        }
    }

    #[test]
    fn memory_transport() -> Result<(), Box<dyn std::error::Error>> {
        let transport = MemoryTransport::with_timeout(Duration::from_millis(10));
        assert!(transport.write_block(0, "a", vec![], &descriptor(0)).is_err());
        transport.open_write()?;
        assert!(matches!(
            transport.open_write(),
            Err(TransportError::WriterActive)
        ));
        transport.write_block(0, "a", vec![1, 2, 3, 4], &descriptor(0))?;
        assert_eq!(
            transport.advance_to_next_step(0, false)?,
            StepAvailability::Timeout
        );
        assert!(transport.read_metadata_catalog()?.is_empty());
        transport.flush_step(0)?;
        assert_eq!(
            transport.advance_to_next_step(0, false)?,
            StepAvailability::Available
        );
        assert_eq!(
            transport.read_block(0, "a", &descriptor(0))?,
            vec![1, 2, 3, 4]
        );
        assert!(matches!(
            transport.read_block(0, "a", &descriptor(1)),
            Err(TransportError::BlockNotFound { block_id: 1, .. })
        ));

        transport.write_block(1, "a", vec![5, 6, 7, 8], &descriptor(0))?;
        transport.discard_step(1)?;
        transport.flush_step(1)?;
        let catalog = transport.read_metadata_catalog()?;
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].steps.len(), 1);
        assert_eq!(transport.committed_steps(), 2);

        assert_eq!(
            transport.advance_to_next_step(2, true)?,
            StepAvailability::Timeout
        );
        transport.close_write()?;
        assert_eq!(
            transport.advance_to_next_step(2, true)?,
            StepAvailability::EndOfStream
        );
        assert!(transport.open_write().is_err());
        Ok(())
    }

    #[test]
    fn memory_transport_blocking_wakeup() -> Result<(), Box<dyn std::error::Error>> {
        let transport = Arc::new(MemoryTransport::with_timeout(Duration::from_secs(10)));
        transport.open_write()?;
        let writer = {
            let transport = transport.clone();
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(20));
                transport.flush_step(0)
            })
        };
        assert_eq!(
            transport.advance_to_next_step(0, true)?,
            StepAvailability::Available
        );
        writer.join().unwrap()?;
        Ok(())
    }
}
