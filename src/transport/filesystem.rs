//! A filesystem transport.
//!
//! A stream is a directory holding:
//!  - `data.bin`: the encoded blocks, appended as they are written,
//!  - `index.jsonl`: one JSON line per committed step listing its blocks (with offsets and CRC32C checksums), followed by an end of stream line once the writer closes, and
//!  - `writer.lock`: present while a writer holds the stream.
//!
//! A step becomes visible to readers once its index line has been written and synced.
//! Blocks of a discarded step remain in `data.bin` but are never referenced.
//! A failed or discarded step truncates `index.jsonl` back to its last committed line.

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use crate::config::global_config;

use super::{
    BlockDescriptor, ReadableTransportTraits, StepAvailability, TransportError,
    VariableDescriptor, WritableTransportTraits,
};

const DATA_FILE: &str = "data.bin";
const INDEX_FILE: &str = "index.jsonl";
const LOCK_FILE: &str = "writer.lock";
const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, Serialize, Deserialize)]
struct IndexedBlock {
    variable: String,
    offset: u64,
    length: u64,
    checksum: u32,
    descriptor: BlockDescriptor,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
enum IndexRecord {
    Step {
        step: u64,
        blocks: Vec<IndexedBlock>,
    },
    EndOfStream,
}

#[derive(Debug, Default)]
struct StreamIndex {
    steps: Vec<Vec<IndexedBlock>>,
    end_of_stream: bool,
}

#[derive(Debug)]
struct StreamWriter {
    data: File,
    index: File,
    index_length: u64,
    pending: BTreeMap<u64, Vec<IndexedBlock>>,
    committed_steps: u64,
}

/// A filesystem transport.
#[derive(Debug)]
pub struct FilesystemTransport {
    base_path: PathBuf,
    timeout: Option<Duration>,
    writer: Mutex<Option<StreamWriter>>,
    index: RwLock<StreamIndex>,
}

impl FilesystemTransport {
    /// Create a new filesystem transport for the stream in the directory `base_path`.
    ///
    /// The directory is created when a writer opens the stream.
    ///
    /// # Errors
    /// Returns a [`TransportError`] if `base_path` points to an existing file rather than a directory.
    pub fn new<P: AsRef<Path>>(base_path: P) -> Result<Self, TransportError> {
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.is_file() {
            return Err(TransportError::Other(format!(
                "{} is a file, not a directory",
                base_path.display()
            )));
        }
        Ok(Self {
            base_path,
            timeout: None,
            writer: Mutex::default(),
            index: RwLock::default(),
        })
    }

    /// Set the blocking read timeout, overriding the [step timeout](crate::config::Config#step-timeout) of the global configuration.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Return the directory of the stream.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn path(&self, file: &str) -> PathBuf {
        self.base_path.join(file)
    }

    /// Reload the committed steps from the index file.
    ///
    /// A trailing partial line (a step being written) is ignored.
    fn load_index(&self) -> Result<(), TransportError> {
        let mut contents = String::new();
        match File::open(self.path(INDEX_FILE)) {
            Ok(mut file) => {
                file.read_to_string(&mut contents)?;
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
        let complete = contents.rfind('\n').map_or("", |end| &contents[..end]);

        let mut index = StreamIndex::default();
        for line in complete.lines().filter(|line| !line.trim().is_empty()) {
            match serde_json::from_str::<IndexRecord>(line)? {
                IndexRecord::Step { step, blocks } => {
                    if step != index.steps.len() as u64 {
                        return Err(TransportError::Corrupt(format!(
                            "index record for step {step} follows step {}",
                            index.steps.len()
                        )));
                    }
                    index.steps.push(blocks);
                }
                IndexRecord::EndOfStream => index.end_of_stream = true,
            }
        }
        *self.index.write() = index;
        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
            .unwrap_or_else(|| global_config().step_timeout())
    }
}

impl StreamWriter {
    /// Append `record` after the last committed index line.
    ///
    /// A torn line left by an earlier failure is dropped first, and a failed write is truncated away.
    fn write_record(&mut self, record: &IndexRecord) -> Result<(), TransportError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.truncate_index()?;
        if let Err(err) = self
            .index
            .write_all(&line)
            .and_then(|()| self.index.sync_data())
        {
            if let Err(truncate_err) = self.truncate_index() {
                log::warn!("failed to truncate the index after a failed write: {truncate_err}");
            }
            return Err(err.into());
        }
        self.index_length += line.len() as u64;
        Ok(())
    }

    fn truncate_index(&mut self) -> Result<(), TransportError> {
        self.index.set_len(self.index_length)?;
        Ok(())
    }
}

impl WritableTransportTraits for FilesystemTransport {
    fn open_write(&self) -> Result<(), TransportError> {
        let mut writer = self.writer.lock();
        if writer.is_some() {
            return Err(TransportError::WriterActive);
        }
        std::fs::create_dir_all(&self.base_path)?;
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(LOCK_FILE))
        {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(TransportError::WriterActive)
            }
            Err(err) => return Err(err.into()),
        }
        let index_path = self.path(INDEX_FILE);
        if index_path.exists() && std::fs::metadata(&index_path)?.len() > 0 {
            std::fs::remove_file(self.path(LOCK_FILE))?;
            return Err(TransportError::Other(format!(
                "a stream already exists in {}",
                self.base_path.display()
            )));
        }
        let data = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(DATA_FILE))?;
        let index = OpenOptions::new()
            .create(true)
            .append(true)
            .open(index_path)?;
        let index_length = index.metadata()?.len();
        *writer = Some(StreamWriter {
            data,
            index,
            index_length,
            pending: BTreeMap::new(),
            committed_steps: 0,
        });
        Ok(())
    }

    fn write_block(
        &self,
        step: u64,
        variable_name: &str,
        encoded: Vec<u8>,
        descriptor: &BlockDescriptor,
    ) -> Result<(), TransportError> {
        let mut writer = self.writer.lock();
        let writer = writer.as_mut().ok_or(TransportError::NotOpen("writing"))?;
        // the file length, not a running total, so a torn earlier write cannot shift offsets
        let offset = writer.data.metadata()?.len();
        writer.data.write_all(&encoded)?;
        writer.pending.entry(step).or_default().push(IndexedBlock {
            variable: variable_name.to_string(),
            offset,
            length: encoded.len() as u64,
            checksum: crc32c::crc32c(&encoded),
            descriptor: descriptor.clone(),
        });
        Ok(())
    }

    fn flush_step(&self, step: u64) -> Result<(), TransportError> {
        let mut writer = self.writer.lock();
        let writer = writer.as_mut().ok_or(TransportError::NotOpen("writing"))?;
        if step != writer.committed_steps {
            return Err(TransportError::Other(format!(
                "cannot commit step {step}, the next step is {}",
                writer.committed_steps
            )));
        }
        writer.data.sync_data()?;
        let blocks = writer.pending.remove(&step).unwrap_or_default();
        writer.write_record(&IndexRecord::Step { step, blocks })?;
        writer.committed_steps += 1;
        Ok(())
    }

    fn discard_step(&self, step: u64) -> Result<(), TransportError> {
        if let Some(writer) = self.writer.lock().as_mut() {
            writer.pending.remove(&step);
            writer.truncate_index()?;
        }
        Ok(())
    }

    fn close_write(&self) -> Result<(), TransportError> {
        let mut writer = self
            .writer
            .lock()
            .take()
            .ok_or(TransportError::NotOpen("writing"))?;
        writer.write_record(&IndexRecord::EndOfStream)?;
        std::fs::remove_file(self.path(LOCK_FILE))?;
        Ok(())
    }
}

impl ReadableTransportTraits for FilesystemTransport {
    fn open_read(&self) -> Result<(), TransportError> {
        if !self.base_path.is_dir() {
            return Err(TransportError::IOError(std::io::Error::new(
                ErrorKind::NotFound,
                format!("no stream in {}", self.base_path.display()),
            )));
        }
        self.load_index()
    }

    fn read_metadata_catalog(&self) -> Result<Vec<VariableDescriptor>, TransportError> {
        self.load_index()?;
        let index = self.index.read();
        let mut variables: BTreeMap<String, VariableDescriptor> = BTreeMap::new();
        for (step, blocks) in index.steps.iter().enumerate() {
            for block in blocks {
                let descriptor = &block.descriptor;
                variables
                    .entry(block.variable.clone())
                    .or_insert_with(|| {
                        VariableDescriptor::new(
                            block.variable.clone(),
                            descriptor.data_type,
                            descriptor.shape_id,
                        )
                    })
                    .steps
                    .entry(step as u64)
                    .or_default()
                    .push(descriptor.clone());
            }
        }
        Ok(variables.into_values().collect())
    }

    fn read_block(
        &self,
        step: u64,
        variable_name: &str,
        descriptor: &BlockDescriptor,
    ) -> Result<Vec<u8>, TransportError> {
        let not_found = || TransportError::BlockNotFound {
            step,
            name: variable_name.to_string(),
            block_id: descriptor.block_id,
        };
        let find = |index: &StreamIndex| {
            usize::try_from(step)
                .ok()
                .and_then(|step| index.steps.get(step))
                .and_then(|blocks| {
                    blocks.iter().find(|block| {
                        block.variable == variable_name
                            && block.descriptor.block_id == descriptor.block_id
                    })
                })
                .cloned()
        };
        let found = find(&self.index.read());
        let block = match found {
            Some(block) => block,
            None => {
                self.load_index()?;
                find(&self.index.read()).ok_or_else(not_found)?
            }
        };

        let mut data = File::open(self.path(DATA_FILE))?;
        data.seek(SeekFrom::Start(block.offset))?;
        let length = usize::try_from(block.length)
            .map_err(|_| TransportError::Corrupt(format!("block length {}", block.length)))?;
        let mut bytes = vec![0; length];
        data.read_exact(&mut bytes)?;
        if global_config().validate_checksums() {
            if crc32c::crc32c(&bytes) != block.checksum {
                return Err(TransportError::InvalidChecksum {
                    step,
                    name: variable_name.to_string(),
                    block_id: descriptor.block_id,
                });
            }
        } else {
            log::warn!(
                "skipping checksum validation of block {} of {variable_name} at step {step}",
                descriptor.block_id
            );
        }
        Ok(bytes)
    }

    fn advance_to_next_step(
        &self,
        step: u64,
        blocking: bool,
    ) -> Result<StepAvailability, TransportError> {
        let deadline = Instant::now() + self.timeout();
        loop {
            self.load_index()?;
            {
                let index = self.index.read();
                if step < index.steps.len() as u64 {
                    return Ok(StepAvailability::Available);
                }
                if index.end_of_stream {
                    return Ok(StepAvailability::EndOfStream);
                }
            }
            let now = Instant::now();
            if !blocking || now >= deadline {
                return Ok(StepAvailability::Timeout);
            }
            std::thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }
}
