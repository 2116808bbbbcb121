//! Double-buffered streaming between the scan loop and background workers.
//!
//! Every pool owns exactly two buffers and one worker thread. At any time one
//! buffer is *ready* (owned by the caller) and the other is *in flight* (owned
//! by the worker running its task on it). [`BufferPool::acquire_next`] waits for
//! the in-flight buffer to come back, hands the ready one to the worker and
//! returns the one that just came back. Two bounded channels of depth one carry
//! the hand-over, so no more than one task is ever queued.

use std::io::{self, Read, Write};
use std::mem;
use std::thread::{self, JoinHandle};

use byteorder::{ByteOrder, NativeEndian};
use crossbeam_channel::{bounded, Receiver, Sender};

use crate::errors::{HaplotagError, Result};

/// Default size of every pool buffer.
pub const BUFFER_SIZE: usize = 16 << 20;
/// Buffers are never smaller than this, so small fixed-size insertions
/// (a packed barcode, a 23-byte join) always fit in an empty buffer.
pub const MIN_BUFFER_SIZE: usize = 64;

pub struct Buffer {
    data: Box<[u8]>,
    len: usize,
}

impl Buffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Buffer {
            data: vec![0u8; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.len
    }

    pub fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Copies as much of `bytes` as fits and returns how many were taken.
    pub fn fill_from(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        self.data[self.len..self.len + n].copy_from_slice(&bytes[..n]);
        self.len += n;
        n
    }
}

/// Work the background thread of a pool performs on each buffer handed to it.
pub trait BufferTask: Send + 'static {
    fn run(&mut self, buffer: &mut Buffer) -> Result<()>;

    /// Called on the caller's thread once the worker has stopped.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Read-pool task: one bounded read per buffer. A zero-length buffer marks the
/// end of the stream.
pub struct Fill<R> {
    reader: R,
}

impl<R: Read + Send + 'static> BufferTask for Fill<R> {
    fn run(&mut self, buffer: &mut Buffer) -> Result<()> {
        loop {
            match self.reader.read(&mut buffer.data) {
                Ok(n) => {
                    buffer.len = n;
                    return Ok(());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    buffer.len = 0;
                    return Err(HaplotagError::Read(e));
                }
            }
        }
    }
}

/// Write-pool task: writes the whole buffer to the sink.
pub struct Drain<W> {
    writer: W,
}

impl<W> Drain<W> {
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send + 'static> BufferTask for Drain<W> {
    fn run(&mut self, buffer: &mut Buffer) -> Result<()> {
        let result = self
            .writer
            .write_all(buffer.as_slice())
            .map_err(HaplotagError::Write);
        buffer.clear();
        result
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush().map_err(HaplotagError::Write)
    }
}

struct Completion {
    buffer: Buffer,
    result: Result<()>,
}

pub struct BufferPool<T: BufferTask> {
    name: &'static str,
    ready: Buffer,
    jobs: Option<Sender<Buffer>>,
    done: Receiver<Completion>,
    worker: Option<JoinHandle<T>>,
}

impl<T: BufferTask> BufferPool<T> {
    /// Starts the worker and immediately schedules `task` on the first buffer.
    pub fn new(name: &'static str, mut task: T, capacity: usize) -> Result<Self> {
        let capacity = capacity.max(MIN_BUFFER_SIZE);
        let (job_tx, job_rx) = bounded::<Buffer>(1);
        let (done_tx, done_rx) = bounded::<Completion>(1);

        let worker = thread::spawn(move || {
            for mut buffer in job_rx.iter() {
                let result = task.run(&mut buffer);
                if done_tx.send(Completion { buffer, result }).is_err() {
                    break;
                }
            }
            task
        });

        let mut pool = BufferPool {
            name,
            ready: Buffer::with_capacity(capacity),
            jobs: Some(job_tx),
            done: done_rx,
            worker: Some(worker),
        };
        pool.submit(Buffer::with_capacity(capacity))?;
        Ok(pool)
    }

    fn submit(&mut self, buffer: Buffer) -> Result<()> {
        let sent = match &self.jobs {
            Some(jobs) => jobs.send(buffer).is_ok(),
            None => false,
        };
        if sent {
            Ok(())
        } else {
            Err(self.worker_failure())
        }
    }

    fn worker_failure(&mut self) -> HaplotagError {
        // the channels only close early if the worker panicked
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        HaplotagError::WorkerPanicked(self.name)
    }

    fn wait(&mut self) -> Result<Buffer> {
        let completion = self.done.recv().map_err(|_| self.worker_failure())?;
        completion.result?;
        Ok(completion.buffer)
    }

    /// Blocks until the in-flight task completes, schedules the task on the
    /// ready buffer and returns the buffer that just came back.
    pub fn acquire_next(&mut self) -> Result<&mut Buffer> {
        let returned = self.wait()?;
        let relinquished = mem::replace(&mut self.ready, returned);
        self.submit(relinquished)?;
        Ok(&mut self.ready)
    }

    /// The buffer currently owned by the caller.
    pub fn ready(&mut self) -> &mut Buffer {
        &mut self.ready
    }

    /// Waits for the last task, stops the worker and hands its task back.
    pub fn finish(mut self) -> Result<T> {
        self.wait()?;
        self.jobs = None;
        let worker = self
            .worker
            .take()
            .ok_or(HaplotagError::WorkerPanicked(self.name))?;
        let mut task = worker
            .join()
            .map_err(|_| HaplotagError::WorkerPanicked(self.name))?;
        task.finish()?;
        Ok(task)
    }
}

impl<T: BufferTask> Drop for BufferPool<T> {
    fn drop(&mut self) {
        // Closing the job channel lets the worker exit on its own. It is not
        // joined: on an error path it may still be blocked on I/O.
        self.jobs = None;
    }
}

pub type ReadPool<R> = BufferPool<Fill<R>>;

impl<R: Read + Send + 'static> BufferPool<Fill<R>> {
    pub fn from_reader(reader: R, capacity: usize) -> Result<Self> {
        BufferPool::new("read", Fill { reader }, capacity)
    }

    /// Hands every filled buffer to `f` until the stream ends. Returns the
    /// number of bytes read.
    pub fn for_each_chunk<F>(&mut self, mut f: F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        let mut total = 0u64;
        loop {
            let buffer = self.acquire_next()?;
            if buffer.is_empty() {
                return Ok(total);
            }
            total += buffer.len() as u64;
            f(buffer.as_slice())?;
        }
    }
}

/// Destination for transformed stream bytes.
pub trait ByteSink {
    fn put(&mut self, byte: u8) -> Result<()>;

    fn put_slice(&mut self, bytes: &[u8]) -> Result<()>;

    /// Makes room for `additional` contiguous bytes where the sink can.
    fn reserve(&mut self, _additional: usize) -> Result<()> {
        Ok(())
    }
}

impl ByteSink for Vec<u8> {
    fn put(&mut self, byte: u8) -> Result<()> {
        self.push(byte);
        Ok(())
    }

    fn put_slice(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

/// Destination for packed barcodes on their way to the aggregation worker.
pub trait BarcodeSink {
    fn push_barcode(&mut self, raw: u32) -> Result<()>;
}

impl BarcodeSink for Vec<u32> {
    fn push_barcode(&mut self, raw: u32) -> Result<()> {
        self.push(raw);
        Ok(())
    }
}

/// Output-direction pool: the caller fills the ready buffer and full buffers
/// are handed to the worker (a writer, or an aggregator).
pub struct SinkPool<T: BufferTask> {
    pool: BufferPool<T>,
}

pub type WritePool<W> = SinkPool<Drain<W>>;

impl<W: Write + Send + 'static> SinkPool<Drain<W>> {
    pub fn from_writer(writer: W, capacity: usize) -> Result<Self> {
        SinkPool::new("write", Drain { writer }, capacity)
    }
}

impl<T: BufferTask> SinkPool<T> {
    pub fn new(name: &'static str, task: T, capacity: usize) -> Result<Self> {
        Ok(SinkPool {
            pool: BufferPool::new(name, task, capacity)?,
        })
    }

    fn rotate(&mut self) -> Result<()> {
        self.pool.acquire_next()?.clear();
        Ok(())
    }

    /// Issues the two closing drains (the partially filled ready buffer and
    /// the one still in flight) and returns the worker's task.
    pub fn finish(mut self) -> Result<T> {
        self.rotate()?;
        self.rotate()?;
        self.pool.finish()
    }
}

impl<T: BufferTask> ByteSink for SinkPool<T> {
    fn put(&mut self, byte: u8) -> Result<()> {
        let ready = self.pool.ready();
        ready.data[ready.len] = byte;
        ready.len += 1;
        if ready.is_full() {
            self.rotate()?;
        }
        Ok(())
    }

    fn put_slice(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let taken = self.pool.ready().fill_from(bytes);
            bytes = &bytes[taken..];
            if self.pool.ready().is_full() {
                self.rotate()?;
            }
        }
        Ok(())
    }

    fn reserve(&mut self, additional: usize) -> Result<()> {
        let ready = self.pool.ready();
        if ready.remaining() < additional && !ready.is_empty() {
            self.rotate()?;
        }
        Ok(())
    }
}

impl<T: BufferTask> BarcodeSink for SinkPool<T> {
    fn push_barcode(&mut self, raw: u32) -> Result<()> {
        self.reserve(4)?;
        let mut bytes = [0u8; 4];
        NativeEndian::write_u32(&mut bytes, raw);
        self.put_slice(&bytes)
    }
}

/// Unpacks the barcodes a [`BarcodeSink`] pool wrote into `buffer`.
pub fn barcodes(buffer: &Buffer) -> impl Iterator<Item = u32> + '_ {
    buffer.as_slice().chunks_exact(4).map(NativeEndian::read_u32)
}
