//! Optional batch compression pipeline: one background worker per Writer,
//! double-buffered against the foreground encode loop.
//!
//! Exactly one background thread, exactly one packet in flight at a time.
//! A `crossbeam_channel::bounded(1)` job channel alone gives that:
//! `submit`'s blocking send *is* the backpressure, and "at most one packet
//! in flight" falls out of the channel capacity rather than needing
//! separate bookkeeping.
//!
//! There is no pair of named double-buffer fields: ownership of the filled
//! payload buffer moves into the channel on `submit`, and the foreground
//! allocates a fresh `Vec` to keep encoding into. Move semantics give the
//! double buffer for free instead of a manual swap.

use std::fs::File;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender};

use crate::config::BATCH_QUEUE_DEPTH;
use crate::error::{BcsvError, Result};
use crate::lz4::StreamCompressor;
use crate::packet::{flush_packet, PacketIndexEntry};

pub(crate) struct PendingPacket {
    pub payload: Vec<u8>,
    pub first_row_number: u32,
    pub row_count: u32,
    pub compression_lvl: u8,
}

/// Handle to the single background compress+write thread.
///
/// The worker owns the compression stream state and appends finished
/// packets directly to the shared index immediately before its write
/// returns, so the foreground never needs a result channel — it only ever
/// needs to know whether an error occurred, surfaced through `submit`/
/// `shutdown`.
pub(crate) struct BatchWorker {
    job_tx: Option<Sender<PendingPacket>>,
    error: Arc<Mutex<Option<BcsvError>>>,
    handle: Option<JoinHandle<()>>,
}

impl BatchWorker {
    /// `reset_each_packet` mirrors the Writer's `!stream_mode` rule: outside
    /// stream mode the dictionary is dropped at every packet boundary, so
    /// every job gets a clean compressor and the batch path stays
    /// byte-identical to the single-threaded one. In stream mode the same
    /// `compressor` instance is reused across jobs, since the worker is the
    /// only thread that ever touches it.
    pub fn spawn(
        file: Arc<Mutex<File>>,
        index: Arc<Mutex<Vec<PacketIndexEntry>>>,
        reset_each_packet: bool,
    ) -> Self {
        let (job_tx, job_rx) = bounded::<PendingPacket>(BATCH_QUEUE_DEPTH);
        let error = Arc::new(Mutex::new(None));
        let error_in_thread = Arc::clone(&error);

        let handle = std::thread::spawn(move || {
            log::debug!("bcsv batch worker: started");
            let mut compressor = StreamCompressor::new();
            for job in job_rx.iter() {
                if error_in_thread.lock().unwrap().is_some() {
                    // Already poisoned: drain remaining queued jobs without
                    // touching the file so `submit`'s blocking send never
                    // hangs waiting on a worker that stopped doing work.
                    continue;
                }
                if reset_each_packet {
                    compressor.reset();
                }
                let mut file = file.lock().unwrap();
                let outcome = flush_packet(
                    &mut *file,
                    Some(&mut compressor),
                    &job.payload,
                    job.first_row_number,
                    job.row_count,
                    job.compression_lvl,
                );
                drop(file);
                match outcome {
                    Ok(entry) => index.lock().unwrap().push(entry),
                    Err(e) => *error_in_thread.lock().unwrap() = Some(e),
                }
            }
            log::debug!("bcsv batch worker: stopped");
        });

        Self {
            job_tx: Some(job_tx),
            error,
            handle: Some(handle),
        }
    }

    /// Hands a filled packet buffer to the worker. Blocks if the worker is
    /// still busy with the previous packet.
    pub fn submit(&self, job: PendingPacket) -> Result<()> {
        if let Some(e) = self.take_error() {
            return Err(e);
        }
        match &self.job_tx {
            Some(tx) => tx
                .send(job)
                .map_err(|_| BcsvError::codec("batch worker terminated unexpectedly")),
            None => Err(BcsvError::codec("batch worker already shut down")),
        }
    }

    fn take_error(&self) -> Option<BcsvError> {
        self.error.lock().unwrap().take()
    }

    /// Drains any in-flight job and joins the worker thread, propagating its
    /// error if one occurred.
    pub fn shutdown(&mut self) -> Result<()> {
        self.job_tx.take(); // drop the sender: closes the channel
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.take_error().map_or(Ok(()), Err)
    }
}

impl Drop for BatchWorker {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_tmp() -> (tempfile::TempPath, File) {
        let f = tempfile::NamedTempFile::new().unwrap();
        let path = f.into_temp_path();
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        (path, file)
    }

    #[test]
    fn packets_are_appended_in_order() {
        let (_path, file) = open_tmp();
        let file = Arc::new(Mutex::new(file));
        let index = Arc::new(Mutex::new(Vec::new()));
        let mut worker = BatchWorker::spawn(Arc::clone(&file), Arc::clone(&index), true);

        for i in 0..5u32 {
            worker
                .submit(PendingPacket {
                    payload: vec![i as u8; 16],
                    first_row_number: i * 2,
                    row_count: 2,
                    compression_lvl: 0,
                })
                .unwrap();
        }
        worker.shutdown().unwrap();

        let entries = index.lock().unwrap();
        assert_eq!(entries.len(), 5);
        for (i, e) in entries.iter().enumerate() {
            assert_eq!(e.first_row_number, i as u32 * 2);
        }
        // Offsets strictly increasing: packets landed sequentially, not interleaved.
        for w in entries.windows(2) {
            assert!(w[1].file_offset > w[0].file_offset);
        }
    }

    #[test]
    fn backpressure_blocks_until_previous_packet_is_consumed() {
        let (_path, file) = open_tmp();
        let file = Arc::new(Mutex::new(file));
        let index = Arc::new(Mutex::new(Vec::new()));
        let mut worker = BatchWorker::spawn(file, index, true);
        // A queue depth of 1 means this loop would hang if `submit` were
        // non-blocking and the worker fell behind; finishing at all proves
        // the backpressure contract holds.
        for i in 0..50u32 {
            worker
                .submit(PendingPacket {
                    payload: vec![i as u8; 4],
                    first_row_number: i,
                    row_count: 1,
                    compression_lvl: 0,
                })
                .unwrap();
        }
        worker.shutdown().unwrap();
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let (_path, file) = open_tmp();
        let file = Arc::new(Mutex::new(file));
        let index = Arc::new(Mutex::new(Vec::new()));
        let mut worker = BatchWorker::spawn(file, index, true);
        worker.shutdown().unwrap();

        let err = worker.submit(PendingPacket {
            payload: vec![1, 2, 3],
            first_row_number: 0,
            row_count: 1,
            compression_lvl: 1,
        });
        assert!(err.is_err());
    }
}
