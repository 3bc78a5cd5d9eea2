//! Budgeted transfer of host-provided files.
//!
//! The host registers files by digest; peers request them, receive them in
//! chunks, and may cancel mid-transfer. Sending time-slices itself: each pump
//! gets a fixed wall-clock budget, split evenly across every in-flight
//! transfer, so a large download never starves the rest of the poll loop.
//!
//! Failing to produce the bytes of a file the host advertised is the one
//! unrecoverable fault in this crate: the session broadcasts a host-dropped
//! notice and surfaces [`GarrisonError::HostedFileUnavailable`].

use std::collections::VecDeque;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::{debug, error, warn};
use web_time::Instant;

use crate::network::messages::{FileChunkPayload, FileDigest};
use crate::sessions::config::TransferConfig;
use crate::{GarrisonError, GarrisonResult, SlotIndex};

/// Produces the bytes of a hosted file on first demand.
///
/// The loader runs at most once; the result is cached for every later
/// request. An error from the loader is fatal to the session.
pub type FileLoader = Box<dyn FnMut() -> std::io::Result<Vec<u8>>>;

enum FileContents {
    Loaded(Arc<[u8]>),
    Deferred(FileLoader),
}

impl FileContents {
    fn materialize(&mut self) -> std::io::Result<Arc<[u8]>> {
        match self {
            FileContents::Loaded(bytes) => Ok(Arc::clone(bytes)),
            FileContents::Deferred(loader) => {
                let bytes: Arc<[u8]> = loader()?.into();
                *self = FileContents::Loaded(Arc::clone(&bytes));
                Ok(bytes)
            }
        }
    }

    const fn is_loaded(&self) -> bool {
        matches!(self, FileContents::Loaded(_))
    }
}

struct HostedFile {
    digest: FileDigest,
    name: String,
    contents: FileContents,
}

#[derive(Debug)]
struct OutgoingTransfer {
    to: SlotIndex,
    digest: FileDigest,
    bytes: Arc<[u8]>,
    offset: usize,
    last_percent: u8,
}

#[derive(Debug)]
struct IncomingTransfer {
    digest: FileDigest,
    total_size: u32,
    bytes: Vec<u8>,
    last_percent: u8,
}

/// What became of a file request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RequestOutcome {
    /// A transfer to the requester started.
    Started,
    /// The requester already has this transfer in flight; the request is
    /// dropped rather than restarting it.
    AlreadyInFlight,
    /// No file with that digest is hosted here.
    Unknown,
    /// The file exists but exceeds the configured size limit.
    Refused,
}

/// What became of one received chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ChunkOutcome {
    /// Appended; the visible progress percentage did not change.
    Accepted,
    /// Appended, and the transfer advanced to a new percentage.
    Progress {
        /// Completed portion of the file, 0 to 99.
        percent: u8,
    },
    /// The final chunk arrived; the file is ready to collect.
    Complete,
    /// Malformed, out of order, or moot; dropped.
    Ignored,
}

/// One chunk ready to be sent, with its destination.
pub(crate) type OutboundChunk = (SlotIndex, FileChunkPayload);

/// Both directions of file-transfer state for one endpoint.
pub(crate) struct FileTransfers {
    config: TransferConfig,
    hosted: Vec<HostedFile>,
    sending: Vec<OutgoingTransfer>,
    receiving: Vec<IncomingTransfer>,
    completed: VecDeque<(FileDigest, Vec<u8>)>,
}

impl std::fmt::Debug for FileTransfers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure to ensure all fields are included when new fields are added.
        let Self {
            config,
            hosted,
            sending,
            receiving,
            completed,
        } = self;

        f.debug_struct("FileTransfers")
            .field("config", config)
            .field(
                "hosted",
                &hosted
                    .iter()
                    .map(|file| (file.name.as_str(), file.contents.is_loaded()))
                    .collect::<Vec<_>>(),
            )
            .field("sending", sending)
            .field("receiving", receiving)
            .field("completed", &completed.len())
            .finish()
    }
}

impl FileTransfers {
    pub(crate) fn new(config: TransferConfig) -> Self {
        Self {
            config,
            hosted: Vec::new(),
            sending: Vec::new(),
            receiving: Vec::new(),
            completed: VecDeque::new(),
        }
    }

    /// Registers a file with its bytes already in memory. Re-registering a
    /// digest replaces the previous entry.
    pub(crate) fn host_file(&mut self, digest: FileDigest, name: String, bytes: Vec<u8>) {
        self.hosted.retain(|file| file.digest != digest);
        self.hosted.push(HostedFile {
            digest,
            name,
            contents: FileContents::Loaded(bytes.into()),
        });
    }

    /// Registers a file whose bytes are produced on first request.
    pub(crate) fn host_file_deferred(
        &mut self,
        digest: FileDigest,
        name: String,
        loader: FileLoader,
    ) {
        self.hosted.retain(|file| file.digest != digest);
        self.hosted.push(HostedFile {
            digest,
            name,
            contents: FileContents::Deferred(loader),
        });
    }

    pub(crate) fn is_hosted(&self, digest: &FileDigest) -> bool {
        self.hosted.iter().any(|file| &file.digest == digest)
    }

    /// Handles a file request from `from`.
    ///
    /// # Errors
    ///
    /// Returns [`GarrisonError::HostedFileUnavailable`] when a hosted file's
    /// loader fails; the session must treat that as fatal.
    pub(crate) fn handle_request(
        &mut self,
        from: SlotIndex,
        digest: &FileDigest,
    ) -> GarrisonResult<RequestOutcome> {
        let Some(hosted) = self.hosted.iter_mut().find(|file| &file.digest == digest) else {
            warn!(%from, digest = %digest.short_hex(), "request for a file not hosted here");
            return Ok(RequestOutcome::Unknown);
        };
        let bytes = match hosted.contents.materialize() {
            Ok(bytes) => bytes,
            Err(source) => {
                error!(%source, name = %hosted.name, "hosted file cannot be served");
                return Err(GarrisonError::HostedFileUnavailable {
                    name: hosted.name.clone(),
                });
            }
        };
        if bytes.len() as u64 > u64::from(self.config.max_file_size) {
            warn!(
                name = %hosted.name,
                size = bytes.len(),
                limit = self.config.max_file_size,
                "refusing to send an oversized file"
            );
            return Ok(RequestOutcome::Refused);
        }
        if self
            .sending
            .iter()
            .any(|transfer| transfer.to == from && &transfer.digest == digest)
        {
            return Ok(RequestOutcome::AlreadyInFlight);
        }

        debug!(%from, digest = %digest.short_hex(), size = bytes.len(), "starting file send");
        self.sending.push(OutgoingTransfer {
            to: from,
            digest: *digest,
            bytes,
            offset: 0,
            last_percent: 0,
        });
        Ok(RequestOutcome::Started)
    }

    /// Drops the in-flight send of `digest` to `from`, if any.
    pub(crate) fn cancel_send(&mut self, from: SlotIndex, digest: &FileDigest) {
        let before = self.sending.len();
        self.sending
            .retain(|transfer| !(transfer.to == from && &transfer.digest == digest));
        if self.sending.len() != before {
            debug!(%from, digest = %digest.short_hex(), "file send cancelled");
        }
    }

    /// Drops every in-flight send to a departing seat.
    pub(crate) fn drop_slot(&mut self, slot: SlotIndex) {
        self.sending.retain(|transfer| transfer.to != slot);
    }

    /// Emits as many chunks as the send budget allows, the budget split
    /// evenly across in-flight transfers. Every transfer makes progress by at
    /// least one chunk per pump. Returns the chunks to put on the wire and
    /// the per-seat progress percentages that changed.
    pub(crate) fn pump_sends(&mut self) -> (Vec<OutboundChunk>, SmallVec<[(SlotIndex, u8); 4]>) {
        let mut chunks = Vec::new();
        let mut progress = SmallVec::new();
        if self.sending.is_empty() {
            return (chunks, progress);
        }
        let slice = self.config.send_budget / self.sending.len() as u32;
        let chunk_size = self.config.chunk_size;

        self.sending.retain_mut(|transfer| {
            let started = Instant::now();
            loop {
                let len = transfer.bytes.len();
                let end = (transfer.offset + chunk_size).min(len);
                chunks.push((
                    transfer.to,
                    FileChunkPayload {
                        digest: transfer.digest,
                        total_size: len as u32,
                        offset: transfer.offset as u32,
                        data: transfer.bytes[transfer.offset..end].to_vec(),
                    },
                ));
                transfer.offset = end;

                let percent = if len == 0 {
                    100
                } else {
                    (transfer.offset * 100 / len) as u8
                };
                if percent != transfer.last_percent {
                    transfer.last_percent = percent;
                    progress.push((transfer.to, percent));
                }
                if transfer.offset >= len {
                    return false;
                }
                if started.elapsed() >= slice {
                    return true;
                }
            }
        });
        (chunks, progress)
    }

    /// Handles one received chunk, growing or completing the matching
    /// incoming transfer.
    pub(crate) fn handle_chunk(&mut self, chunk: FileChunkPayload) -> ChunkOutcome {
        if chunk.total_size > self.config.max_file_size {
            warn!(
                total = chunk.total_size,
                limit = self.config.max_file_size,
                "refusing an oversized incoming file"
            );
            return ChunkOutcome::Ignored;
        }

        let index = match self
            .receiving
            .iter()
            .position(|transfer| transfer.digest == chunk.digest)
        {
            Some(index) => index,
            None => {
                if chunk.offset != 0 {
                    warn!(
                        digest = %chunk.digest.short_hex(),
                        offset = chunk.offset,
                        "mid-stream chunk for an unknown transfer"
                    );
                    return ChunkOutcome::Ignored;
                }
                self.receiving.push(IncomingTransfer {
                    digest: chunk.digest,
                    total_size: chunk.total_size,
                    bytes: Vec::with_capacity(chunk.total_size as usize),
                    last_percent: 0,
                });
                self.receiving.len() - 1
            }
        };
        let Some(transfer) = self.receiving.get_mut(index) else {
            return ChunkOutcome::Ignored;
        };

        if transfer.total_size != chunk.total_size {
            warn!(
                announced = transfer.total_size,
                got = chunk.total_size,
                "file chunk changes the announced size"
            );
            return ChunkOutcome::Ignored;
        }
        if chunk.offset as usize != transfer.bytes.len() {
            warn!(
                expected = transfer.bytes.len(),
                got = chunk.offset,
                "out-of-order file chunk"
            );
            return ChunkOutcome::Ignored;
        }
        if transfer.bytes.len() + chunk.data.len() > transfer.total_size as usize {
            warn!("file chunk overruns the announced size");
            self.receiving.swap_remove(index);
            return ChunkOutcome::Ignored;
        }

        transfer.bytes.extend_from_slice(&chunk.data);
        if transfer.bytes.len() == transfer.total_size as usize {
            let done = self.receiving.swap_remove(index);
            debug!(digest = %done.digest.short_hex(), size = done.bytes.len(), "file received");
            self.completed.push_back((done.digest, done.bytes));
            return ChunkOutcome::Complete;
        }

        let percent = (transfer.bytes.len() * 100 / transfer.total_size as usize) as u8;
        if percent != transfer.last_percent {
            transfer.last_percent = percent;
            ChunkOutcome::Progress { percent }
        } else {
            ChunkOutcome::Accepted
        }
    }

    /// Discards the partial download of `digest`, if any. Returns whether
    /// there was one to discard.
    pub(crate) fn cancel_receive(&mut self, digest: &FileDigest) -> bool {
        let before = self.receiving.len();
        self.receiving.retain(|transfer| &transfer.digest != digest);
        self.receiving.len() != before
    }

    /// The oldest fully received file, if any.
    pub(crate) fn take_completed(&mut self) -> Option<(FileDigest, Vec<u8>)> {
        self.completed.pop_front()
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;
    use web_time::Duration;

    const REQUESTER: SlotIndex = SlotIndex::new(1);
    const OTHER: SlotIndex = SlotIndex::new(2);

    fn digest(seed: u8) -> FileDigest {
        FileDigest([seed; 32])
    }

    fn payload(size: usize) -> Vec<u8> {
        (0..size).map(|index| index as u8).collect()
    }

    // ===== Hosting and Request Tests =====

    #[test]
    fn request_for_a_hosted_file_starts_a_send() {
        let mut transfers = FileTransfers::new(TransferConfig::default());
        transfers.host_file(digest(1), "terrain.pack".to_owned(), payload(100));

        let outcome = transfers.handle_request(REQUESTER, &digest(1)).unwrap();
        assert_eq!(outcome, RequestOutcome::Started);

        let outcome = transfers.handle_request(REQUESTER, &digest(1)).unwrap();
        assert_eq!(outcome, RequestOutcome::AlreadyInFlight);

        // A different requester gets its own transfer.
        let outcome = transfers.handle_request(OTHER, &digest(1)).unwrap();
        assert_eq!(outcome, RequestOutcome::Started);
    }

    #[test]
    fn request_for_an_unknown_digest_is_harmless() {
        let mut transfers = FileTransfers::new(TransferConfig::default());
        let outcome = transfers.handle_request(REQUESTER, &digest(9)).unwrap();
        assert_eq!(outcome, RequestOutcome::Unknown);
        assert!(transfers.sending.is_empty());
    }

    #[test]
    fn oversized_files_are_refused() {
        let config = TransferConfig {
            max_file_size: 64,
            ..TransferConfig::default()
        };
        let mut transfers = FileTransfers::new(config);
        transfers.host_file(digest(1), "huge.pack".to_owned(), payload(65));

        let outcome = transfers.handle_request(REQUESTER, &digest(1)).unwrap();
        assert_eq!(outcome, RequestOutcome::Refused);
    }

    #[test]
    fn deferred_loader_runs_once_and_is_cached() {
        let mut transfers = FileTransfers::new(TransferConfig::default());
        let calls = Rc::new(Cell::new(0_u32));
        let counter = Rc::clone(&calls);
        transfers.host_file_deferred(
            digest(1),
            "lazy.pack".to_owned(),
            Box::new(move || {
                counter.set(counter.get() + 1);
                Ok(payload(10))
            }),
        );

        transfers.handle_request(REQUESTER, &digest(1)).unwrap();
        transfers.handle_request(OTHER, &digest(1)).unwrap();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn failing_loader_is_fatal() {
        let mut transfers = FileTransfers::new(TransferConfig::default());
        transfers.host_file_deferred(
            digest(1),
            "missing.pack".to_owned(),
            Box::new(|| Err(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"))),
        );

        let error = transfers.handle_request(REQUESTER, &digest(1)).unwrap_err();
        match error {
            GarrisonError::HostedFileUnavailable { name } => assert_eq!(name, "missing.pack"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn rehosting_a_digest_replaces_the_entry() {
        let mut transfers = FileTransfers::new(TransferConfig::default());
        transfers.host_file(digest(1), "v1.pack".to_owned(), payload(10));
        transfers.host_file(digest(1), "v2.pack".to_owned(), payload(20));
        assert_eq!(transfers.hosted.len(), 1);
        assert_eq!(transfers.hosted[0].name, "v2.pack");
        assert!(transfers.is_hosted(&digest(1)));
    }

    // ===== Sending Tests =====

    #[test]
    fn pump_chunks_cover_the_file_in_order() {
        let mut transfers = FileTransfers::new(TransferConfig::default());
        transfers.host_file(digest(1), "terrain.pack".to_owned(), payload(5000));
        transfers.handle_request(REQUESTER, &digest(1)).unwrap();

        let (chunks, progress) = transfers.pump_sends();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].1.offset, 0);
        assert_eq!(chunks[0].1.data.len(), 2048);
        assert_eq!(chunks[1].1.offset, 2048);
        assert_eq!(chunks[2].1.offset, 4096);
        assert_eq!(chunks[2].1.data.len(), 904);
        for (to, chunk) in &chunks {
            assert_eq!(*to, REQUESTER);
            assert_eq!(chunk.total_size, 5000);
        }
        assert_eq!(progress.last(), Some(&(REQUESTER, 100)));
        assert!(transfers.sending.is_empty());
    }

    #[test]
    fn exhausted_budget_carries_the_transfer_to_the_next_pump() {
        let config = TransferConfig {
            send_budget: Duration::ZERO,
            ..TransferConfig::default()
        };
        let mut transfers = FileTransfers::new(config);
        transfers.host_file(digest(1), "terrain.pack".to_owned(), payload(5000));
        transfers.handle_request(REQUESTER, &digest(1)).unwrap();

        // One chunk per pump: progress is guaranteed even with no budget.
        let (chunks, _) = transfers.pump_sends();
        assert_eq!(chunks.len(), 1);
        assert_eq!(transfers.sending.len(), 1);

        let (chunks, _) = transfers.pump_sends();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].1.offset, 2048);

        let (chunks, progress) = transfers.pump_sends();
        assert_eq!(chunks.len(), 1);
        assert!(transfers.sending.is_empty());
        assert_eq!(progress.last(), Some(&(REQUESTER, 100)));
    }

    #[test]
    fn cancel_stops_an_in_flight_send() {
        let config = TransferConfig {
            send_budget: Duration::ZERO,
            ..TransferConfig::default()
        };
        let mut transfers = FileTransfers::new(config);
        transfers.host_file(digest(1), "terrain.pack".to_owned(), payload(5000));
        transfers.handle_request(REQUESTER, &digest(1)).unwrap();
        transfers.pump_sends();

        transfers.cancel_send(REQUESTER, &digest(1));
        let (chunks, _) = transfers.pump_sends();
        assert!(chunks.is_empty());
    }

    #[test]
    fn departing_seat_loses_its_transfers() {
        let mut transfers = FileTransfers::new(TransferConfig::default());
        transfers.host_file(digest(1), "terrain.pack".to_owned(), payload(100));
        transfers.handle_request(REQUESTER, &digest(1)).unwrap();
        transfers.handle_request(OTHER, &digest(1)).unwrap();

        transfers.drop_slot(REQUESTER);
        let (chunks, _) = transfers.pump_sends();
        assert!(chunks.iter().all(|(to, _)| *to == OTHER));
    }

    #[test]
    fn empty_files_complete_immediately() {
        let mut transfers = FileTransfers::new(TransferConfig::default());
        transfers.host_file(digest(1), "empty.pack".to_owned(), Vec::new());
        transfers.handle_request(REQUESTER, &digest(1)).unwrap();

        let (chunks, progress) = transfers.pump_sends();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].1.total_size, 0);
        assert_eq!(progress.as_slice(), &[(REQUESTER, 100)]);
        assert!(transfers.sending.is_empty());
    }

    // ===== Receiving Tests =====

    #[test]
    fn chunks_reassemble_into_the_original_bytes() {
        let original = payload(5000);
        let mut host = FileTransfers::new(TransferConfig::default());
        host.host_file(digest(1), "terrain.pack".to_owned(), original.clone());
        host.handle_request(REQUESTER, &digest(1)).unwrap();
        let (chunks, _) = host.pump_sends();

        let mut client = FileTransfers::new(TransferConfig::default());
        let mut outcomes = Vec::new();
        for (_, chunk) in chunks {
            outcomes.push(client.handle_chunk(chunk));
        }
        assert_eq!(outcomes.last(), Some(&ChunkOutcome::Complete));

        let (received_digest, bytes) = client.take_completed().unwrap();
        assert_eq!(received_digest, digest(1));
        assert_eq!(bytes, original);
        assert!(client.take_completed().is_none());
    }

    #[test]
    fn receive_progress_moves_forward() {
        let mut host = FileTransfers::new(TransferConfig::default());
        host.host_file(digest(1), "terrain.pack".to_owned(), payload(10_000));
        host.handle_request(REQUESTER, &digest(1)).unwrap();
        let (chunks, _) = host.pump_sends();

        let mut client = FileTransfers::new(TransferConfig::default());
        let mut percents = Vec::new();
        for (_, chunk) in chunks {
            if let ChunkOutcome::Progress { percent } = client.handle_chunk(chunk) {
                percents.push(percent);
            }
        }
        assert!(!percents.is_empty());
        assert!(percents.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(percents.iter().all(|&percent| percent < 100));
    }

    #[test]
    fn mid_stream_chunk_for_an_unknown_transfer_is_ignored() {
        let mut client = FileTransfers::new(TransferConfig::default());
        let outcome = client.handle_chunk(FileChunkPayload {
            digest: digest(1),
            total_size: 100,
            offset: 50,
            data: vec![0; 50],
        });
        assert_eq!(outcome, ChunkOutcome::Ignored);
        assert!(client.receiving.is_empty());
    }

    #[test]
    fn out_of_order_chunk_is_ignored() {
        let mut client = FileTransfers::new(TransferConfig::default());
        client.handle_chunk(FileChunkPayload {
            digest: digest(1),
            total_size: 100,
            offset: 0,
            data: vec![0; 10],
        });
        let outcome = client.handle_chunk(FileChunkPayload {
            digest: digest(1),
            total_size: 100,
            offset: 50,
            data: vec![0; 10],
        });
        assert_eq!(outcome, ChunkOutcome::Ignored);
        // The transfer survives and the expected offset still applies.
        let outcome = client.handle_chunk(FileChunkPayload {
            digest: digest(1),
            total_size: 100,
            offset: 10,
            data: vec![0; 10],
        });
        assert_ne!(outcome, ChunkOutcome::Ignored);
    }

    #[test]
    fn oversized_announcement_is_refused() {
        let config = TransferConfig {
            max_file_size: 64,
            ..TransferConfig::default()
        };
        let mut client = FileTransfers::new(config);
        let outcome = client.handle_chunk(FileChunkPayload {
            digest: digest(1),
            total_size: 1000,
            offset: 0,
            data: vec![0; 10],
        });
        assert_eq!(outcome, ChunkOutcome::Ignored);
        assert!(client.receiving.is_empty());
    }

    #[test]
    fn overrunning_chunk_poisons_the_transfer() {
        let mut client = FileTransfers::new(TransferConfig::default());
        client.handle_chunk(FileChunkPayload {
            digest: digest(1),
            total_size: 15,
            offset: 0,
            data: vec![0; 10],
        });
        let outcome = client.handle_chunk(FileChunkPayload {
            digest: digest(1),
            total_size: 15,
            offset: 10,
            data: vec![0; 10],
        });
        assert_eq!(outcome, ChunkOutcome::Ignored);
        assert!(client.receiving.is_empty());
    }

    #[test]
    fn cancel_receive_discards_the_partial_download() {
        let mut client = FileTransfers::new(TransferConfig::default());
        client.handle_chunk(FileChunkPayload {
            digest: digest(1),
            total_size: 100,
            offset: 0,
            data: vec![0; 10],
        });
        assert!(client.cancel_receive(&digest(1)));
        assert!(!client.cancel_receive(&digest(1)));
        assert!(client.receiving.is_empty());
    }
}
