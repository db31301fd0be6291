//! Background patch generation.
//!
//! Remote descriptor requests can take seconds, so they run on a worker
//! thread. The engine submits [`PatchRequest`]s and drains finished
//! [`PatchResult`]s with `try_recv` at the start of each tick.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};

use super::descriptor::{SoundDescriptor, SoundDescriptorGenerator};
use crate::error::EngineError;
use crate::model::TrackId;
use crate::patch::InstrumentPatch;

/// A prompt waiting for a patch.
#[derive(Clone, Debug, PartialEq)]
pub struct PatchRequest {
    pub id: u64,
    pub prompt: String,
    pub genre: Option<String>,
    /// Track the finished patch is bound to.
    pub target_track: Option<TrackId>,
}

/// A finished request.
#[derive(Clone, Debug)]
pub struct PatchResult {
    pub request: PatchRequest,
    pub descriptor: SoundDescriptor,
    pub patch: InstrumentPatch,
}

/// Handle to the patch worker thread.
pub struct PatchRequester {
    request_tx: Option<Sender<PatchRequest>>,
    result_rx: Receiver<PatchResult>,
    worker: Option<JoinHandle<()>>,
    next_id: u64,
    in_flight: usize,
}

impl PatchRequester {
    /// Start the worker thread.
    pub fn spawn(generator: SoundDescriptorGenerator) -> std::io::Result<Self> {
        let (request_tx, request_rx) = unbounded::<PatchRequest>();
        let (result_tx, result_rx) = unbounded();

        let worker = thread::Builder::new()
            .name("jam-patches".to_string())
            .spawn(move || {
                for request in request_rx {
                    log::debug!("[SOUNDBANK] Generating patch for '{}'", request.prompt);
                    let descriptor = generator.generate(&request.prompt, request.genre.as_deref());
                    let patch = descriptor.to_patch();
                    if result_tx
                        .send(PatchResult {
                            request,
                            descriptor,
                            patch,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
                log::debug!("[SOUNDBANK] Patch worker exiting");
            })?;

        Ok(Self {
            request_tx: Some(request_tx),
            result_rx,
            worker: Some(worker),
            next_id: 1,
            in_flight: 0,
        })
    }

    /// Queue a prompt. Returns the request id.
    pub fn request(
        &mut self,
        prompt: &str,
        genre: Option<&str>,
        target_track: Option<TrackId>,
    ) -> Result<u64, EngineError> {
        let tx = self
            .request_tx
            .as_ref()
            .ok_or(EngineError::ChannelClosed("patch requests"))?;
        let id = self.next_id;
        tx.send(PatchRequest {
            id,
            prompt: prompt.to_string(),
            genre: genre.map(str::to_string),
            target_track,
        })
        .map_err(|_| EngineError::ChannelClosed("patch requests"))?;
        self.next_id += 1;
        self.in_flight += 1;
        Ok(id)
    }

    /// Finished results, without blocking.
    pub fn try_results(&mut self) -> Vec<PatchResult> {
        let results: Vec<PatchResult> = self.result_rx.try_iter().collect();
        self.in_flight = self.in_flight.saturating_sub(results.len());
        results
    }

    /// Requests submitted but not yet drained.
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Stop accepting requests and wait for the worker to finish the queue.
    pub fn shutdown(&mut self) {
        self.request_tx.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PatchRequester {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::PatchKind;
    use std::time::{Duration, Instant};

    fn wait_for(requester: &mut PatchRequester, count: usize) -> Vec<PatchResult> {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut results = Vec::new();
        while results.len() < count && Instant::now() < deadline {
            results.extend(requester.try_results());
            thread::sleep(Duration::from_millis(5));
        }
        results
    }

    #[test]
    fn test_requests_complete_in_order() {
        let mut requester = PatchRequester::spawn(SoundDescriptorGenerator::offline()).unwrap();
        let a = requester
            .request("Makossa Bass", Some("Makossa"), Some("t-bass".to_string()))
            .unwrap();
        let b = requester.request("dry shaker", None, None).unwrap();
        assert_eq!(requester.in_flight(), 2);

        let results = wait_for(&mut requester, 2);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].request.id, a);
        assert_eq!(results[0].request.target_track.as_deref(), Some("t-bass"));
        assert_eq!(results[0].descriptor.genre.as_deref(), Some("Makossa"));
        assert_eq!(results[1].request.id, b);
        assert_eq!(results[1].patch.kind, PatchKind::Procedural);
        assert_eq!(requester.in_flight(), 0);
    }

    #[test]
    fn test_request_after_shutdown_fails() {
        let mut requester = PatchRequester::spawn(SoundDescriptorGenerator::offline()).unwrap();
        requester.shutdown();
        assert_eq!(
            requester.request("bass", None, None),
            Err(EngineError::ChannelClosed("patch requests"))
        );
        assert!(requester.try_results().is_empty());
    }
}
