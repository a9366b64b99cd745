use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use futures::channel::oneshot;
use spectile_core::{BitmapBudget, TileBitmap, TileGenerationParams, TileRenderer};

use super::protocol::{RequestId, WorkerRequest, WorkerResponse};
use super::render_thread;
use crate::error::TileError;

type Continuation = oneshot::Sender<Result<TileBitmap, TileError>>;

/// Awaitable result of [`WorkerClient::get_tile`].
///
/// Resolves once [`WorkerClient::dispatch_responses`] sees the matching
/// reply. Dropping it before then turns the eventual bitmap into an orphan,
/// which the client releases.
#[must_use = "dropping a TileReply abandons the request"]
pub struct TileReply {
    rx: oneshot::Receiver<Result<TileBitmap, TileError>>,
}

impl Future for TileReply {
    type Output = Result<TileBitmap, TileError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(TileError::Cancelled)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Request/response front end for the render worker thread.
///
/// Lives on the UI thread. Requests go out immediately; responses queue up
/// until the host calls [`WorkerClient::dispatch_responses`] (once per frame
/// or whenever it is woken), which is where pending replies resolve.
pub struct WorkerClient {
    requests: Option<Sender<WorkerRequest>>,
    responses: Receiver<WorkerResponse>,
    pending: HashMap<RequestId, Continuation>,
    next_req_id: RequestId,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl WorkerClient {
    /// Start the worker thread. Returns `None` when the platform cannot
    /// spawn threads; callers treat that as "tiles never render".
    pub fn spawn(renderer: Arc<dyn TileRenderer>, budget: BitmapBudget) -> Option<Self> {
        let (req_tx, req_rx) = unbounded();
        let (resp_tx, resp_rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));

        match render_thread::spawn(renderer, budget, req_rx, resp_tx, Arc::clone(&stop)) {
            Ok(handle) => Some(Self {
                requests: Some(req_tx),
                responses: resp_rx,
                pending: HashMap::new(),
                next_req_id: 0,
                stop,
                thread: Some(handle),
            }),
            Err(e) => {
                log::warn!("render worker unavailable, spectrogram tiles disabled: {e}");
                None
            }
        }
    }

    fn post(&self, request: WorkerRequest) -> bool {
        match &self.requests {
            Some(tx) => tx.send(request).is_ok(),
            None => false,
        }
    }

    /// Hand the worker its own copy of the audio. Never pass the buffer
    /// backing playback: the samples are moved.
    pub fn init_audio(&self, samples: Vec<f32>, sample_rate: u32) {
        log::info!("render worker: loading {} samples @ {sample_rate} Hz", samples.len());
        if !self.post(WorkerRequest::Init { samples, sample_rate }) {
            log::error!("render worker is gone; audio not delivered");
        }
    }

    pub fn set_palette(&self, palette: &[u8]) {
        if !self.post(WorkerRequest::SetPalette { palette: palette.to_vec() }) {
            log::error!("render worker is gone; palette not delivered");
        }
    }

    pub fn get_tile(&mut self, params: TileGenerationParams) -> TileReply {
        let req_id = self.next_req_id;
        self.next_req_id += 1;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(req_id, tx);
        log::debug!(
            "request {req_id}: tile {} @ {}x{}",
            params.tile_index,
            params.width,
            params.height
        );

        if !self.post(WorkerRequest::GetTile { req_id, params }) {
            if let Some(tx) = self.pending.remove(&req_id) {
                let _ = tx.send(Err(TileError::WorkerUnavailable));
            }
        }
        TileReply { rx }
    }

    /// Resolve every reply that has arrived so far. Returns how many
    /// responses were handled.
    pub fn dispatch_responses(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.responses.try_recv() {
                Ok(response) => {
                    self.dispatch(response);
                    handled += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.on_disconnect();
                    break;
                }
            }
        }
        handled
    }

    /// Block up to `timeout` for at least one response, then dispatch
    /// everything available. Returns immediately when nothing is pending.
    pub fn wait_for_responses(&mut self, timeout: Duration) -> usize {
        if self.pending.is_empty() {
            return self.dispatch_responses();
        }
        match self.responses.recv_timeout(timeout) {
            Ok(response) => {
                self.dispatch(response);
                1 + self.dispatch_responses()
            }
            Err(RecvTimeoutError::Timeout) => 0,
            Err(RecvTimeoutError::Disconnected) => {
                self.on_disconnect();
                0
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_alive(&self) -> bool {
        self.requests.is_some()
    }

    fn dispatch(&mut self, response: WorkerResponse) {
        match response {
            WorkerResponse::TileReady { req_id, bitmap } => match self.pending.remove(&req_id) {
                Some(tx) => {
                    if let Err(Ok(bitmap)) = tx.send(Ok(bitmap)) {
                        log::debug!("request {req_id}: requester went away, releasing tile");
                        bitmap.release();
                    }
                }
                None => {
                    log::debug!("request {req_id}: orphaned tile, releasing");
                    bitmap.release();
                }
            },
            WorkerResponse::Error { req_id, message } => match self.pending.remove(&req_id) {
                Some(tx) => {
                    log::warn!("request {req_id}: worker error: {message}");
                    let _ = tx.send(Err(TileError::Generation(message)));
                }
                None => log::debug!("request {req_id}: orphaned error: {message}"),
            },
        }
    }

    fn on_disconnect(&mut self) {
        if self.requests.take().is_some() {
            log::error!(
                "render worker exited unexpectedly with {} request(s) pending",
                self.pending.len()
            );
        }
        for (_, tx) in self.pending.drain() {
            let _ = tx.send(Err(TileError::WorkerUnavailable));
        }
    }

    /// Stop the worker and drop every pending reply unresolved. Anything the
    /// worker already produced is released. Idempotent.
    pub fn terminate(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.requests.take();
        let dropped = self.pending.len();
        self.pending.clear();

        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                log::error!("render worker panicked");
            }
            log::debug!("render worker terminated, {dropped} request(s) dropped");
        }

        while let Ok(response) = self.responses.try_recv() {
            log::trace!("request {}: discarded at teardown", response.req_id());
            if let WorkerResponse::TileReady { bitmap, .. } = response {
                bitmap.release();
            }
        }
    }
}

impl Drop for WorkerClient {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SolidRenderer;
    use futures::executor::block_on;

    fn params(index: usize, width: u32) -> TileGenerationParams {
        TileGenerationParams {
            tile_index: index,
            start_time: index as f64 * 5.0,
            end_time: index as f64 * 5.0 + 5.0,
            width,
            height: 8,
            gain: 1.0,
            palette_id: "grey".into(),
        }
    }

    fn client() -> (WorkerClient, BitmapBudget) {
        let budget = BitmapBudget::new();
        let client = WorkerClient::spawn(Arc::new(SolidRenderer), budget.clone()).unwrap();
        client.init_audio(vec![0.0; 100], 10);
        (client, budget)
    }

    fn settle(client: &mut WorkerClient) {
        for _ in 0..100 {
            if client.pending_len() == 0 {
                return;
            }
            client.wait_for_responses(Duration::from_secs(5));
        }
        panic!("worker never answered");
    }

    #[test]
    fn test_get_tile_resolves_with_bitmap() {
        let (mut client, budget) = client();
        let reply = client.get_tile(params(0, 512));
        assert_eq!(client.pending_len(), 1);
        settle(&mut client);
        let bitmap = block_on(reply).unwrap();
        assert_eq!(bitmap.width(), 512);
        assert_eq!(budget.live(), 1);
        bitmap.release();
        assert_eq!(budget.live(), 0);
    }

    #[test]
    fn test_replies_correlate_by_id() {
        let (mut client, _budget) = client();
        let replies: Vec<_> = [512u32, 1024, 2048]
            .iter()
            .enumerate()
            .map(|(i, &w)| (w, client.get_tile(params(i, w))))
            .collect();
        settle(&mut client);
        for (width, reply) in replies {
            assert_eq!(block_on(reply).unwrap().width(), width);
        }
    }

    #[test]
    fn test_error_rejects_with_message() {
        let (mut client, budget) = client();
        let mut p = params(0, 512);
        p.palette_id = "fail".into();
        let reply = client.get_tile(p);
        settle(&mut client);
        match block_on(reply) {
            Err(TileError::Generation(message)) => assert!(message.contains("512x8")),
            other => panic!("expected generation error, got {other:?}"),
        }
        assert_eq!(budget.live(), 0);
    }

    #[test]
    fn test_no_audio_is_an_error() {
        let budget = BitmapBudget::new();
        let mut client = WorkerClient::spawn(Arc::new(SolidRenderer), budget).unwrap();
        let reply = client.get_tile(params(0, 512));
        settle(&mut client);
        assert!(matches!(block_on(reply), Err(TileError::Generation(_))));
    }

    #[test]
    fn test_dropped_reply_releases_orphan() {
        let (mut client, budget) = client();
        drop(client.get_tile(params(0, 512)));
        settle(&mut client);
        assert_eq!(budget.live(), 0);
        assert_eq!(budget.released(), 1);
    }

    #[test]
    fn test_reply_for_unknown_id_is_released() {
        let (mut client, budget) = client();
        let stray = budget.allocate(2, 2, vec![0; 16]);
        client.dispatch(WorkerResponse::TileReady { req_id: 999, bitmap: stray });
        assert_eq!(budget.live(), 0);
        assert_eq!(budget.released(), 1);

        client.dispatch(WorkerResponse::Error { req_id: 1000, message: "late".into() });
        assert_eq!(client.pending_len(), 0);
    }

    #[test]
    fn test_terminate_cancels_pending() {
        let (mut client, budget) = client();
        let reply = client.get_tile(params(0, 512));
        client.terminate();
        assert_eq!(client.pending_len(), 0);
        assert!(!client.is_alive());
        assert!(matches!(block_on(reply), Err(TileError::Cancelled)));
        assert_eq!(budget.live(), 0);

        let after = client.get_tile(params(1, 512));
        assert!(matches!(block_on(after), Err(TileError::WorkerUnavailable)));
    }

    #[test]
    fn test_palette_applies_to_later_tiles() {
        let (mut client, _budget) = client();
        let bytes: Vec<u8> = (0..256).flat_map(|_| [9u8, 8, 7, 255]).collect();
        client.set_palette(&bytes);
        let reply = client.get_tile(params(0, 512));
        settle(&mut client);
        let bitmap = block_on(reply).unwrap();
        assert_eq!(&bitmap.pixels()[..4], &[9, 8, 7, 255]);
    }
}
