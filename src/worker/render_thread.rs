use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use spectile_core::{BitmapBudget, Palette, RenderError, RenderInput, TileRenderer};

use super::protocol::{WorkerRequest, WorkerResponse};

struct WorkerAudio {
    samples: Vec<f32>,
    sample_rate: u32,
}

pub(super) fn spawn(
    renderer: Arc<dyn TileRenderer>,
    budget: BitmapBudget,
    requests: Receiver<WorkerRequest>,
    responses: Sender<WorkerResponse>,
    stop: Arc<AtomicBool>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("spectile-render".into())
        .spawn(move || {
            log::info!("render worker started");
            worker_loop(renderer.as_ref(), &budget, requests, responses, &stop);
            log::info!("render worker stopped");
        })
}

fn worker_loop(
    renderer: &dyn TileRenderer,
    budget: &BitmapBudget,
    requests: Receiver<WorkerRequest>,
    responses: Sender<WorkerResponse>,
    stop: &AtomicBool,
) {
    let mut audio: Option<WorkerAudio> = None;
    let mut palette = Palette::greyscale();

    for request in requests.iter() {
        // Queued work is abandoned on teardown, not drained
        if stop.load(Ordering::Acquire) {
            break;
        }
        match request {
            WorkerRequest::Init { samples, sample_rate } => {
                log::debug!("worker: init {} samples @ {sample_rate} Hz", samples.len());
                audio = Some(WorkerAudio { samples, sample_rate });
            }
            WorkerRequest::SetPalette { palette: bytes } => match Palette::from_bytes(&bytes) {
                Some(p) => palette = p,
                None => log::warn!("worker: ignoring palette of {} bytes", bytes.len()),
            },
            WorkerRequest::GetTile { req_id, params } => {
                let result = match &audio {
                    Some(a) => {
                        let input = RenderInput {
                            samples: &a.samples,
                            sample_rate: a.sample_rate,
                            palette: &palette,
                        };
                        renderer.render(&input, &params, budget)
                    }
                    None => Err(RenderError::NoAudio),
                };
                let response = match result {
                    Ok(bitmap) => WorkerResponse::TileReady { req_id, bitmap },
                    Err(e) => WorkerResponse::Error { req_id, message: e.to_string() },
                };
                // A failed send drops the message, and with it any bitmap
                if responses.send(response).is_err() {
                    break;
                }
            }
        }
    }
}
