//! Live streaming: per-tick PNG pairs and metrics over a WebSocket
//!
//! The run happens on a blocking thread that pushes encoded ticks into a
//! bounded channel; the socket task paces them at the source frame rate.
//! Dropping the receiver (client gone) ends the run at the next tick.
//!
//! Wire shape after the client's first text message (a `PipelineRequest`):
//!
//! ```text
//! text   {"type":"metadata","tick":0,"fps":25.0,"mime":"image/png",
//!         "metrics":{"status":"ok","psnr":31.2,"ssim":0.97}}
//! binary left PNG
//! binary right PNG
//! ...    one metadata/left/right triple per tick
//! text   {"type":"end","ticks":N}
//!    or  {"type":"error","category":"resource","message":"...","details":null}
//! ```
//!
//! `type` and `tick` are additions over a bare `{fps, mime, metrics}` header;
//! clients that ignore unknown keys read it unchanged. Incomparable frames
//! carry `{"status":"message","message":"..."}` as their metrics.

use crate::error::ApiError;
use crate::types::StreamMessage;
use crate::ApiState;
use axum::extract::ws::{Message, WebSocket};
use image::ImageFormat;
use std::io::Cursor;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use video_pipeline_common::{Frame, MetricRecord};
use video_pipeline_core::{
    ModuleContext, PipelineError, PipelineGraph, PipelineRequest, PipelineRun, SidePlan,
};
use video_pipeline_metrics::compute_metrics;

/// One encoded tick ready to send
#[derive(Debug, Clone)]
pub struct StreamTick {
    pub index: u64,
    pub fps: f64,
    pub metrics: MetricRecord,
    pub left: Vec<u8>,
    pub right: Vec<u8>,
}

/// Encode a frame as PNG
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn encode_png(frame: &Frame) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    frame.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

/// Drive a graph and push every tick into `tx`
///
/// Returns the number of ticks delivered; stops early without error when the
/// receiver is gone.
///
/// # Errors
///
/// Returns the first pipeline error.
pub fn produce_ticks(
    graph: &PipelineGraph,
    ctx: &ModuleContext,
    tx: &mpsc::Sender<StreamTick>,
) -> Result<u64, PipelineError> {
    let plan = SidePlan::for_graph(graph);
    let run = PipelineRun::start(graph, ctx)?;
    let fps = run.fps();
    let mut delivered = 0;
    for tick in run {
        let tick = tick?;
        let (left, right) = plan.pick(&tick);
        let encode = |frame: &Frame| {
            encode_png(frame).map_err(|e| PipelineError::Internal(format!("PNG encoding failed: {e}")))
        };
        let message = StreamTick {
            index: tick.index,
            fps,
            metrics: compute_metrics(&left, &right),
            left: encode(&*left)?,
            right: encode(&*right)?,
        };
        if tx.blocking_send(message).is_err() {
            debug!("Stream receiver closed after {} ticks", delivered);
            break;
        }
        delivered += 1;
    }
    Ok(delivered)
}

async fn send_json(socket: &mut WebSocket, message: &StreamMessage) -> bool {
    match serde_json::to_string(message) {
        Ok(text) => socket.send(Message::Text(text.into())).await.is_ok(),
        Err(e) => {
            warn!("Cannot serialize stream message: {}", e);
            false
        }
    }
}

/// Serve one streaming session
///
/// The first client message is a pipeline request; frames follow until the
/// source is exhausted, the run fails, or the client disconnects.
pub async fn stream_session(mut socket: WebSocket, state: ApiState) {
    let request = loop {
        match socket.recv().await {
            Some(Ok(Message::Text(text))) => {
                match serde_json::from_str::<PipelineRequest>(text.as_str()) {
                    Ok(request) => break request,
                    Err(e) => {
                        let err = ApiError::BadRequest(format!("invalid pipeline request: {e}"));
                        send_json(&mut socket, &StreamMessage::Error(err.body())).await;
                        return;
                    }
                }
            }
            Some(Ok(Message::Close(_))) | None => return,
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                debug!("WebSocket receive failed: {}", e);
                return;
            }
        }
    };

    let graph = match PipelineGraph::build(&request, &state.registry) {
        Ok(graph) => graph,
        Err(e) => {
            send_json(&mut socket, &StreamMessage::Error(ApiError::from(e).body())).await;
            return;
        }
    };

    let (tx, mut rx) = mpsc::channel::<StreamTick>(state.config.channel_capacity.max(1));
    let ctx = state.config.module_context();
    let producer = tokio::task::spawn_blocking(move || produce_ticks(&graph, &ctx, &tx));
    let mime = state.config.stream_mime.clone();

    let mut interval: Option<tokio::time::Interval> = None;
    let mut sent = 0u64;
    while let Some(tick) = rx.recv().await {
        let pacing = interval.get_or_insert_with(|| {
            let period = if tick.fps > 0.0 { 1.0 / tick.fps } else { 0.0 };
            tokio::time::interval(Duration::from_secs_f64(period.max(0.001)))
        });
        pacing.tick().await;

        let metadata = StreamMessage::Metadata {
            tick: tick.index,
            fps: tick.fps,
            mime: mime.clone(),
            metrics: tick.metrics,
        };
        if !send_json(&mut socket, &metadata).await
            || socket.send(Message::Binary(tick.left.into())).await.is_err()
            || socket.send(Message::Binary(tick.right.into())).await.is_err()
        {
            info!("Stream client disconnected after {} ticks", sent);
            break;
        }
        sent += 1;
    }
    // Unblocks the producer if it is waiting on a full channel
    drop(rx);

    let outcome = producer.await.map_err(ApiError::from).and_then(|r| r.map_err(ApiError::from));
    match outcome {
        Ok(_) => {
            send_json(&mut socket, &StreamMessage::End { ticks: sent }).await;
            info!("Stream finished: {} ticks", sent);
        }
        Err(e) => {
            warn!("Stream run failed: {}", e);
            send_json(&mut socket, &StreamMessage::Error(e.body())).await;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}
