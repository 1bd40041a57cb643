//! GStreamer pipeline backend.

use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use log::{debug, info, warn};

use super::{Pipeline, PipelineBackend, PipelineError, Sink, SinkKind};

/// Builds pipelines with `gst_parse_launch`.
#[derive(Debug)]
pub struct GstBackend {
    _private: (),
}

impl GstBackend {
    /// Initialize GStreamer. Safe to call more than once.
    pub fn new() -> Result<Self, PipelineError> {
        gst::init().map_err(|e| PipelineError::Launch(e.to_string()))?;
        let (major, minor, micro, _) = gst::version();
        info!("[Pipeline] GStreamer {}.{}.{} initialized", major, minor, micro);
        Ok(Self { _private: () })
    }
}

impl PipelineBackend for GstBackend {
    fn launch(&self, description: &str) -> Result<Box<dyn Pipeline>, PipelineError> {
        debug!("[Pipeline] Launching:\n{}", description);

        let element =
            gst::parse::launch(description).map_err(|e| PipelineError::Launch(e.to_string()))?;
        let pipeline = element
            .downcast::<gst::Pipeline>()
            .map_err(|_| PipelineError::Launch("description is not a pipeline".to_string()))?;

        Ok(Box::new(GstPipeline { pipeline }))
    }
}

struct GstPipeline {
    pipeline: gst::Pipeline,
}

impl Pipeline for GstPipeline {
    fn set_sink(&mut self, kind: SinkKind, sink: Sink) -> Result<(), PipelineError> {
        let name = kind.element_name();
        let appsink = self
            .pipeline
            .by_name(name)
            .ok_or(PipelineError::MissingSink(name))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| PipelineError::MissingSink(name))?;

        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;
                    let duration = buffer
                        .duration()
                        .map(|d| Duration::from_nanos(d.nseconds()))
                        .unwrap_or_default();

                    sink(map.as_slice(), duration);
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );
        Ok(())
    }

    fn start(&mut self) -> Result<(), PipelineError> {
        let change = self
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| self.state_change_error())?;

        // Tuning failures (no device, no lock) abort the asynchronous part of
        // the transition. Live pipelines return NoPreroll and never get here.
        if change == gst::StateChangeSuccess::Async {
            let (result, _, _) = self.pipeline.state(gst::ClockTime::NONE);
            result.map_err(|_| self.state_change_error())?;
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), PipelineError> {
        self.pipeline
            .set_state(gst::State::Null)
            .map_err(|e| PipelineError::StateChange(e.to_string()))?;
        Ok(())
    }
}

impl GstPipeline {
    /// Error for a failed state change, with the bus error message if the
    /// pipeline posted one.
    fn state_change_error(&self) -> PipelineError {
        let detail = self
            .pipeline
            .bus()
            .and_then(|bus| bus.pop_filtered(&[gst::MessageType::Error]))
            .and_then(|msg| match msg.view() {
                gst::MessageView::Error(err) => Some(err.error().to_string()),
                _ => None,
            });
        PipelineError::StateChange(detail.unwrap_or_else(|| "state change failed".to_string()))
    }
}

impl Drop for GstPipeline {
    fn drop(&mut self) {
        if self.pipeline.current_state() != gst::State::Null {
            warn!("[Pipeline] Dropped without close; forcing state to NULL");
            let _ = self.pipeline.set_state(gst::State::Null);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_waits_for_preroll() {
        let backend = GstBackend::new().unwrap();
        let mut pipeline = backend
            .launch("videotestsrc num-buffers=5 ! fakesink sync=false")
            .unwrap();

        pipeline.start().unwrap();
        pipeline.close().unwrap();
    }

    #[test]
    fn test_start_reports_bus_error() {
        let backend = GstBackend::new().unwrap();
        let mut pipeline = backend
            .launch("filesrc location=/nonexistent/tunecast.ts ! fakesink")
            .unwrap();

        match pipeline.start() {
            Err(PipelineError::StateChange(msg)) => assert!(!msg.is_empty()),
            other => panic!("unexpected start result: {:?}", other),
        }
        pipeline.close().unwrap();
    }
}
