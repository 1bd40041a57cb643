//! Pipeline descriptions for tuning one ATSC program.

use std::fmt::{self, Write};

use tunecast_protocol::Channel;

use super::SinkKind;

/// Leaky queue that holds up to 2.5s of data, so a slow branch drops old
/// buffers instead of stalling the demuxer.
const LEAKY_QUEUE: &str =
    "queue leaky=downstream max-size-time=2500000000 max-size-buffers=0 max-size-bytes=0";

/// Implementation used to decode and re-encode video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum VideoPipeline {
    /// Software decoding and x264 encoding. Works almost anywhere.
    #[default]
    Default,
    /// Hardware accelerated processing through VA-API. Requires the
    /// gstreamer-vaapi plugins and a working VA-API driver.
    Vaapi,
}

impl VideoPipeline {
    /// Select a video pipeline by name. Unknown names select
    /// [`VideoPipeline::Default`].
    pub fn from_name(name: &str) -> Self {
        match name {
            "vaapi" => VideoPipeline::Vaapi,
            _ => VideoPipeline::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VideoPipeline::Default => "default",
            VideoPipeline::Vaapi => "vaapi",
        }
    }
}

impl fmt::Display for VideoPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the description of a pipeline that tunes `channel` and feeds the
/// video and audio sinks.
pub fn describe(channel: &Channel, video: VideoPipeline) -> String {
    let mut d = String::new();

    // Writing into a String cannot fail.
    let _ = writeln!(
        d,
        "dvbsrc delsys=atsc modulation={} frequency={}",
        channel.modulation.source_name(),
        channel.frequency
    );
    let _ = writeln!(d, "! {}", LEAKY_QUEUE);
    let _ = writeln!(d, "! tsdemux name=demux program-number={}", channel.program_id);

    let _ = writeln!(d, "demux.");
    let _ = writeln!(d, "! {}", LEAKY_QUEUE);
    let _ = writeln!(d, "! mpegvideoparse");
    match video {
        VideoPipeline::Vaapi => {
            let _ = writeln!(d, "! vaapimpeg2dec");
            let _ = writeln!(d, "! vaapipostproc deinterlace-mode=auto");
            let _ = writeln!(
                d,
                "! vaapih264enc rate-control=cbr bitrate=12000 cpb-length=2000 quality-level=1 tune=high-compression"
            );
        }
        VideoPipeline::Default => {
            let _ = writeln!(d, "! mpeg2dec");
            let _ = writeln!(d, "! deinterlace");
            let _ = writeln!(d, "! x264enc bitrate=8192 tune=zerolatency speed-preset=ultrafast");
        }
    }
    let _ = writeln!(d, "! video/x-h264,profile=constrained-baseline,stream-format=byte-stream");
    let _ = writeln!(
        d,
        "! appsink name={} max-buffers=50 drop=true",
        SinkKind::Video.element_name()
    );

    let _ = writeln!(d, "demux.");
    let _ = writeln!(d, "! {}", LEAKY_QUEUE);
    let _ = writeln!(d, "! a52dec");
    let _ = writeln!(d, "! audioconvert");
    let _ = writeln!(d, "! audioresample");
    let _ = writeln!(d, "! audio/x-raw,rate=48000,channels=2");
    let _ = writeln!(d, "! opusenc bitrate=128000");
    let _ = write!(
        d,
        "! appsink name={} max-buffers=50 drop=true",
        SinkKind::Audio.element_name()
    );

    d
}
