//! WebRTC tracks carrying the tuner's output.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::trace;
use tokio::runtime::Handle;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264, MIME_TYPE_OPUS};
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::pipeline::Sink;

/// Payload type the peer media engine assigns to the video codec.
pub const VIDEO_PAYLOAD_TYPE: u8 = 96;
/// Payload type the peer media engine assigns to the audio codec.
pub const AUDIO_PAYLOAD_TYPE: u8 = 97;

const STREAM_ID: &str = "tunecast";

/// H.264 Constrained Baseline, the profile every browser can decode.
pub fn video_codec() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_H264.to_owned(),
        clock_rate: 90000,
        channels: 0,
        sdp_fmtp_line: "profile-level-id=42e028;level-asymmetry-allowed=1;packetization-mode=1"
            .to_owned(),
        ..Default::default()
    }
}

pub fn audio_codec() -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: MIME_TYPE_OPUS.to_owned(),
        clock_rate: 48000,
        channels: 2,
        ..Default::default()
    }
}

/// Register the tuner's codecs, and only those, with `media_engine`.
pub fn register_codecs(media_engine: &mut MediaEngine) -> Result<(), webrtc::Error> {
    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: video_codec(),
            payload_type: VIDEO_PAYLOAD_TYPE,
            ..Default::default()
        },
        RTPCodecType::Video,
    )?;
    media_engine.register_codec(
        RTCRtpCodecParameters {
            capability: audio_codec(),
            payload_type: AUDIO_PAYLOAD_TYPE,
            ..Default::default()
        },
        RTPCodecType::Audio,
    )?;
    Ok(())
}

/// Video and audio tracks fed by one pipeline.
#[derive(Clone)]
pub struct TrackPair {
    pub video: Arc<TrackLocalStaticSample>,
    pub audio: Arc<TrackLocalStaticSample>,
}

impl TrackPair {
    /// Create a fresh pair of tracks, not yet bound to any peer.
    pub fn new() -> Self {
        Self {
            video: Arc::new(TrackLocalStaticSample::new(
                video_codec(),
                "video".to_owned(),
                STREAM_ID.to_owned(),
            )),
            audio: Arc::new(TrackLocalStaticSample::new(
                audio_codec(),
                "audio".to_owned(),
                STREAM_ID.to_owned(),
            )),
        }
    }

    /// Whether both handles point at the same tracks as `other`.
    #[cfg(test)]
    pub fn same_tracks(&self, other: &TrackPair) -> bool {
        Arc::ptr_eq(&self.video, &other.video) && Arc::ptr_eq(&self.audio, &other.audio)
    }
}

impl Default for TrackPair {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TrackPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackPair")
            .field("video", &self.video.id())
            .field("audio", &self.audio.id())
            .finish()
    }
}

/// The tracks currently carrying tuner output, if any.
#[derive(Clone, Debug, Default)]
pub struct Tracks(Option<TrackPair>);

impl Tracks {
    pub fn empty() -> Self {
        Self(None)
    }

    pub fn live(pair: TrackPair) -> Self {
        Self(Some(pair))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    pub fn pair(&self) -> Option<&TrackPair> {
        self.0.as_ref()
    }
}

/// Adapt `track` into a pipeline sink that writes every buffer as one
/// sample.
///
/// The sink runs on pipeline threads, outside any async context. Writes are
/// driven on the runtime current when the sink is created, if there is one.
pub fn track_sink(track: Arc<TrackLocalStaticSample>) -> Sink {
    let runtime = Handle::try_current().ok();

    Box::new(move |data: &[u8], duration: Duration| {
        let sample = Sample {
            data: Bytes::copy_from_slice(data),
            duration,
            ..Default::default()
        };
        let write = track.write_sample(&sample);
        let result = match &runtime {
            Some(handle) => handle.block_on(write),
            None => futures_executor::block_on(write),
        };
        if let Err(e) = result {
            trace!("[Tracks] Dropped sample for {}: {}", track.id(), e);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codecs() {
        let video = video_codec();
        assert_eq!(video.mime_type, MIME_TYPE_H264);
        assert_eq!(video.clock_rate, 90000);
        assert!(video.sdp_fmtp_line.contains("packetization-mode=1"));

        let audio = audio_codec();
        assert_eq!(audio.mime_type, MIME_TYPE_OPUS);
        assert_eq!(audio.clock_rate, 48000);
        assert_eq!(audio.channels, 2);
    }

    #[test]
    fn test_register_codecs() {
        let mut media_engine = MediaEngine::default();
        assert!(register_codecs(&mut media_engine).is_ok());
    }

    #[test]
    fn test_track_pair_identity() {
        let a = TrackPair::new();
        let b = TrackPair::new();
        assert!(a.same_tracks(&a.clone()));
        assert!(!a.same_tracks(&b));
        assert_eq!(a.video.id(), "video");
        assert_eq!(a.audio.id(), "audio");
        assert_eq!(a.video.stream_id(), STREAM_ID);
    }

    #[test]
    fn test_tracks_empty_by_default() {
        assert!(Tracks::default().is_empty());
        assert!(Tracks::empty().pair().is_none());
        assert!(!Tracks::live(TrackPair::new()).is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_track_sink_without_peers() {
        let pair = TrackPair::new();
        let sink = tokio::task::spawn_blocking(move || track_sink(Arc::clone(&pair.video)))
            .await
            .unwrap();

        // An unbound track accepts and discards samples.
        tokio::task::spawn_blocking(move || sink(&[0, 0, 0, 1, 0x67], Duration::from_millis(33)))
            .await
            .unwrap();
    }

    #[test]
    fn test_track_sink_outside_runtime() {
        let pair = TrackPair::new();
        let sink = track_sink(Arc::clone(&pair.audio));
        sink(&[0xfc, 0xff, 0xfe], Duration::from_millis(20));
    }
}
