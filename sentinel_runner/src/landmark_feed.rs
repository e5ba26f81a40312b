// THEORY:
// The pose model runs in its own process and publishes one JSON record per frame over
// TCP (NDJSON). `LandmarkFeed` is the `FrameSource` for that wire format and `FeedPose`
// is the matching `PoseEstimator`: the "model" already ran, so estimating is just
// scaling its normalised coordinates back to pixels.
//
//   {"width": 640, "height": 480, "landmarks": {"left_shoulder": [0.41, 0.52], ...}}
//   {"width": 640, "height": 480, "landmarks": null}      <- nobody in view
//
// Unknown landmark names are ignored. An empty line, EOF or an unparsable record is a
// `ReadFailure`; the connector's failure policy takes it from there.

use async_trait::async_trait;
use posture_sentinel::{
    BodyPart, FrameHandle, FrameSource, LandmarkSet, OpenError, Point2D, PoseEstimator, ReadFailure,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::{mem, str};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const SCHEME: &str = "tcp://";

/// One record off the feed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FeedFrame {
    pub width: f64,
    pub height: f64,
    /// Normalised `[x, y]` per landmark name. `None` when no pose was detected.
    #[serde(default)]
    pub landmarks: Option<HashMap<String, [f64; 2]>>,
}

pub fn parse_frame(line: &str) -> Result<FeedFrame, ReadFailure> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ReadFailure::Malformed("empty record".to_string()));
    }
    let frame: FeedFrame =
        serde_json::from_str(line).map_err(|e| ReadFailure::Malformed(e.to_string()))?;
    let valid = |v: f64| v.is_finite() && v > 0.0;
    if !valid(frame.width) || !valid(frame.height) {
        return Err(ReadFailure::Malformed(format!(
            "bad frame size {}x{}",
            frame.width, frame.height
        )));
    }
    Ok(frame)
}

fn address(source_id: &str) -> Result<&str, OpenError> {
    source_id
        .strip_prefix(SCHEME)
        .filter(|addr| !addr.is_empty())
        .ok_or_else(|| OpenError::Unavailable(format!("unsupported source {source_id}, expected tcp://host:port")))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LandmarkFeed;

impl LandmarkFeed {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FrameSource for LandmarkFeed {
    type Handle = FeedConnection;

    async fn open(&self, source_id: &str) -> Result<FeedConnection, OpenError> {
        let addr = address(source_id)?;
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| OpenError::Unavailable(format!("{addr}: {e}")))?;
        log::debug!("TCP connected to {addr}");
        Ok(FeedConnection {
            reader: Some(BufReader::new(stream)),
            pending: Vec::new(),
        })
    }
}

pub struct FeedConnection {
    reader: Option<BufReader<TcpStream>>,
    /// Bytes of a record still in flight when a read was cut short.
    pending: Vec<u8>,
}

#[async_trait]
impl FrameHandle for FeedConnection {
    type Frame = FeedFrame;

    async fn read_frame(&mut self) -> Result<FeedFrame, ReadFailure> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(ReadFailure::EndOfStream);
        };
        // `read_until` is cancel safe: when the connector's timeout drops this future,
        // the partial record stays in `pending` and the next read completes it.
        match reader.read_until(b'\n', &mut self.pending).await {
            Ok(0) => {
                self.pending.clear();
                Err(ReadFailure::EndOfStream)
            }
            Ok(_) => {
                let record = mem::take(&mut self.pending);
                let line = str::from_utf8(&record)
                    .map_err(|e| ReadFailure::Malformed(format!("record is not UTF-8: {e}")))?;
                parse_frame(line)
            }
            Err(e) => Err(ReadFailure::Io(e.to_string())),
        }
    }

    async fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            let mut stream = reader.into_inner();
            let _ = stream.shutdown().await;
        }
    }
}

/// Scales feed coordinates to pixel space.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeedPose;

impl PoseEstimator<FeedFrame> for FeedPose {
    fn estimate(&mut self, frame: &FeedFrame) -> Option<LandmarkSet> {
        let landmarks = frame.landmarks.as_ref()?;
        Some(
            landmarks
                .iter()
                .filter_map(|(name, [x, y])| {
                    BodyPart::from_name(name)
                        .map(|part| (part, Point2D::new(x * frame.width, y * frame.height)))
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use posture_sentinel::{ConnectorConfig, StreamConnector, shutdown_channel};
    use std::time::Duration;
    use tokio::net::TcpListener;

    #[test]
    fn parses_a_full_record() {
        let frame = parse_frame(
            r#"{"width":640,"height":480,"landmarks":{"left_shoulder":[0.5,0.25],"left_ear":[0.5,0.1]}}"#,
        )
        .unwrap();
        assert_eq!(frame.width, 640.0);
        let landmarks = frame.landmarks.unwrap();
        assert_eq!(landmarks["left_shoulder"], [0.5, 0.25]);
    }

    #[test]
    fn null_or_missing_landmarks_mean_no_pose() {
        let frame = parse_frame(r#"{"width":640,"height":480,"landmarks":null}"#).unwrap();
        assert!(frame.landmarks.is_none());
        let frame = parse_frame(r#"{"width":640,"height":480}"#).unwrap();
        assert!(FeedPose.estimate(&frame).is_none());
    }

    #[test]
    fn rejects_junk() {
        assert!(matches!(parse_frame("\n"), Err(ReadFailure::Malformed(_))));
        assert!(matches!(parse_frame("{not json"), Err(ReadFailure::Malformed(_))));
        assert!(matches!(
            parse_frame(r#"{"width":0,"height":480,"landmarks":null}"#),
            Err(ReadFailure::Malformed(_))
        ));
    }

    #[test]
    fn feed_pose_scales_to_pixels_and_skips_unknown_names() {
        let frame = parse_frame(
            r#"{"width":640,"height":480,"landmarks":{"left_hip":[0.5,0.75],"left_pinky":[0.1,0.1]}}"#,
        )
        .unwrap();
        let landmarks = FeedPose.estimate(&frame).unwrap();
        assert_eq!(landmarks.len(), 1);
        assert_eq!(landmarks.get(BodyPart::LeftHip), Some(Point2D::new(320.0, 360.0)));
    }

    #[test]
    fn only_tcp_sources_are_supported() {
        assert_eq!(address("tcp://127.0.0.1:5000"), Ok("127.0.0.1:5000"));
        assert!(address("rtsp://camera/stream").is_err());
        assert!(address("tcp://").is_err());
    }

    #[tokio::test]
    async fn reads_records_until_the_peer_hangs_up() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"{\"width\":100,\"height\":100,\"landmarks\":null}\ngarbage\n")
                .await
                .unwrap();
        });

        let mut connection = LandmarkFeed::new().open(&format!("tcp://{addr}")).await.unwrap();
        server.await.unwrap();

        assert!(connection.read_frame().await.unwrap().landmarks.is_none());
        assert!(matches!(connection.read_frame().await, Err(ReadFailure::Malformed(_))));
        assert_eq!(connection.read_frame().await, Err(ReadFailure::EndOfStream));

        connection.close().await;
        connection.close().await;
        assert_eq!(connection.read_frame().await, Err(ReadFailure::EndOfStream));
    }

    #[tokio::test]
    async fn record_split_across_a_timeout_is_kept() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let record = b"{\"width\":640,\"height\":480,\"landmarks\":null}\n";
        let (head, tail) = record.split_at(20);
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(head).await.unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;
            socket.write_all(tail).await.unwrap();
            socket.write_all(record).await.unwrap();
        });

        let source_id = format!("tcp://{addr}");
        let (_trigger, signal) = shutdown_channel();
        let config = ConnectorConfig {
            read_timeout_ms: 150,
            ..ConnectorConfig::default()
        };
        let connector = StreamConnector::new(LandmarkFeed::new(), source_id.clone(), config, signal);
        let mut connection = LandmarkFeed::new().open(&source_id).await.unwrap();

        assert_eq!(
            connector.read_frame(&mut connection).await,
            Err(ReadFailure::Timeout(Duration::from_millis(150)))
        );
        let late = connector.read_frame(&mut connection).await.unwrap();
        assert_eq!(late.width, 640.0);
        assert!(late.landmarks.is_none());
        assert!(connector.read_frame(&mut connection).await.is_ok());

        server.await.unwrap();
        connection.close().await;
    }

    #[tokio::test]
    async fn refused_connection_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let result = LandmarkFeed::new().open(&format!("tcp://{addr}")).await;
        assert!(matches!(result, Err(OpenError::Unavailable(_))));
    }
}
