/// Integration tests for IPC communication
/// These tests verify that commands and responses serialize correctly
/// and can be sent over IPC boundaries
use common::{
    Command, Direction, PlaybackSnapshot, Response, ReviewError, SessionPhase, StreamDescriptor,
    StreamHealth, StreamId, StreamStatus,
};

#[test]
fn test_command_response_roundtrip() {
    let cmd = Command::SetSource {
        id: StreamId::new("NRMVC_front_right"),
        src: "https://cdn.example.com/NRMVC_front_right_master.m3u8".to_string(),
    };

    let json = serde_json::to_string(&cmd).unwrap();
    let deserialized: Command = serde_json::from_str(&json).unwrap();

    match deserialized {
        Command::SetSource { id, src } => {
            assert_eq!(id.as_str(), "NRMVC_front_right");
            assert_eq!(src, "https://cdn.example.com/NRMVC_front_right_master.m3u8");
        }
        _ => panic!("Wrong command type"),
    }
}

#[test]
fn test_transport_commands() {
    let commands = vec![
        Command::Play,
        Command::Pause,
        Command::TogglePlay,
        Command::SeekRelative { delta: -2.5 },
        Command::SeekAbsolute { position: 42.0 },
        Command::SeekFraction { fraction: 0.25 },
        Command::Skip {
            direction: Direction::Forward,
        },
        Command::FrameStep {
            direction: Direction::Backward,
        },
    ];

    for cmd in commands {
        let json = serde_json::to_string(&cmd).unwrap();
        let _deserialized: Command = serde_json::from_str(&json).unwrap();
    }
}

#[test]
fn test_progress_click_fields() {
    let cmd = Command::ProgressClick {
        offset: 120.0,
        width: 480.0,
    };

    let json = serde_json::to_string(&cmd).unwrap();
    let deserialized: Command = serde_json::from_str(&json).unwrap();

    match deserialized {
        Command::ProgressClick { offset, width } => {
            assert_eq!(offset, 120.0);
            assert_eq!(width, 480.0);
        }
        _ => panic!("Wrong command type"),
    }
}

#[test]
fn test_focus_commands() {
    let cmd = Command::Expand {
        id: StreamId::new("TCBSC_back"),
    };
    let json = serde_json::to_string(&cmd).unwrap();
    // ids travel as plain strings
    assert!(json.contains("\"id\":\"TCBSC_back\""));
    let deserialized: Command = serde_json::from_str(&json).unwrap();
    assert!(matches!(deserialized, Command::Expand { id } if id.as_str() == "TCBSC_back"));

    let json = serde_json::to_string(&Command::Collapse).unwrap();
    let _: Command = serde_json::from_str(&json).unwrap();

    let cmd: Command = serde_json::from_str(r#"{"ToggleExpand":{"id":"NLBSC_left"}}"#).unwrap();
    assert!(matches!(cmd, Command::ToggleExpand { id } if id.as_str() == "NLBSC_left"));
}

#[test]
fn test_query_commands() {
    let commands = vec![
        Command::Status,
        Command::ListStreams,
        Command::Ping,
        Command::Kill,
        Command::LoadSession {
            path: "/srv/sessions/ZRH_LCR_10024.json".to_string(),
        },
    ];

    for cmd in commands {
        let json = serde_json::to_string(&cmd).unwrap();
        let _deserialized: Command = serde_json::from_str(&json).unwrap();
    }
}

#[test]
fn test_response_types() {
    // Test Ok response
    let resp = Response::Ok;
    let json = serde_json::to_string(&resp).unwrap();
    let deserialized: Response = serde_json::from_str(&json).unwrap();
    assert!(matches!(deserialized, Response::Ok));

    // Test Pong response
    let resp = Response::Pong;
    let json = serde_json::to_string(&resp).unwrap();
    let deserialized: Response = serde_json::from_str(&json).unwrap();
    assert!(matches!(deserialized, Response::Pong));

    let resp = Response::Error(ReviewError::NotReady("2 of 11 streams loaded".to_string()));
    let json = serde_json::to_string(&resp).unwrap();
    let deserialized: Response = serde_json::from_str(&json).unwrap();
    assert!(matches!(deserialized, Response::Error(ReviewError::NotReady(_))));
}

#[test]
fn test_status_snapshot() {
    let snapshot = PlaybackSnapshot {
        phase: SessionPhase::ReadyPaused,
        current_position: 55.0,
        duration: 120.0,
        is_playing: false,
        expanded: Some(StreamId::new("TCBSC_back")),
        loaded_count: 2,
        total_to_load: 2,
        all_loaded: true,
        streams: vec![
            StreamStatus {
                id: StreamId::new("NCBSC_front"),
                title: "Front Camera".to_string(),
                src: "/data/front.mp4".to_string(),
                health: StreamHealth::Ready,
                last_position: Some(42.0),
            },
            StreamStatus {
                id: StreamId::new("TCBSC_back"),
                title: "Back Camera".to_string(),
                src: "/data/back.mp4".to_string(),
                health: StreamHealth::Failed("decoder missing".to_string()),
                last_position: None,
            },
        ],
    };

    let json = serde_json::to_string(&Response::Status(snapshot)).unwrap();
    let deserialized: Response = serde_json::from_str(&json).unwrap();

    match deserialized {
        Response::Status(status) => {
            assert_eq!(status.phase, SessionPhase::ReadyPaused);
            assert_eq!(status.current_position, 55.0);
            assert_eq!(status.expanded, Some(StreamId::new("TCBSC_back")));
            assert_eq!(status.streams[0].health, StreamHealth::Ready);
            assert_eq!(status.streams[0].last_position, Some(42.0));
            assert!(matches!(status.streams[1].health, StreamHealth::Failed(_)));
        }
        _ => panic!("Wrong response type"),
    }
}

#[test]
fn test_stream_list_response() {
    let streams = vec![
        StreamDescriptor::new("NCBSC_front", "Front Camera", "videos/NCBSC_front.m3u8"),
        StreamDescriptor::new("NLBSC_left", "Left Side", ""),
    ];

    let json = serde_json::to_string(&Response::Streams(streams)).unwrap();
    let deserialized: Response = serde_json::from_str(&json).unwrap();

    match deserialized {
        Response::Streams(streams) => {
            assert_eq!(streams.len(), 2);
            assert!(streams[0].has_source());
            assert!(!streams[1].has_source());
        }
        _ => panic!("Wrong response type"),
    }
}
