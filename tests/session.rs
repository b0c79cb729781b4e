//! Session dispatch integration tests
//!
//! Drives the inbound message pipeline the way the transport would,
//! without a network or audio hardware

use std::sync::{Arc, Mutex};

use lingua_live::audio::{EncodedChunk, PLAYBACK_SAMPLE_RATE, PlaybackTimeline, encode_frame};
use lingua_live::session::{Session, SessionPipeline, SessionState, Speaker, TranscriptFeed};
use lingua_live::transport::{ContentPart, ModelTurn, ServerContent, TranscriptionFragment};
use lingua_live::{Config, Error, default_scenarios};

fn keyless_config() -> Config {
    Config {
        api_key: None,
        model: "models/test".to_string(),
        voice: "Puck".to_string(),
        scenarios: default_scenarios(),
    }
}

fn pipeline() -> (SessionPipeline, Arc<Mutex<PlaybackTimeline>>, TranscriptFeed) {
    let timeline = Arc::new(Mutex::new(PlaybackTimeline::new()));
    let feed = TranscriptFeed::default();
    let pipeline = SessionPipeline::new(Arc::clone(&timeline), feed.clone());
    (pipeline, timeline, feed)
}

/// A message carrying one decodable audio chunk of `len` samples
fn audio_message(len: usize, value: f32) -> ServerContent {
    let chunk = encode_frame(&vec![value; len], PLAYBACK_SAMPLE_RATE);
    ServerContent {
        model_turn: Some(ModelTurn {
            parts: vec![ContentPart {
                inline_data: Some(chunk),
            }],
        }),
        ..Default::default()
    }
}

#[test]
fn test_audio_then_turn_complete_scenario() {
    let (mut pipeline, timeline, feed) = pipeline();

    // (a) audio chunk A, (b) audio chunk B
    pipeline.handle_content(audio_message(100, 0.3));
    pipeline.handle_content(audio_message(50, 0.3));

    // (c) accumulated model text, then turn complete
    pipeline.handle_content(ServerContent {
        output_transcription: Some(TranscriptionFragment {
            text: "Hello ".to_string(),
        }),
        ..Default::default()
    });
    pipeline.handle_content(ServerContent {
        output_transcription: Some(TranscriptionFragment {
            text: "there".to_string(),
        }),
        turn_complete: true,
        ..Default::default()
    });

    // A then B, back to back
    let tl = timeline.lock().unwrap();
    assert_eq!(tl.active_starts(), vec![0, 100]);
    assert_eq!(tl.cursor(), 150);
    drop(tl);

    // One committed model utterance
    let items = feed.snapshot();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].speaker, Speaker::Model);
    assert_eq!(items[0].text, "Hello there");
}

#[test]
fn test_interruption_stops_active_units() {
    let (mut pipeline, timeline, _feed) = pipeline();

    pipeline.handle_content(audio_message(24000, 0.5));
    pipeline.handle_content(audio_message(24000, 0.5));
    assert_eq!(timeline.lock().unwrap().active_len(), 2);

    pipeline.handle_content(ServerContent {
        interrupted: true,
        ..Default::default()
    });

    let tl = timeline.lock().unwrap();
    assert_eq!(tl.active_len(), 0);
    assert_eq!(tl.cursor(), tl.playhead());
}

#[test]
fn test_undecodable_chunk_is_dropped_without_side_effects() {
    let (mut pipeline, timeline, _feed) = pipeline();

    pipeline.handle_content(audio_message(100, 0.4));
    let cursor_before = timeline.lock().unwrap().cursor();

    // Garbage payload: dropped, logged, session continues
    pipeline.handle_content(ServerContent {
        model_turn: Some(ModelTurn {
            parts: vec![ContentPart {
                inline_data: Some(EncodedChunk {
                    mime_type: "audio/pcm;rate=24000".to_string(),
                    data: "!!!".to_string(),
                }),
            }],
        }),
        ..Default::default()
    });

    let tl = timeline.lock().unwrap();
    assert_eq!(tl.cursor(), cursor_before);
    assert_eq!(tl.active_len(), 1);
    drop(tl);

    // The next good chunk still lands back-to-back
    pipeline.handle_content(audio_message(10, 0.4));
    assert_eq!(timeline.lock().unwrap().active_starts(), vec![0, 100]);
}

#[test]
fn test_both_speakers_commit_user_first() {
    let (mut pipeline, _timeline, feed) = pipeline();

    pipeline.handle_content(ServerContent {
        output_transcription: Some(TranscriptionFragment {
            text: "What can I get you?".to_string(),
        }),
        input_transcription: Some(TranscriptionFragment {
            text: "A flat white, please.".to_string(),
        }),
        turn_complete: true,
        ..Default::default()
    });

    let items = feed.snapshot();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].speaker, Speaker::User);
    assert_eq!(items[0].text, "A flat white, please.");
    assert_eq!(items[1].speaker, Speaker::Model);
}

#[test]
fn test_turn_complete_without_text_commits_nothing() {
    let (mut pipeline, _timeline, feed) = pipeline();

    pipeline.handle_content(ServerContent {
        turn_complete: true,
        ..Default::default()
    });
    pipeline.handle_content(ServerContent {
        input_transcription: Some(TranscriptionFragment {
            text: "   ".to_string(),
        }),
        turn_complete: true,
        ..Default::default()
    });

    assert!(feed.is_empty());
}

#[test]
fn test_audio_and_flags_in_one_message() {
    let (mut pipeline, timeline, feed) = pipeline();

    // Fields are independent; one message may carry several at once.
    // Applied in order: audio scheduled, then text, then commit.
    let chunk = encode_frame(&[0.2; 64], PLAYBACK_SAMPLE_RATE);
    pipeline.handle_content(ServerContent {
        model_turn: Some(ModelTurn {
            parts: vec![ContentPart {
                inline_data: Some(chunk),
            }],
        }),
        output_transcription: Some(TranscriptionFragment {
            text: "Goodbye!".to_string(),
        }),
        turn_complete: true,
        ..Default::default()
    });

    assert_eq!(timeline.lock().unwrap().active_len(), 1);
    let items = feed.snapshot();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text, "Goodbye!");
}

#[test]
fn test_transcript_across_multiple_turns() {
    let (mut pipeline, _timeline, feed) = pipeline();

    for turn in ["first", "second", "third"] {
        pipeline.handle_content(ServerContent {
            input_transcription: Some(TranscriptionFragment {
                text: turn.to_string(),
            }),
            ..Default::default()
        });
        pipeline.handle_content(ServerContent {
            turn_complete: true,
            ..Default::default()
        });
    }

    let items = feed.snapshot();
    assert_eq!(items.len(), 3);
    let texts: Vec<_> = items.iter().map(|i| i.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second", "third"]);

    // Ids are unique across the whole list
    let mut ids: Vec<_> = items.iter().map(|i| i.id).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[tokio::test]
async fn test_stop_is_idempotent_and_safe_from_error() {
    let mut session = Session::new(keyless_config());
    assert_eq!(session.state(), SessionState::Disconnected);

    // Stopping a session that never started is a no-op, not an error
    session.stop().await;
    assert_eq!(session.state(), SessionState::Disconnected);

    // A failed start leaves the session in the error state
    let scenario = default_scenarios().remove(0);
    let err = session.start(&scenario).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(session.state(), SessionState::Error);

    // stop() is safe from the error state, twice in a row
    session.stop().await;
    assert_eq!(session.state(), SessionState::Disconnected);
    session.stop().await;
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_run_without_start_is_rejected() {
    let mut session = Session::new(keyless_config());
    let (_tx, mut shutdown) = tokio::sync::mpsc::channel::<()>(1);

    let err = session.run_until(&mut shutdown).await.unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)));
}

#[test]
fn test_mute_is_inert_while_disconnected() {
    let session = Session::new(keyless_config());
    assert!(!session.is_muted());
    assert!(!session.toggle_mute());
    assert!(session.input_level_feed().is_none());
    assert!(session.output_level_feed().is_none());
}

#[test]
fn test_interrupt_then_new_turn_schedules_fresh() {
    let (mut pipeline, timeline, _feed) = pipeline();

    pipeline.handle_content(audio_message(1000, 0.5));

    // Simulate the device rendering some of it
    {
        let mut tl = timeline.lock().unwrap();
        let mut out = vec![0.0; 300];
        tl.render(&mut out);
    }

    pipeline.handle_content(ServerContent {
        interrupted: true,
        ..Default::default()
    });
    pipeline.handle_content(audio_message(100, 0.5));

    let tl = timeline.lock().unwrap();
    let starts = tl.active_starts();
    assert_eq!(starts.len(), 1);
    assert!(starts[0] >= 300);
}
