use serde_json::{json, Value};

use solo_live::codec::EncodedBlob;
use solo_live::kernel::event::SessionEvent;
use solo_live::services::live::protocol::{ClientMessage, ServerMessage, Setup};

#[test]
fn test_setup_wire_shape() {
    let msg = ClientMessage::Setup(Setup::new("models/m", "Zephyr", "Be brief.", true));
    let value = serde_json::to_value(&msg).unwrap();

    assert_eq!(
        value,
        json!({
            "setup": {
                "model": "models/m",
                "generationConfig": {
                    "responseModalities": ["AUDIO"],
                    "speechConfig": {
                        "voiceConfig": { "prebuiltVoiceConfig": { "voiceName": "Zephyr" } }
                    }
                },
                "systemInstruction": { "parts": [{ "text": "Be brief." }] },
                "outputAudioTranscription": {}
            }
        })
    );
}

#[test]
fn test_setup_without_transcription() {
    let msg = ClientMessage::Setup(Setup::new("models/m", "Zephyr", "x", false));
    let value = serde_json::to_value(&msg).unwrap();
    assert!(value["setup"].get("outputAudioTranscription").is_none());
}

#[test]
fn test_media_wire_shape() {
    let blob = EncodedBlob {
        data: "AAA=".into(),
        mime_type: "audio/pcm;rate=16000".into(),
    };
    let value = serde_json::to_value(ClientMessage::media(blob)).unwrap();
    assert_eq!(
        value,
        json!({
            "realtimeInput": {
                "mediaChunks": [{ "data": "AAA=", "mimeType": "audio/pcm;rate=16000" }]
            }
        })
    );
}

#[test]
fn test_setup_complete() {
    let msg: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
    assert!(msg.is_setup_complete());
    assert!(msg.into_events().is_empty());
}

#[test]
fn test_event_order_within_one_message() {
    let raw: Value = json!({
        "serverContent": {
            "modelTurn": { "parts": [
                { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAA=" } },
                { "text": "ignored" },
                { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AQE=" } }
            ]},
            "interrupted": true,
            "turnComplete": true,
            "outputTranscription": { "text": "hi" }
        }
    });
    let msg: ServerMessage = serde_json::from_value(raw).unwrap();
    let events = msg.into_events();

    assert_eq!(events.len(), 5);
    assert_eq!(events[0], SessionEvent::Transcription("hi".into()));
    assert_eq!(events[1], SessionEvent::Interrupted);
    assert!(matches!(&events[2], SessionEvent::AudioChunk(b) if b.data == "AAA="));
    assert!(matches!(&events[3], SessionEvent::AudioChunk(b) if b.data == "AQE="));
    assert_eq!(events[4], SessionEvent::TurnComplete);
}

#[test]
fn test_unknown_fields_and_empty_transcription() {
    let raw = r#"{
        "serverContent": { "outputTranscription": { "text": "" }, "generationComplete": true },
        "usageMetadata": { "totalTokenCount": 12 }
    }"#;
    let msg: ServerMessage = serde_json::from_str(raw).unwrap();
    assert!(msg.into_events().is_empty());
}

#[test]
fn test_non_audio_inline_data_ignored() {
    let raw = json!({
        "serverContent": { "modelTurn": { "parts": [
            { "inlineData": { "mimeType": "image/png", "data": "AAA=" } }
        ]}}
    });
    let msg: ServerMessage = serde_json::from_value(raw).unwrap();
    assert!(msg.into_events().is_empty());
}

#[test]
fn test_go_away() {
    let msg: ServerMessage = serde_json::from_str(r#"{"goAway":{"timeLeft":"10s"}}"#).unwrap();
    assert_eq!(msg.go_away.unwrap().time_left.as_deref(), Some("10s"));
}
