//! Wire types for the realtime speech protocol
//!
//! One outbound message carries one encoded audio chunk; inbound messages
//! may carry any subset of audio payload, interruption flag, transcription
//! fragments, and turn-complete flag. Unknown fields are ignored so the
//! client survives protocol additions.

use serde::{Deserialize, Serialize};

use crate::audio::EncodedChunk;

/// Top-level envelope for the session setup message
#[derive(Debug, Serialize)]
pub struct SetupEnvelope {
    pub setup: Setup,
}

/// Session configuration sent once, immediately after the socket opens
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub input_audio_transcription: TranscriptionConfig,
    pub output_audio_transcription: TranscriptionConfig,
}

impl Setup {
    /// Build a setup requesting audio responses in the given voice, with
    /// transcription enabled for both directions
    #[must_use]
    pub fn new(model: &str, voice: &str, system_instruction: &str) -> Self {
        Self {
            model: model.to_string(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: voice.to_string(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: system_instruction.to_string(),
                }],
            },
            input_audio_transcription: TranscriptionConfig {},
            output_audio_transcription: TranscriptionConfig {},
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Empty marker object; presence alone requests transcription
#[derive(Debug, Default, Serialize)]
pub struct TranscriptionConfig {}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Top-level envelope for streaming captured audio
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputEnvelope {
    pub realtime_input: RealtimeInput,
}

impl RealtimeInputEnvelope {
    /// Wrap one encoded capture frame for sending
    #[must_use]
    pub fn audio(chunk: EncodedChunk) -> Self {
        Self {
            realtime_input: RealtimeInput {
                media_chunks: vec![chunk],
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<EncodedChunk>,
}

/// One inbound message from the model
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<SetupComplete>,
    pub server_content: Option<ServerContent>,
}

/// Confirmation that the session setup was accepted
#[derive(Debug, Default, Deserialize)]
pub struct SetupComplete {}

/// Content fields of an inbound message; any subset may be present
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub interrupted: bool,
    pub input_transcription: Option<TranscriptionFragment>,
    pub output_transcription: Option<TranscriptionFragment>,
    pub turn_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelTurn {
    pub parts: Vec<ContentPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentPart {
    pub inline_data: Option<EncodedChunk>,
}

/// Incremental transcription text for one direction
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TranscriptionFragment {
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_serializes_camel_case() {
        let setup = Setup::new("models/test-model", "Puck", "You are a tutor.");
        let json = serde_json::to_value(SetupEnvelope { setup }).unwrap();

        assert_eq!(json["setup"]["model"], "models/test-model");
        assert_eq!(
            json["setup"]["generationConfig"]["responseModalities"][0],
            "AUDIO"
        );
        assert_eq!(
            json["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]
                ["prebuiltVoiceConfig"]["voiceName"],
            "Puck"
        );
        assert_eq!(
            json["setup"]["systemInstruction"]["parts"][0]["text"],
            "You are a tutor."
        );
        assert!(json["setup"]["inputAudioTranscription"].is_object());
        assert!(json["setup"]["outputAudioTranscription"].is_object());
    }

    #[test]
    fn test_realtime_input_serializes_media_chunk() {
        let envelope = RealtimeInputEnvelope::audio(EncodedChunk {
            mime_type: "audio/pcm;rate=16000".to_string(),
            data: "AAAA".to_string(),
        });
        let json = serde_json::to_value(envelope).unwrap();

        let chunk = &json["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(chunk["data"], "AAAA");
    }

    #[test]
    fn test_server_message_parses_full_content() {
        let raw = r#"{
            "serverContent": {
                "modelTurn": {
                    "parts": [{"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}}]
                },
                "interrupted": true,
                "inputTranscription": {"text": "hi"},
                "outputTranscription": {"text": "hello"},
                "turnComplete": true
            }
        }"#;

        let msg: ServerMessage = serde_json::from_str(raw).unwrap();
        let content = msg.server_content.unwrap();
        assert!(content.interrupted);
        assert!(content.turn_complete);
        assert_eq!(content.input_transcription.unwrap().text, "hi");
        assert_eq!(content.output_transcription.unwrap().text, "hello");
        let part = &content.model_turn.unwrap().parts[0];
        assert_eq!(
            part.inline_data.as_ref().unwrap().mime_type,
            "audio/pcm;rate=24000"
        );
    }

    #[test]
    fn test_server_message_tolerates_sparse_and_unknown_fields() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"setupComplete": {}, "usageMetadata": {"tokens": 3}}"#)
                .unwrap();
        assert!(msg.setup_complete.is_some());
        assert!(msg.server_content.is_none());

        let msg: ServerMessage =
            serde_json::from_str(r#"{"serverContent": {"turnComplete": true}}"#).unwrap();
        let content = msg.server_content.unwrap();
        assert!(content.turn_complete);
        assert!(!content.interrupted);
        assert!(content.model_turn.is_none());
    }
}
