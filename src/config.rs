//! Configuration for the lingua-live client
//!
//! Defaults cover everything except the API key: a built-in scenario
//! catalog, the realtime model, and the voice. An optional TOML file in
//! the platform config directory can override any of it.

use std::fmt;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use secrecy::SecretString;
use serde::Deserialize;

use crate::{Error, Result};

/// Default realtime speech model
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-09-2025";

/// Default voice identity for synthesized responses
pub const DEFAULT_VOICE: &str = "Puck";

/// Environment variable holding the API key
const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Client configuration
#[derive(Debug)]
pub struct Config {
    /// API key for the realtime service; required to start a session
    pub api_key: Option<SecretString>,

    /// Realtime model identifier
    pub model: String,

    /// Voice identity requested for audio responses
    pub voice: String,

    /// Conversation scenarios offered to the user
    pub scenarios: Vec<Scenario>,
}

/// One selectable conversation scenario
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    /// Persona prompt sent as the session's system instruction
    pub system_instruction: String,
}

/// Rough difficulty grading shown in the picker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Beginner,
    Intermediate,
    Advanced,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        };
        f.write_str(name)
    }
}

/// On-disk layout of the optional config file
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    api_key: Option<String>,
    model: Option<String>,
    voice: Option<String>,
    scenarios: Vec<Scenario>,
}

impl Config {
    /// Load configuration from the given file, or the default location.
    ///
    /// A missing file is fine; defaults apply. The API key is taken from
    /// `GEMINI_API_KEY` when set, falling back to the file.
    ///
    /// # Errors
    ///
    /// Returns error if an existing config file cannot be read or parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map_or_else(default_config_path, Path::to_path_buf);

        let file = if path.is_file() {
            let raw = std::fs::read_to_string(&path)?;
            let parsed: ConfigFile = toml::from_str(&raw)?;
            tracing::debug!(path = %path.display(), "config file loaded");
            parsed
        } else {
            ConfigFile::default()
        };

        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.is_empty())
            .or(file.api_key)
            .map(SecretString::from);

        let scenarios = if file.scenarios.is_empty() {
            default_scenarios()
        } else {
            file.scenarios
        };

        Ok(Self {
            api_key,
            model: file.model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            voice: file.voice.unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            scenarios,
        })
    }

    /// Look up a scenario by id
    #[must_use]
    pub fn scenario(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.id == id)
    }

    /// The API key, or a config error telling the user how to set one
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no key is configured
    pub fn require_api_key(&self) -> Result<&SecretString> {
        self.api_key
            .as_ref()
            .ok_or_else(|| Error::Config(format!("no API key configured; set {API_KEY_ENV}")))
    }
}

/// Default config file location under the platform config directory
fn default_config_path() -> PathBuf {
    ProjectDirs::from("dev", "lingua", "lingua-live").map_or_else(
        || PathBuf::from("lingua.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Built-in conversation scenarios
#[must_use]
pub fn default_scenarios() -> Vec<Scenario> {
    vec![
        Scenario {
            id: "coffee-shop".to_string(),
            title: "Ordering Coffee".to_string(),
            description: "Practice ordering your favorite drink at a busy cafe.".to_string(),
            difficulty: Difficulty::Beginner,
            system_instruction: "You are a barista at a coffee shop called \"Bean There\". \
                The user is a customer and your goal is to take their order. Be polite and \
                helpful. If the user makes a grammar mistake, gently repeat their sentence \
                correctly before continuing. Keep the conversation going by asking about \
                size, milk preferences, or pastries. Start by saying: \"Hi there! Welcome \
                to Bean There. What can I get started for you today?\""
                .to_string(),
        },
        Scenario {
            id: "job-interview".to_string(),
            title: "Job Interview".to_string(),
            description: "Simulate a professional job interview for a software role."
                .to_string(),
            difficulty: Difficulty::Advanced,
            system_instruction: "You are a hiring manager conducting a job interview. The \
                user is the candidate. Ask common interview questions about their \
                experience, strengths, and weaknesses. Maintain a professional tone. If \
                the user struggles to find a word, suggest one. Start by saying: \"Good \
                morning. Thank you for coming in today. Can you tell me a little bit \
                about yourself?\""
                .to_string(),
        },
        Scenario {
            id: "casual-chat".to_string(),
            title: "Daily Conversation".to_string(),
            description: "A casual chat about hobbies, weather, and life.".to_string(),
            difficulty: Difficulty::Intermediate,
            system_instruction: "You are a friendly English tutor having a casual chat \
                with a student. Ask them about their day, their hobbies, or the weather. \
                Your goal is to make them talk as much as possible. Correct only major \
                errors that affect understanding. Start by saying: \"Hey! How is your day \
                going so far?\""
                .to_string(),
        },
        Scenario {
            id: "travel-directions".to_string(),
            title: "Asking Directions".to_string(),
            description: "You are lost in a new city. Ask a local for help.".to_string(),
            difficulty: Difficulty::Beginner,
            system_instruction: "You are a helpful local in London. The user is a tourist \
                asking for directions. Give clear instructions using natural phrases like \
                \"turn left at the lights\" or \"it's just around the corner\". If the \
                user's pronunciation is unclear, politely ask them to repeat. Start by \
                saying: \"Hello! You look a bit lost. Can I help you find something?\""
                .to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_scenarios_are_well_formed() {
        let scenarios = default_scenarios();
        assert_eq!(scenarios.len(), 4);

        for scenario in &scenarios {
            assert!(!scenario.id.is_empty());
            assert!(!scenario.title.is_empty());
            assert!(!scenario.system_instruction.trim().is_empty());
        }

        // Ids are unique
        let mut ids: Vec<_> = scenarios.iter().map(|s| s.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), scenarios.len());
    }

    #[test]
    fn test_config_file_parses() {
        let raw = r#"
            model = "models/custom"
            voice = "Kore"

            [[scenarios]]
            id = "restaurant"
            title = "At the Restaurant"
            description = "Order a three-course dinner."
            difficulty = "intermediate"
            system_instruction = "You are a waiter."
        "#;

        let parsed: ConfigFile = toml::from_str(raw).unwrap();
        assert_eq!(parsed.model.as_deref(), Some("models/custom"));
        assert_eq!(parsed.voice.as_deref(), Some("Kore"));
        assert_eq!(parsed.scenarios.len(), 1);
        assert_eq!(parsed.scenarios[0].difficulty, Difficulty::Intermediate);
    }

    #[test]
    fn test_scenario_lookup() {
        let config = Config {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            scenarios: default_scenarios(),
        };

        assert!(config.scenario("coffee-shop").is_some());
        assert!(config.scenario("nope").is_none());
        assert!(config.require_api_key().is_err());
    }
}
