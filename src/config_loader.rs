use crate::error::ConfigError;
use crate::voice::SilentSchedule;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_VOICE: &str = "af_sarah";
const DEFAULT_SILENT_VOICE: &str = "af_nicole";
const DEFAULT_LANG: &str = "en-us";
const DEFAULT_INTERRUPT_COMMAND: &str = "__STOP__";
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;
const DEFAULT_SAMPLE_RATE: u32 = 24_000;
const DEFAULT_SYNTHESIS_TIMEOUT_SECS: u64 = 30;

/// Which synthesis engine to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Spawn the `koko` command-line synthesizer per sentence.
    Koko,
    /// In-process Kokoro via sherpa-onnx (requires the `sherpa` feature).
    Sherpa,
}

/// The `[kokoro]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct KokoroSettings {
    pub voice: String,
    pub speed: f32,
    pub lang: String,
    pub silent_mode: bool,
    #[serde(default)]
    pub silent_time_range: Vec<String>,
    pub silent_voice: String,
    pub silent_mode_speed: f32,
    pub backend: BackendKind,
    pub koko_binary: String,
    pub synthesis_timeout: u64, // seconds
}

/// The `[service]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceSettings {
    pub interrupt_command: String,
    pub idle_timeout: u64, // seconds
    pub exit_on_idle: bool,
    #[serde(default)]
    pub exit_idle_timeout: Option<u64>, // seconds, falls back to idle_timeout
    pub sample_rate: u32,
    #[serde(default)]
    pub output_device: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub kokoro: KokoroSettings,
    pub service: ServiceSettings,
}

impl Default for KokoroSettings {
    fn default() -> Self {
        Self {
            voice: DEFAULT_VOICE.to_string(),
            speed: 1.0,
            lang: DEFAULT_LANG.to_string(),
            silent_mode: false,
            silent_time_range: Vec::new(),
            silent_voice: DEFAULT_SILENT_VOICE.to_string(),
            silent_mode_speed: 0.8,
            backend: BackendKind::Koko,
            koko_binary: "koko".to_string(),
            synthesis_timeout: DEFAULT_SYNTHESIS_TIMEOUT_SECS,
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            interrupt_command: DEFAULT_INTERRUPT_COMMAND.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT_SECS,
            exit_on_idle: false,
            exit_idle_timeout: None,
            sample_rate: DEFAULT_SAMPLE_RATE,
            output_device: None,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            kokoro: KokoroSettings::default(),
            service: ServiceSettings::default(),
        }
    }
}

impl ServiceSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }

    pub fn exit_timeout(&self) -> Duration {
        Duration::from_secs(self.exit_idle_timeout.unwrap_or(self.idle_timeout))
    }
}

impl Settings {
    /// Loads the TOML file at `path`, layered over the defaults and under
    /// `TTS_*` environment overrides (e.g. `TTS_SERVICE__IDLE_TIMEOUT=30`).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let builder = Self::defaults()?
            .add_source(File::from(path).format(FileFormat::Toml).required(true))
            .add_source(
                Environment::with_prefix("TTS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from TOML text without touching the filesystem or the
    /// environment.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let settings: Settings = Self::defaults()?
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn defaults() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        let d = Settings::default();
        let builder = Config::builder()
            .set_default("kokoro.voice", d.kokoro.voice)?
            .set_default("kokoro.speed", f64::from(d.kokoro.speed))?
            .set_default("kokoro.lang", d.kokoro.lang)?
            .set_default("kokoro.silent_mode", d.kokoro.silent_mode)?
            .set_default("kokoro.silent_voice", d.kokoro.silent_voice)?
            .set_default("kokoro.silent_mode_speed", f64::from(d.kokoro.silent_mode_speed))?
            .set_default("kokoro.backend", "koko")?
            .set_default("kokoro.koko_binary", d.kokoro.koko_binary)?
            .set_default("kokoro.synthesis_timeout", d.kokoro.synthesis_timeout)?
            .set_default("service.interrupt_command", d.service.interrupt_command)?
            .set_default("service.idle_timeout", d.service.idle_timeout)?
            .set_default("service.exit_on_idle", d.service.exit_on_idle)?
            .set_default("service.sample_rate", u64::from(d.service.sample_rate))?;
        Ok(builder)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, speed) in [
            ("kokoro.speed", self.kokoro.speed),
            ("kokoro.silent_mode_speed", self.kokoro.silent_mode_speed),
        ] {
            if !(speed > 0.0 && speed <= 4.0) {
                return Err(ConfigError::Invalid(format!(
                    "{key} = {speed}. Must be in (0, 4]"
                )));
            }
        }
        if self.kokoro.voice.trim().is_empty() {
            return Err(ConfigError::Invalid("kokoro.voice must not be empty".into()));
        }
        if self.kokoro.silent_mode && self.kokoro.silent_voice.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "kokoro.silent_voice must not be empty when silent_mode is on".into(),
            ));
        }
        if self.service.interrupt_command.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "service.interrupt_command must not be empty".into(),
            ));
        }
        if self.service.idle_timeout == 0 {
            return Err(ConfigError::Invalid(
                "service.idle_timeout must be greater than 0".into(),
            ));
        }
        if self.service.sample_rate == 0 {
            return Err(ConfigError::Invalid(
                "service.sample_rate must be greater than 0".into(),
            ));
        }
        // Surfaces malformed HH:MM entries at startup rather than mid-utterance.
        SilentSchedule::from_settings(&self.kokoro)?;
        Ok(())
    }
}

/// Expands a leading `~` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None if path == "~" => dirs::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}

/// `$HOME/.config/tts-service/config.toml`
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config/tts-service/config.toml")
}

/// Location of the Kokoro model and voice embeddings.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub model: PathBuf,
    pub voices: PathBuf,
}

impl ModelPaths {
    pub fn resolve(model: Option<&str>, voices: Option<&str>) -> Self {
        let models_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tts-service/models");
        Self {
            model: model
                .map(expand_tilde)
                .unwrap_or_else(|| models_dir.join("kokoro-v1.0.onnx")),
            voices: voices
                .map(expand_tilde)
                .unwrap_or_else(|| models_dir.join("voices-v1.0.bin")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let settings = Settings::from_toml_str("[kokoro]\nvoice = \"am_adam\"\n").unwrap();
        assert_eq!(settings.kokoro.voice, "am_adam");
        assert_eq!(settings.kokoro.speed, 1.0);
        assert_eq!(settings.kokoro.backend, BackendKind::Koko);
        assert_eq!(settings.service.idle_timeout, 60);
        assert_eq!(settings.service.sample_rate, 24_000);
        assert!(!settings.service.exit_on_idle);
        assert_eq!(settings.service.exit_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_full_file() {
        let text = r#"
[kokoro]
voice = "af_bella"
speed = 1.2
silent_mode = true
silent_time_range = ["22:00", "07:00"]
silent_voice = "af_sky"
silent_mode_speed = 0.9

[service]
interrupt_command = "STOP NOW"
idle_timeout = 30
exit_on_idle = true
exit_idle_timeout = 300
"#;
        let settings = Settings::from_toml_str(text).unwrap();
        assert_eq!(settings.kokoro.silent_time_range, vec!["22:00", "07:00"]);
        assert_eq!(settings.service.interrupt_command, "STOP NOW");
        assert_eq!(settings.service.idle_timeout(), Duration::from_secs(30));
        assert_eq!(settings.service.exit_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_speed_rejected() {
        let err = Settings::from_toml_str("[kokoro]\nspeed = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_bad_silent_range_rejected() {
        let text = "[kokoro]\nsilent_mode = true\nsilent_time_range = [\"25:00\", \"07:00\"]\n";
        let err = Settings::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        assert!(matches!(
            Settings::load(&path),
            Err(ConfigError::NotFound(p)) if p == path
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[service]\nidle_timeout = 5").unwrap();
        let settings = Settings::load(file.path()).unwrap();
        assert_eq!(settings.service.idle_timeout, 5);
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/etc/x"), PathBuf::from("/etc/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/a.toml"), home.join("a.toml"));
        }
    }
}
