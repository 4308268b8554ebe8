//! In-process Kokoro synthesis through `sherpa-rs`.
//!
//! The model directory is the one containing the configured model file; it
//! must also hold `tokens.txt` and the `espeak-ng-data/` lexicon directory.

use super::{BackendLoader, SpeechBackend, Synthesized};
use crate::config_loader::ModelPaths;
use crate::error::TtsError;
use sherpa_rs::tts::{KokoroTts, KokoroTtsConfig};
use std::path::Path;

pub struct SherpaLoader {
    paths: ModelPaths,
}

impl SherpaLoader {
    pub fn new(paths: &ModelPaths) -> Self {
        Self {
            paths: paths.clone(),
        }
    }
}

impl BackendLoader for SherpaLoader {
    fn load(&self) -> Result<Box<dyn SpeechBackend>, TtsError> {
        let model_dir = self
            .paths
            .model
            .parent()
            .ok_or_else(|| TtsError::ModelNotFound(self.paths.model.clone()))?;
        let tokens = model_dir.join("tokens.txt");
        let data_dir = model_dir.join("espeak-ng-data");

        for path in [&self.paths.model, &self.paths.voices, &tokens] {
            if !path.exists() {
                return Err(TtsError::ModelNotFound(path.clone()));
            }
        }

        tracing::info!(dir = %model_dir.display(), "Loading Kokoro model (sherpa-onnx)");

        let config = KokoroTtsConfig {
            model: path_to_string(&self.paths.model)?,
            voices: path_to_string(&self.paths.voices)?,
            tokens: path_to_string(&tokens)?,
            data_dir: path_to_string(&data_dir)?,
            ..Default::default()
        };

        Ok(Box::new(SherpaBackend {
            engine: KokoroTts::new(config),
        }))
    }
}

pub struct SherpaBackend {
    engine: KokoroTts,
}

impl SpeechBackend for SherpaBackend {
    fn id(&self) -> &'static str {
        "sherpa"
    }

    fn synthesize(
        &mut self,
        text: &str,
        voice: &str,
        speed: f32,
        lang: &str,
    ) -> Result<Synthesized, TtsError> {
        // The lexicon bundled with the model decides pronunciation.
        tracing::trace!(lang, "sherpa backend ignores the language hint");

        let audio = self
            .engine
            .create(text, speaker_id(voice), speed)
            .map_err(|e| TtsError::Synthesis(e.to_string()))?;

        Ok(Synthesized {
            samples: audio.samples,
            sample_rate: audio.sample_rate,
        })
    }
}

/// Speaker index inside `voices.bin`. Numeric voice names are used as-is.
fn speaker_id(voice: &str) -> i32 {
    if let Ok(id) = voice.parse() {
        return id;
    }
    match voice {
        "af" => 0,
        "af_bella" => 1,
        "af_nicole" => 2,
        "af_sarah" => 3,
        "af_sky" => 4,
        "am_adam" => 5,
        "am_michael" => 6,
        "bf_emma" => 7,
        "bf_isabella" => 8,
        "bm_george" => 9,
        "bm_lewis" => 10,
        _ => {
            tracing::warn!(voice, "Unknown Kokoro voice, using speaker 0");
            0
        }
    }
}

fn path_to_string(path: &Path) -> Result<String, TtsError> {
    path.to_str()
        .map(ToString::to_string)
        .ok_or_else(|| TtsError::Load(format!("Invalid path: {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_ids() {
        assert_eq!(speaker_id("af_sarah"), 3);
        assert_eq!(speaker_id("12"), 12);
        assert_eq!(speaker_id("zz_unknown"), 0);
    }
}
