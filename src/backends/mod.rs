pub mod koko;
#[cfg(feature = "sherpa")]
pub mod sherpa;

use crate::config_loader::{BackendKind, KokoroSettings, ModelPaths};
use crate::error::TtsError;

/// Mono PCM produced for one sentence.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesized {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Trait that every loaded speech synthesis engine implements.
/// An instance holds whatever the engine needs resident (model weights,
/// resolved binaries) and is dropped to free it.
pub trait SpeechBackend: Send {
    /// Returns the unique ID of the backend (e.g., "koko")
    fn id(&self) -> &'static str;

    fn synthesize(
        &mut self,
        text: &str,
        voice: &str,
        speed: f32,
        lang: &str,
    ) -> Result<Synthesized, TtsError>;
}

/// Builds a [`SpeechBackend`]. Loading is the expensive step (model load),
/// so callers hold on to the result until it has been idle for a while.
pub trait BackendLoader: Send + Sync {
    fn load(&self) -> Result<Box<dyn SpeechBackend>, TtsError>;
}

/// Picks the loader named by `kokoro.backend`.
pub fn loader_for(
    settings: &KokoroSettings,
    paths: &ModelPaths,
) -> Result<Box<dyn BackendLoader>, TtsError> {
    match settings.backend {
        BackendKind::Koko => Ok(Box::new(koko::KokoLoader::new(settings, paths))),
        #[cfg(feature = "sherpa")]
        BackendKind::Sherpa => Ok(Box::new(sherpa::SherpaLoader::new(paths))),
        #[cfg(not(feature = "sherpa"))]
        BackendKind::Sherpa => Err(TtsError::Load(
            "the sherpa backend requires building with `--features sherpa`".into(),
        )),
    }
}

/// Averages interleaved frames down to a single channel.
pub(crate) fn downmix(samples: Vec<f32>, channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples;
    }
    let channels = usize::from(channels);
    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        assert_eq!(downmix(vec![0.25, 0.75, -1.0, 1.0], 2), vec![0.5, 0.0]);
    }

    #[test]
    fn test_downmix_mono_passthrough() {
        assert_eq!(downmix(vec![0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[cfg(not(feature = "sherpa"))]
    #[test]
    fn test_sherpa_unavailable_without_feature() {
        let settings = KokoroSettings {
            backend: BackendKind::Sherpa,
            ..KokoroSettings::default()
        };
        let paths = ModelPaths::resolve(Some("/m.onnx"), Some("/v.bin"));
        assert!(matches!(loader_for(&settings, &paths), Err(TtsError::Load(_))));
    }
}
