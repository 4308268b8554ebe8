use crate::backends::{BackendLoader, SpeechBackend};
use crate::error::TtsError;
use crate::queue::AudioClip;
use crate::voice::VoiceSelection;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Instant;

/// Owns the synthesis engine slot. The engine is loaded on the first
/// [`EngineHandle::synthesize`] after construction or after a release, and
/// load, synthesize and release are serialized by one lock.
pub struct EngineHandle {
    loader: Box<dyn BackendLoader>,
    slot: Mutex<Option<Box<dyn SpeechBackend>>>,
    output_rate: u32,
}

impl EngineHandle {
    pub fn new(loader: Box<dyn BackendLoader>, output_rate: u32) -> Self {
        Self {
            loader,
            slot: Mutex::new(None),
            output_rate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Box<dyn SpeechBackend>>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn synthesize(
        &self,
        sentence: &str,
        voice: &VoiceSelection,
        lang: &str,
    ) -> Result<AudioClip, TtsError> {
        let mut slot = self.lock();
        let backend = match slot.take() {
            Some(backend) => backend,
            None => self.load()?,
        };
        let backend = slot.insert(backend);

        let audio = backend.synthesize(sentence, &voice.voice, voice.speed, lang)?;
        if audio.sample_rate != self.output_rate {
            // Played at the output rate anyway; no resampling happens here.
            tracing::warn!(
                generated = audio.sample_rate,
                output = self.output_rate,
                "Sample rate mismatch"
            );
        }

        Ok(AudioClip {
            samples: audio.samples,
            sample_rate: audio.sample_rate,
            source_sentence: sentence.to_string(),
        })
    }

    fn load(&self) -> Result<Box<dyn SpeechBackend>, TtsError> {
        tracing::info!("Loading synthesis engine");
        let started = Instant::now();
        let backend = self.loader.load()?;
        tracing::info!(
            backend = backend.id(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Synthesis engine loaded"
        );
        Ok(backend)
    }

    /// Drops the loaded engine, waiting for an in-flight synthesis to finish.
    /// Returns whether an engine was loaded.
    pub fn release(&self) -> bool {
        Self::release_slot(&mut self.lock())
    }

    /// Like [`EngineHandle::release`] but gives up immediately if the engine
    /// is busy.
    pub fn try_release(&self) -> bool {
        match self.slot.try_lock() {
            Ok(mut slot) => Self::release_slot(&mut slot),
            Err(TryLockError::Poisoned(poisoned)) => Self::release_slot(&mut poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => false,
        }
    }

    fn release_slot(slot: &mut Option<Box<dyn SpeechBackend>>) -> bool {
        match slot.take() {
            Some(backend) => {
                let id = backend.id();
                drop(backend);
                tracing::info!(backend = id, "Released synthesis engine");
                true
            }
            None => false,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::Synthesized;
    use mockall::predicate::eq;

    mockall::mock! {
        pub Backend {}
        impl SpeechBackend for Backend {
            fn id(&self) -> &'static str;
            fn synthesize(
                &mut self,
                text: &str,
                voice: &str,
                speed: f32,
                lang: &str,
            ) -> Result<Synthesized, TtsError>;
        }
    }

    mockall::mock! {
        pub Loader {}
        impl BackendLoader for Loader {
            fn load(&self) -> Result<Box<dyn SpeechBackend>, TtsError>;
        }
    }

    fn echo_backend(rate: u32) -> MockBackend {
        let mut backend = MockBackend::new();
        backend.expect_id().return_const("mock");
        backend
            .expect_synthesize()
            .returning(move |text, _, _, _| {
                Ok(Synthesized {
                    samples: vec![0.25; text.len()],
                    sample_rate: rate,
                })
            });
        backend
    }

    fn voice() -> VoiceSelection {
        VoiceSelection {
            voice: "af_sarah".into(),
            speed: 1.0,
        }
    }

    #[test]
    fn test_lazy_load_happens_once() {
        let mut loader = MockLoader::new();
        loader
            .expect_load()
            .times(1)
            .returning(|| Ok(Box::new(echo_backend(24_000))));
        let engine = EngineHandle::new(Box::new(loader), 24_000);

        assert!(!engine.is_loaded());
        let clip = engine.synthesize("Hi.", &voice(), "en-us").unwrap();
        assert_eq!(clip.source_sentence, "Hi.");
        assert_eq!(clip.samples.len(), 3);
        engine.synthesize("Again.", &voice(), "en-us").unwrap();
        assert!(engine.is_loaded());
    }

    #[test]
    fn test_release_then_reload() {
        let mut loader = MockLoader::new();
        loader
            .expect_load()
            .times(2)
            .returning(|| Ok(Box::new(echo_backend(24_000))));
        let engine = EngineHandle::new(Box::new(loader), 24_000);

        engine.synthesize("One.", &voice(), "en-us").unwrap();
        assert!(engine.release());
        assert!(!engine.is_loaded());
        assert!(!engine.release());

        let clip = engine.synthesize("Two.", &voice(), "en-us").unwrap();
        assert_eq!(clip.source_sentence, "Two.");
        assert!(engine.try_release());
    }

    #[test]
    fn test_passes_voice_speed_and_lang() {
        let mut backend = MockBackend::new();
        backend.expect_id().return_const("mock");
        backend
            .expect_synthesize()
            .with(eq("Quiet."), eq("af_nicole"), eq(0.7_f32), eq("en-gb"))
            .times(1)
            .returning(|_, _, _, _| {
                Ok(Synthesized {
                    samples: vec![0.0],
                    sample_rate: 24_000,
                })
            });
        let mut loader = MockLoader::new();
        loader.expect_load().return_once(move || Ok(Box::new(backend)));
        let engine = EngineHandle::new(Box::new(loader), 24_000);

        let quiet = VoiceSelection {
            voice: "af_nicole".into(),
            speed: 0.7,
        };
        engine.synthesize("Quiet.", &quiet, "en-gb").unwrap();
    }

    #[test]
    fn test_synthesis_error_keeps_engine_loaded() {
        let mut backend = MockBackend::new();
        backend.expect_id().return_const("mock");
        backend
            .expect_synthesize()
            .returning(|_, _, _, _| Err(TtsError::Synthesis("boom".into())));
        let mut loader = MockLoader::new();
        loader.expect_load().return_once(move || Ok(Box::new(backend)));
        let engine = EngineHandle::new(Box::new(loader), 24_000);

        assert!(engine.synthesize("Bad.", &voice(), "en-us").is_err());
        assert!(engine.is_loaded());
    }

    #[test]
    fn test_load_failure_propagates() {
        let mut loader = MockLoader::new();
        loader
            .expect_load()
            .returning(|| Err(TtsError::Load("no model".into())));
        let engine = EngineHandle::new(Box::new(loader), 24_000);

        assert!(matches!(
            engine.synthesize("Hi.", &voice(), "en-us"),
            Err(TtsError::Load(_))
        ));
        assert!(!engine.is_loaded());
    }

    #[test]
    fn test_rate_mismatch_is_not_an_error() {
        let mut loader = MockLoader::new();
        loader
            .expect_load()
            .returning(|| Ok(Box::new(echo_backend(22_050))));
        let engine = EngineHandle::new(Box::new(loader), 24_000);

        let clip = engine.synthesize("Hi.", &voice(), "en-us").unwrap();
        assert_eq!(clip.sample_rate, 22_050);
    }
}
