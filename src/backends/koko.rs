use super::{downmix, BackendLoader, SpeechBackend, Synthesized};
use crate::config_loader::{KokoroSettings, ModelPaths};
use crate::error::TtsError;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use wait_timeout::ChildExt;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Loads the `koko` backend: checks the model files and that the binary runs.
pub struct KokoLoader {
    binary: String,
    paths: ModelPaths,
    timeout: Duration,
}

impl KokoLoader {
    pub fn new(settings: &KokoroSettings, paths: &ModelPaths) -> Self {
        Self {
            binary: settings.koko_binary.clone(),
            paths: paths.clone(),
            timeout: Duration::from_secs(settings.synthesis_timeout),
        }
    }
}

impl BackendLoader for KokoLoader {
    fn load(&self) -> Result<Box<dyn SpeechBackend>, TtsError> {
        for path in [&self.paths.model, &self.paths.voices] {
            if !path.is_file() {
                return Err(TtsError::ModelNotFound(path.clone()));
            }
        }

        let mut child = Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TtsError::Load(format!("cannot run '{}': {}", self.binary, e)))?;

        match child.wait_timeout(PROBE_TIMEOUT)? {
            Some(status) if status.success() => {}
            Some(status) => {
                return Err(TtsError::Load(format!(
                    "'{} --version' exited with {}",
                    self.binary, status
                )))
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(TtsError::Load(format!("'{}' did not respond", self.binary)));
            }
        }

        tracing::info!(
            binary = %self.binary,
            model = %self.paths.model.display(),
            "koko backend ready"
        );

        Ok(Box::new(KokoBackend {
            binary: self.binary.clone(),
            model: self.paths.model.clone(),
            voices: self.paths.voices.clone(),
            timeout: self.timeout,
        }))
    }
}

/// Runs `koko text ...` once per sentence and decodes the WAV it writes.
pub struct KokoBackend {
    binary: String,
    model: PathBuf,
    voices: PathBuf,
    timeout: Duration,
}

impl SpeechBackend for KokoBackend {
    fn id(&self) -> &'static str {
        "koko"
    }

    fn synthesize(
        &mut self,
        text: &str,
        voice: &str,
        speed: f32,
        lang: &str,
    ) -> Result<Synthesized, TtsError> {
        let output = tempfile::Builder::new()
            .prefix("tts-service-")
            .suffix(".wav")
            .tempfile()?;
        // Read back only when koko fails.
        let mut stderr = tempfile::tempfile()?;

        let mut child = Command::new(&self.binary)
            .arg("-m")
            .arg(&self.model)
            .arg("-d")
            .arg(&self.voices)
            .arg("-l")
            .arg(lang)
            .arg("-s")
            .arg(voice)
            .arg("-p")
            .arg(speed.to_string())
            .arg("--mono")
            .arg("true")
            .arg("text")
            .arg(text)
            .arg("-o")
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr.try_clone()?))
            .spawn()?;

        match child.wait_timeout(self.timeout)? {
            Some(status) if status.success() => decode_wav(output.path()),
            Some(status) => {
                let mut message = String::new();
                stderr.rewind()?;
                stderr.read_to_string(&mut message)?;
                Err(TtsError::Synthesis(format!(
                    "koko exited with {}: {}",
                    status,
                    message.trim()
                )))
            }
            None => {
                let _ = child.kill();
                let _ = child.wait();
                Err(TtsError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

/// Reads a WAV file into mono `f32` samples.
pub(crate) fn decode_wav(path: &Path) -> Result<Synthesized, TtsError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => {
            let scale = int_scale(spec.bits_per_sample)?;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(Synthesized {
        samples: downmix(samples, spec.channels),
        sample_rate: spec.sample_rate,
    })
}

/// Factor mapping signed integer samples of `bits` width onto [-1, 1).
fn int_scale(bits: u16) -> Result<f32, TtsError> {
    if !(1..=32).contains(&bits) {
        return Err(TtsError::Synthesis(format!(
            "unsupported WAV bit depth {bits}"
        )));
    }
    Ok(1.0 / (1_i64 << (bits - 1)) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn write_wav(path: &Path, spec: hound::WavSpec, samples: &[i16]) {
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample(*s).unwrap();
        }
        writer.finalize().unwrap();
    }

    fn int_spec(channels: u16) -> hound::WavSpec {
        hound::WavSpec {
            channels,
            sample_rate: 24_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    /// A stand-in for `koko` that copies `fixture` to whatever follows `-o`.
    fn fake_koko(dir: &Path, fixture: &Path) -> PathBuf {
        let script = dir.join("fake-koko");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nout=\"\"\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"-o\" ]; then out=\"$2\"; fi\n  shift\ndone\n[ -z \"$out\" ] && exit 0\ncp '{}' \"$out\"\n",
                fixture.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn model_files(dir: &Path) -> ModelPaths {
        let model = dir.join("kokoro.onnx");
        let voices = dir.join("voices.bin");
        std::fs::write(&model, b"model").unwrap();
        std::fs::write(&voices, b"voices").unwrap();
        ModelPaths { model, voices }
    }

    #[test]
    fn test_decode_int_wav_scales_to_unit_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, int_spec(1), &[0, 16384, -32768]);

        let audio = decode_wav(&path).unwrap();
        assert_eq!(audio.sample_rate, 24_000);
        assert_eq!(audio.samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn test_int_scale_rejects_bad_bit_depths() {
        assert_eq!(int_scale(16).unwrap(), 1.0 / 32768.0);
        assert_eq!(int_scale(8).unwrap(), 1.0 / 128.0);
        assert!(int_scale(32).is_ok());
        assert!(matches!(int_scale(0), Err(TtsError::Synthesis(_))));
        assert!(matches!(int_scale(33), Err(TtsError::Synthesis(_))));
    }

    #[test]
    fn test_decode_stereo_wav_is_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.wav");
        write_wav(&path, int_spec(2), &[16384, 16384, 0, -32768]);

        let audio = decode_wav(&path).unwrap();
        assert_eq!(audio.samples, vec![0.5, -0.5]);
    }

    #[test]
    fn test_load_requires_model_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = ModelPaths {
            model: dir.path().join("missing.onnx"),
            voices: dir.path().join("missing.bin"),
        };
        let loader = KokoLoader::new(&KokoroSettings::default(), &paths);
        assert!(matches!(loader.load(), Err(TtsError::ModelNotFound(_))));
    }

    #[test]
    fn test_load_reports_missing_binary() {
        let dir = tempfile::tempdir().unwrap();
        let settings = KokoroSettings {
            koko_binary: dir.path().join("no-such-koko").display().to_string(),
            ..KokoroSettings::default()
        };
        let loader = KokoLoader::new(&settings, &model_files(dir.path()));
        assert!(matches!(loader.load(), Err(TtsError::Load(_))));
    }

    #[test]
    fn test_synthesize_through_fake_binary() {
        let dir = tempfile::tempdir().unwrap();
        let fixture = dir.path().join("fixture.wav");
        write_wav(&fixture, int_spec(1), &[0, 16384, 16384, 0]);

        let settings = KokoroSettings {
            koko_binary: fake_koko(dir.path(), &fixture).display().to_string(),
            ..KokoroSettings::default()
        };
        let loader = KokoLoader::new(&settings, &model_files(dir.path()));
        let mut backend = loader.load().unwrap();
        assert_eq!(backend.id(), "koko");

        let audio = backend
            .synthesize("Hello there.", "af_sarah", 1.0, "en-us")
            .unwrap();
        assert_eq!(audio.samples, vec![0.0, 0.5, 0.5, 0.0]);
        assert_eq!(audio.sample_rate, 24_000);
    }
}
