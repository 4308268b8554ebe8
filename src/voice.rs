//! Voice selection, including the scheduled silent-mode window.

use crate::config_loader::KokoroSettings;
use crate::error::ConfigError;
use chrono::{Local, NaiveTime};

/// The voice and speed to synthesize one sentence with.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceSelection {
    pub voice: String,
    pub speed: f32,
}

/// A daily `[start, end]` window. Both ends are inclusive and the window may
/// wrap past midnight when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SilentSchedule {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl SilentSchedule {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Returns `Ok(None)` when silent mode is off or the range is not a
    /// two-element list; malformed times are an error.
    pub fn from_settings(settings: &KokoroSettings) -> Result<Option<Self>, ConfigError> {
        if !settings.silent_mode {
            return Ok(None);
        }
        let [start, end] = settings.silent_time_range.as_slice() else {
            return Ok(None);
        };
        Ok(Some(Self::new(parse_hhmm(start)?, parse_hhmm(end)?)))
    }

    pub fn contains(&self, now: NaiveTime) -> bool {
        if self.start <= self.end {
            self.start <= now && now <= self.end
        } else {
            now >= self.start || now <= self.end
        }
    }
}

fn parse_hhmm(value: &str) -> Result<NaiveTime, ConfigError> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").map_err(|e| {
        ConfigError::Invalid(format!(
            "kokoro.silent_time_range entry '{value}' is not HH:MM: {e}"
        ))
    })
}

/// Picks between the default and silent voice. Built once from the settings;
/// the choice itself is made again for every sentence.
#[derive(Debug, Clone)]
pub struct VoiceSelector {
    default: VoiceSelection,
    silent: Option<(SilentSchedule, VoiceSelection)>,
}

impl VoiceSelector {
    pub fn from_settings(settings: &KokoroSettings) -> Result<Self, ConfigError> {
        let silent = SilentSchedule::from_settings(settings)?.map(|schedule| {
            (
                schedule,
                VoiceSelection {
                    voice: settings.silent_voice.clone(),
                    speed: settings.silent_mode_speed,
                },
            )
        });
        Ok(Self {
            default: VoiceSelection {
                voice: settings.voice.clone(),
                speed: settings.speed,
            },
            silent,
        })
    }

    pub fn select_at(&self, now: NaiveTime) -> &VoiceSelection {
        match &self.silent {
            Some((schedule, selection)) if schedule.contains(now) => selection,
            _ => &self.default,
        }
    }

    /// Selection for the current local wall-clock time.
    pub fn select(&self) -> &VoiceSelection {
        self.select_at(Local::now().time())
    }
}
