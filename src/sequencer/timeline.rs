// Timeline - Musical time representation
// Time signatures, tempo and the unit lengths both schedulers advance by

use std::fmt;
use std::str::FromStr;

/// Steps are always sixteenth notes: four per quarter-note beat
pub const STEPS_PER_BEAT: u32 = 4;

/// Time signatures offered by the grid editor
///
/// Serialized as its display form (`"4/4"`), which is also how stored
/// patterns and the config file spell it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TimeSignature {
    TwoFour,
    ThreeFour,
    #[default]
    FourFour,
    SixEight,
}

impl TimeSignature {
    /// Every supported signature, in menu order
    pub const ALL: [TimeSignature; 4] = [
        TimeSignature::TwoFour,
        TimeSignature::ThreeFour,
        TimeSignature::FourFour,
        TimeSignature::SixEight,
    ];

    /// Number of sixteenth-note steps in one grid measure
    ///
    /// A grid "measure" is one page of the editor, which spans two bars for
    /// 3/4, 4/4 and 6/8 and a single bar for 2/4.
    pub fn steps_per_measure(&self) -> usize {
        match self {
            TimeSignature::TwoFour => 16,
            TimeSignature::ThreeFour => 24,
            TimeSignature::FourFour => 32,
            TimeSignature::SixEight => 24,
        }
    }

    /// Metronome beats per bar (6/8 is counted in two)
    pub fn beats_per_measure(&self) -> usize {
        match self {
            TimeSignature::TwoFour => 2,
            TimeSignature::ThreeFour => 3,
            TimeSignature::FourFour => 4,
            TimeSignature::SixEight => 2,
        }
    }

    /// Numerator/denominator pair
    pub fn parts(&self) -> (u8, u8) {
        match self {
            TimeSignature::TwoFour => (2, 4),
            TimeSignature::ThreeFour => (3, 4),
            TimeSignature::FourFour => (4, 4),
            TimeSignature::SixEight => (6, 8),
        }
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (numerator, denominator) = self.parts();
        write!(f, "{}/{}", numerator, denominator)
    }
}

/// Error returned when parsing an unsupported time signature
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported time signature: {0}")]
pub struct ParseTimeSignatureError(pub String);

impl FromStr for TimeSignature {
    type Err = ParseTimeSignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "2/4" => Ok(TimeSignature::TwoFour),
            "3/4" => Ok(TimeSignature::ThreeFour),
            "4/4" => Ok(TimeSignature::FourFour),
            "6/8" => Ok(TimeSignature::SixEight),
            other => Err(ParseTimeSignatureError(other.to_string())),
        }
    }
}

impl TryFrom<String> for TimeSignature {
    type Error = ParseTimeSignatureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeSignature> for String {
    fn from(value: TimeSignature) -> Self {
        value.to_string()
    }
}

/// Tempo in whole BPM (Beats Per Minute)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Tempo {
    bpm: u32,
}

/// Error returned for a BPM outside [`Tempo::MIN_BPM`, `Tempo::MAX_BPM`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("BPM must be between 20 and 999, got {0}")]
pub struct InvalidTempo(pub u32);

impl Tempo {
    pub const MIN_BPM: u32 = 20;
    pub const MAX_BPM: u32 = 999;

    /// Creates a new tempo, rejecting values outside the supported range
    pub fn new(bpm: u32) -> Result<Self, InvalidTempo> {
        if (Self::MIN_BPM..=Self::MAX_BPM).contains(&bpm) {
            Ok(Self { bpm })
        } else {
            Err(InvalidTempo(bpm))
        }
    }

    /// Get BPM value
    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    /// Duration of one quarter-note beat in seconds
    pub fn seconds_per_beat(&self) -> f64 {
        60.0 / self.bpm as f64
    }

    /// Duration of one sixteenth-note step in seconds
    pub fn seconds_per_step(&self) -> f64 {
        self.seconds_per_beat() / STEPS_PER_BEAT as f64
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self { bpm: 120 }
    }
}

impl TryFrom<u32> for Tempo {
    type Error = InvalidTempo;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tempo> for u32 {
    fn from(value: Tempo) -> Self {
        value.bpm
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} BPM", self.bpm)
    }
}
