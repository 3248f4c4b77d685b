//! Garbling of text frames.
//!
//! Feeds a session frames a misbehaving server or a broken proxy might
//! produce. Seeded, so a failing run can be replayed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Damage applied to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Garble {
    /// Cut the frame short.
    Truncate,
    /// Replace one character with a random printable one.
    CorruptChar,
    /// Drop a structural character (`{`, `}`, `[`, `]`, `"`, `:` or `,`).
    DropStructure,
    /// Leave the frame alone.
    None,
}

/// Random frame garbler.
///
/// # Example
///
/// ```
/// use tether_test_support::chaos::FrameChaos;
///
/// let mut chaos = FrameChaos::seeded(7).with_probability(1.0);
/// let garbled = chaos.garble(r#"{"topic":"room:1","event":"x","payload":{}}"#);
/// assert_eq!(chaos.events_triggered(), 1);
/// # let _ = garbled;
/// ```
pub struct FrameChaos {
    probability: f64,
    rng: StdRng,
    events_triggered: usize,
}

impl FrameChaos {
    pub fn seeded(seed: u64) -> Self {
        Self {
            probability: 0.0,
            rng: StdRng::seed_from_u64(seed),
            events_triggered: 0,
        }
    }

    /// Chance in `0.0..=1.0` that a frame is damaged.
    pub fn with_probability(mut self, probability: f64) -> Self {
        self.probability = probability;
        self
    }

    pub fn decide(&mut self) -> Garble {
        if self.rng.gen::<f64>() >= self.probability {
            return Garble::None;
        }
        self.events_triggered += 1;
        match self.rng.gen_range(0..3) {
            0 => Garble::Truncate,
            1 => Garble::CorruptChar,
            _ => Garble::DropStructure,
        }
    }

    /// Return `frame`, possibly damaged.
    pub fn garble(&mut self, frame: &str) -> String {
        let decision = self.decide();
        apply(decision, frame, &mut self.rng)
    }

    pub fn events_triggered(&self) -> usize {
        self.events_triggered
    }
}

/// Apply `garble` to `frame`.
pub fn apply(garble: Garble, frame: &str, rng: &mut impl Rng) -> String {
    let chars: Vec<char> = frame.chars().collect();
    if chars.is_empty() {
        return String::new();
    }

    match garble {
        Garble::Truncate => {
            let len = rng.gen_range(0..chars.len());
            chars[..len].iter().collect()
        }
        Garble::CorruptChar => {
            let mut chars = chars;
            let pos = rng.gen_range(0..chars.len());
            chars[pos] = rng.gen_range(b'!'..=b'~') as char;
            chars.into_iter().collect()
        }
        Garble::DropStructure => {
            let structural: Vec<usize> = chars
                .iter()
                .enumerate()
                .filter(|(_, c)| matches!(c, '{' | '}' | '[' | ']' | '"' | ':' | ','))
                .map(|(i, _)| i)
                .collect();
            if structural.is_empty() {
                return frame.to_string();
            }
            let skip = structural[rng.gen_range(0..structural.len())];
            chars
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, c)| *c)
                .collect()
        }
        Garble::None => frame.to_string(),
    }
}
