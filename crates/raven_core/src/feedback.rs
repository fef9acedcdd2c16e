//! crates/raven_core/src/feedback.rs
//!
//! Heuristic critique of a poem: a handful of text features mapped to a score
//! and canned remarks, with the closing paragraph drawn at random from a tier.

use std::sync::{Mutex, OnceLock};
use async_trait::async_trait;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use regex::Regex;
use crate::domain::{Feedback, Poem};
use crate::ports::{FeedbackService, PortError, PortResult};

const BASE_SCORE: i64 = 5;

const METAPHOR_INDICATORS: [&str; 11] = [
    "like", "as", "is", "was", "becomes", "transformed", "resembles", "mirrors", "echoes",
    "whispers", "dances",
];

const NATURE_WORDS: [&str; 3] = ["seasons", "trees", "wind"];

fn whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn non_word() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9_]").expect("static regex"))
}

/// Features the score is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Features {
    pub words: usize,
    pub lines: usize,
    pub rhyme: bool,
    pub metaphor: bool,
    pub nature_imagery: bool,
}

impl Features {
    pub fn extract(poem: &Poem) -> Self {
        let content = poem.content.as_str();
        let lowered = content.to_lowercase();
        Self {
            words: whitespace().split(content).count(),
            lines: content.split('\n').count(),
            rhyme: has_rhyme(content),
            metaphor: METAPHOR_INDICATORS.iter().any(|w| lowered.contains(w)),
            nature_imagery: poem.theme.to_lowercase().contains("nature")
                && NATURE_WORDS.iter().any(|w| lowered.contains(w)),
        }
    }
}

/// Two line-ending words longer than two characters sharing their last two characters.
fn has_rhyme(content: &str) -> bool {
    let endings: Vec<String> = content
        .split('\n')
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| line.split_whitespace().last())
        .map(|word| non_word().replace_all(&word.to_lowercase(), "").into_owned())
        .collect();
    if endings.len() < 2 {
        return false;
    }

    let tails: Vec<Option<String>> = endings
        .iter()
        .map(|w| {
            let chars: Vec<char> = w.chars().collect();
            (chars.len() > 2).then(|| chars[chars.len() - 2..].iter().collect())
        })
        .collect();

    for i in 0..tails.len() {
        for j in i + 1..tails.len() {
            if let (Some(a), Some(b)) = (&tails[i], &tails[j]) {
                if a == b {
                    return true;
                }
            }
        }
    }
    false
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    pub fn for_score(score: u8) -> Self {
        if score >= 8 {
            Tier::High
        } else if score >= 6 {
            Tier::Medium
        } else {
            Tier::Low
        }
    }

    fn templates(self, theme: &str) -> [String; 3] {
        match self {
            Tier::High => [
                format!("This is a beautifully crafted poem that effectively captures the essence of {theme}. Your imagery is vivid and your emotional connection to the subject shines through."),
                format!("Excellent work! Your poem demonstrates strong technical skill and genuine artistic expression. The theme of {theme} is explored with depth and creativity."),
                format!("This poem shows sophisticated use of language and poetic devices. You've created something truly moving that resonates with the {theme} theme."),
            ],
            Tier::Medium => [
                format!("A solid poem with good potential. Your exploration of {theme} shows promise, and with some refinement, this could become even more powerful."),
                format!("This poem has several strong moments and shows your understanding of the {theme} theme. Focus on strengthening the imagery and rhythm for greater impact."),
                format!("You've created a meaningful piece that touches on {theme} effectively. Consider working on the flow and adding more sensory details to enhance the reader's experience."),
            ],
            Tier::Low => [
                format!("This is a good starting point for exploring {theme}. Poetry is a craft that improves with practice, so keep writing and experimenting with different techniques."),
                format!("You've taken the first important step in expressing your thoughts about {theme}. Focus on developing your unique voice and don't be afraid to take creative risks."),
                format!("Every poet starts somewhere, and this poem shows your willingness to engage with the theme of {theme}. Keep writing regularly and study poems you admire."),
            ],
        }
    }
}

/// Scores a poem and writes its critique. The only nondeterminism is which
/// closing paragraph `rng` picks.
pub fn analyze<R: Rng + ?Sized>(poem: &Poem, rng: &mut R) -> Feedback {
    let features = Features::extract(poem);
    let mut score = BASE_SCORE;
    let mut strengths = Vec::new();
    let mut suggestions = Vec::new();

    if features.words > 50 {
        score += 1;
        strengths.push("Rich vocabulary and detailed imagery".to_string());
    } else if features.words < 20 {
        suggestions.push("Consider expanding with more descriptive language".to_string());
    }

    if features.lines > 8 {
        score += 1;
        strengths.push("Well-structured with multiple stanzas".to_string());
    } else {
        suggestions.push("Try experimenting with different stanza structures".to_string());
    }

    if features.rhyme {
        score += 1;
        strengths.push("Effective use of rhyme scheme".to_string());
    } else {
        suggestions.push("Consider adding some rhyming elements or internal rhyme".to_string());
    }

    if features.metaphor {
        score += 1;
        strengths.push("Creative use of metaphorical language".to_string());
    } else {
        suggestions.push("Try incorporating metaphors or similes for deeper imagery".to_string());
    }

    if features.nature_imagery {
        score += 1;
        strengths.push("Vivid natural imagery that connects with the theme".to_string());
    }

    let score = Feedback::clamp_score(score);
    let templates = Tier::for_score(score).templates(&poem.theme.to_lowercase());
    let overall = templates
        .choose(rng)
        .cloned()
        .unwrap_or_default();

    Feedback {
        score,
        strengths,
        suggestions,
        overall,
    }
}

//=========================================================================================
// `FeedbackService` Implementation
//=========================================================================================

/// The local critic, backed by a seedable random source.
pub struct HeuristicFeedback {
    rng: Mutex<StdRng>,
}

impl HeuristicFeedback {
    /// A fixed seed makes every critique reproducible.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

#[async_trait]
impl FeedbackService for HeuristicFeedback {
    async fn critique(&self, poem: &Poem) -> PortResult<Feedback> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| PortError::Unexpected("feedback rng poisoned".to_string()))?;
        Ok(analyze(poem, &mut *rng))
    }
}
