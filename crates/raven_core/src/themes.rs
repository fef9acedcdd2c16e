//! crates/raven_core/src/themes.rs
//!
//! The fixed catalog of writing themes.

use crate::domain::Theme;

pub static THEMES: [Theme; 6] = [
    Theme {
        id: "love",
        name: "Love & Romance",
        description: "Explore the depths of human connection and affection",
        prompt: "Write about a moment when love surprised you...",
        color: "from-rose-500 to-pink-600",
    },
    Theme {
        id: "nature",
        name: "Nature & Seasons",
        description: "Find inspiration in the natural world around us",
        prompt: "Describe how a season makes you feel...",
        color: "from-green-500 to-emerald-600",
    },
    Theme {
        id: "loss",
        name: "Loss & Memory",
        description: "Process grief and cherish memories through verse",
        prompt: "Write about something you miss...",
        color: "from-slate-500 to-gray-600",
    },
    Theme {
        id: "dreams",
        name: "Dreams & Aspirations",
        description: "Capture your hopes and visions for the future",
        prompt: "What do you dream of becoming...",
        color: "from-purple-500 to-indigo-600",
    },
    Theme {
        id: "childhood",
        name: "Childhood & Nostalgia",
        description: "Revisit the innocence and wonder of youth",
        prompt: "Remember a childhood moment that shaped you...",
        color: "from-amber-500 to-orange-600",
    },
    Theme {
        id: "freedom",
        name: "Freedom & Adventure",
        description: "Celebrate independence and the spirit of exploration",
        prompt: "Write about a time you felt truly free...",
        color: "from-blue-500 to-cyan-600",
    },
];

pub fn find(id: &str) -> Option<&'static Theme> {
    THEMES.iter().find(|t| t.id == id)
}
