use serde::{Deserialize, Serialize};

/// One of the two alternating timer modes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Focus,
    Break,
}

impl Phase {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Focus => "focus",
            Self::Break => "break",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            Self::Focus => Self::Break,
            Self::Break => Self::Focus,
        }
    }

    /// Title and body announced when this phase runs out.
    pub fn completion_message(&self) -> (&'static str, &'static str) {
        match self {
            Self::Focus => ("Break Time! ☕", "Time for a short break."),
            Self::Break => ("Back to Work! 🎯", "Let's focus on your next session."),
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_str())
    }
}
