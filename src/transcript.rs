use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speaker {
    User,
    Model,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.pad("user"),
            Self::Model => f.pad("model"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptTurn {
    pub speaker: Speaker,
    pub text: String,
    pub complete: bool,
}

/// Builds per-speaker turns out of streamed transcript fragments.
///
/// Both speakers can be mid-turn at the same time, so each has its own
/// accumulator. A turn-complete boundary seals whichever of the two has
/// text and appends it to the history, user first.
#[derive(Debug, Default)]
pub struct SessionTranscript {
    user: String,
    model: String,
    history: Vec<TranscriptTurn>,
}

impl SessionTranscript {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, speaker: Speaker, fragment: &str) {
        self.buffer_mut(speaker).push_str(fragment);
    }

    /// Close the current turn window. Returns the turns appended to the
    /// history, which is empty when neither speaker produced text.
    pub fn seal(&mut self) -> Vec<TranscriptTurn> {
        let mut sealed = Vec::with_capacity(2);
        for speaker in [Speaker::User, Speaker::Model] {
            let text = std::mem::take(self.buffer_mut(speaker));
            if text.trim().is_empty() {
                continue;
            }
            let turn = TranscriptTurn {
                speaker,
                text,
                complete: true,
            };
            self.history.push(turn.clone());
            sealed.push(turn);
        }
        sealed
    }

    /// The in-flight turn for `speaker`, if any text has arrived yet.
    #[must_use]
    pub fn current_turn(&self, speaker: Speaker) -> Option<TranscriptTurn> {
        let text = self.buffer(speaker);
        if text.is_empty() {
            return None;
        }
        Some(TranscriptTurn {
            speaker,
            text: text.to_string(),
            complete: false,
        })
    }

    #[must_use]
    pub fn history(&self) -> &[TranscriptTurn] {
        &self.history
    }

    pub fn clear(&mut self) {
        self.user.clear();
        self.model.clear();
        self.history.clear();
    }

    fn buffer(&self, speaker: Speaker) -> &str {
        match speaker {
            Speaker::User => &self.user,
            Speaker::Model => &self.model,
        }
    }

    fn buffer_mut(&mut self, speaker: Speaker) -> &mut String {
        match speaker {
            Speaker::User => &mut self.user,
            Speaker::Model => &mut self.model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_seal_into_one_turn() {
        let mut transcript = SessionTranscript::new();
        transcript.append(Speaker::Model, "Hel");
        transcript.append(Speaker::Model, "lo");

        let sealed = transcript.seal();
        assert_eq!(sealed.len(), 1);
        assert_eq!(transcript.history().len(), 1);
        assert_eq!(transcript.history()[0].text, "Hello");
        assert!(transcript.history()[0].complete);
        assert!(transcript.current_turn(Speaker::Model).is_none());
    }

    #[test]
    fn both_speakers_seal_user_first() {
        let mut transcript = SessionTranscript::new();
        transcript.append(Speaker::Model, "Sure, ");
        transcript.append(Speaker::User, "Can you");
        transcript.append(Speaker::Model, "here it is.");
        transcript.append(Speaker::User, " help?");

        transcript.seal();
        let speakers: Vec<Speaker> = transcript.history().iter().map(|t| t.speaker).collect();
        assert_eq!(speakers, vec![Speaker::User, Speaker::Model]);
        assert_eq!(transcript.history()[0].text, "Can you help?");
        assert_eq!(transcript.history()[1].text, "Sure, here it is.");
    }

    #[test]
    fn empty_turns_are_not_recorded() {
        let mut transcript = SessionTranscript::new();
        assert!(transcript.seal().is_empty());

        transcript.append(Speaker::User, "  ");
        transcript.append(Speaker::Model, "ok");
        let sealed = transcript.seal();
        assert_eq!(sealed.len(), 1);
        assert_eq!(sealed[0].speaker, Speaker::Model);
        assert!(transcript.current_turn(Speaker::User).is_none());
    }

    #[test]
    fn current_turn_is_incomplete() {
        let mut transcript = SessionTranscript::new();
        transcript.append(Speaker::User, "wait");
        let turn = transcript
            .current_turn(Speaker::User)
            .unwrap_or_else(|| panic!("expected an in-flight turn"));
        assert_eq!(turn.text, "wait");
        assert!(!turn.complete);
        assert!(transcript.history().is_empty());
    }

    #[test]
    fn each_boundary_seals_once() {
        let mut transcript = SessionTranscript::new();
        transcript.append(Speaker::User, "one");
        transcript.seal();
        transcript.seal();
        transcript.append(Speaker::User, "two");
        transcript.seal();

        let texts: Vec<&str> = transcript.history().iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }
}
