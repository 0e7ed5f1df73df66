//! ContextWindowTrimmer: fits a turn history into a fixed character budget.
//!
//! The budget is counted in characters, a rough stand-in for tokens. The
//! synthesized system prompt is charged first; turns are then admitted from
//! newest to oldest until the next one would overflow. Admission stops at the
//! first overflow, so the kept turns are always a contiguous suffix. Finally,
//! leading non-user turns are dropped because the upstream requires the
//! conversation to open with the requesting party.

use toolrelay_core::{Role, Turn};

/// Default character budget, about 100k tokens at four characters a token.
pub const DEFAULT_MAX_CHARS: usize = 700_000;

/// The outcome of one trimming pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimmedContext {
    /// System pseudo-turn (when the prompt is non-empty) followed by the kept turns
    pub turns: Vec<Turn>,

    pub metadata: TrimMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrimMetadata {
    /// Prompt length plus every admitted turn, before leading turns were dropped
    pub used_chars: usize,
    pub budget: usize,
    /// Turns excluded because they no longer fit
    pub dropped_over_budget: usize,
    /// Admitted turns removed because they preceded the first user turn
    pub dropped_leading: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ContextWindowTrimmer {
    budget: usize,
}

impl ContextWindowTrimmer {
    pub fn new(budget: usize) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    /// Select the suffix of `turns` that fits alongside `system_prompt`.
    ///
    /// A turn longer than the remaining budget is dropped whole, never cut.
    pub fn trim(&self, system_prompt: &str, turns: Vec<Turn>) -> TrimmedContext {
        let total = turns.len();
        let mut used_chars = system_prompt.chars().count();

        let mut first_kept = total;
        for (index, turn) in turns.iter().enumerate().rev() {
            let len = turn.char_len();
            if used_chars + len > self.budget {
                break;
            }
            used_chars += len;
            first_kept = index;
        }

        let mut kept: Vec<Turn> = turns.into_iter().skip(first_kept).collect();
        let leading = kept.iter().take_while(|t| t.role != Role::User).count();
        kept.drain(..leading);

        if first_kept > 0 {
            tracing::debug!(
                dropped = first_kept,
                used_chars,
                budget = self.budget,
                "Context budget exceeded, older turns dropped"
            );
        }

        let mut out = Vec::with_capacity(kept.len() + 1);
        if !system_prompt.is_empty() {
            out.push(Turn::system(system_prompt));
        }
        out.extend(kept);

        TrimmedContext {
            turns: out,
            metadata: TrimMetadata {
                used_chars,
                budget: self.budget,
                dropped_over_budget: first_kept,
                dropped_leading: leading,
            },
        }
    }
}

impl Default for ContextWindowTrimmer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn content_turns(ctx: &TrimmedContext) -> Vec<&Turn> {
        ctx.turns.iter().filter(|t| t.role != Role::System).collect()
    }

    #[test]
    fn fitting_history_is_kept_whole_behind_prompt() {
        let turns = vec![
            Turn::user("hi"),
            Turn::assistant("hello"),
            Turn::user("how are you?"),
        ];
        let ctx = ContextWindowTrimmer::default().trim("You are helpful.", turns.clone());

        assert_eq!(ctx.turns.len(), turns.len() + 1);
        assert_eq!(ctx.turns[0], Turn::system("You are helpful."));
        assert_eq!(&ctx.turns[1..], &turns[..]);
        assert_eq!(ctx.metadata.dropped_over_budget, 0);
    }

    #[test]
    fn trimming_a_fitting_history_is_idempotent() {
        let turns = vec![Turn::user("a"), Turn::assistant("b"), Turn::user("c")];
        let trimmer = ContextWindowTrimmer::new(100);
        let once = trimmer.trim("", turns.clone());
        let twice = trimmer.trim("", once.turns.clone());
        assert_eq!(once.turns, turns);
        assert_eq!(twice.turns, once.turns);
    }

    #[test]
    fn leading_assistant_turn_is_dropped() {
        let turns = vec![Turn::assistant("I spoke first"), Turn::user("then me")];
        let ctx = ContextWindowTrimmer::default().trim("", turns);
        assert_eq!(ctx.turns, vec![Turn::user("then me")]);
        assert_eq!(ctx.metadata.dropped_leading, 1);
    }

    #[test]
    fn oversized_old_turn_is_dropped_and_newest_survives() {
        let turns = vec![
            Turn::user("x".repeat(800_000)),
            Turn::assistant("short reply"),
            Turn::user("final question"),
        ];
        let ctx = ContextWindowTrimmer::new(700_000).trim("", turns);

        assert!(ctx.turns.iter().all(|t| t.char_len() < 800_000));
        assert_eq!(ctx.turns.last(), Some(&Turn::user("final question")));
        assert_eq!(ctx.metadata.dropped_over_budget, 1);
    }

    #[test]
    fn prompt_is_charged_against_the_budget() {
        let trimmer = ContextWindowTrimmer::new(20);
        let fits = trimmer.trim("0123456789", vec![Turn::user("0123456789")]);
        assert_eq!(fits.turns.len(), 2);
        assert_eq!(fits.metadata.used_chars, 20);

        let overflows = trimmer.trim("0123456789a", vec![Turn::user("0123456789")]);
        assert_eq!(overflows.turns, vec![Turn::system("0123456789a")]);
    }

    #[test]
    fn boundary_turn_lengths() {
        let trimmer = ContextWindowTrimmer::new(50);
        let prompt = "p".repeat(10);

        let kept = trimmer.trim(&prompt, vec![Turn::user("u".repeat(39))]);
        assert_eq!(content_turns(&kept).len(), 1);

        let exact = trimmer.trim(&prompt, vec![Turn::user("u".repeat(40))]);
        assert_eq!(content_turns(&exact).len(), 1);

        let over = trimmer.trim(&prompt, vec![Turn::user("u".repeat(41))]);
        assert!(content_turns(&over).is_empty());
    }

    #[test]
    fn admission_stops_at_first_overflow() {
        // The oldest turn would fit on its own, but the one after it does not.
        let turns = vec![
            Turn::user("tiny"),
            Turn::assistant("y".repeat(30)),
            Turn::user("z".repeat(10)),
        ];
        let ctx = ContextWindowTrimmer::new(25).trim("", turns);
        assert_eq!(ctx.turns, vec![Turn::user("z".repeat(10))]);
    }

    #[test]
    fn kept_sequence_respects_budget_and_opens_with_user() {
        let turns: Vec<Turn> = (0..40)
            .map(|i| {
                let text = "w".repeat(7 * (i % 5) + 1);
                if i % 2 == 0 { Turn::user(text) } else { Turn::assistant(text) }
            })
            .collect();
        for budget in [0, 1, 10, 33, 64, 100, 250, 1_000] {
            let ctx = ContextWindowTrimmer::new(budget).trim("sys", turns.clone());
            let kept = content_turns(&ctx);
            let total: usize = kept.iter().map(|t| t.char_len()).sum::<usize>() + 3;
            assert!(kept.is_empty() || total <= budget, "budget {budget}");
            if let Some(first) = kept.first() {
                assert_eq!(first.role, Role::User, "budget {budget}");
            }
        }
    }

    #[test]
    fn empty_history_yields_prompt_only() {
        let ctx = ContextWindowTrimmer::default().trim("sys", vec![]);
        assert_eq!(ctx.turns, vec![Turn::system("sys")]);
        let nothing = ContextWindowTrimmer::default().trim("", vec![]);
        assert!(nothing.turns.is_empty());
    }

    #[test]
    fn lengths_are_counted_in_characters() {
        let ctx = ContextWindowTrimmer::new(3).trim("", vec![Turn::user("äöü")]);
        assert_eq!(ctx.turns.len(), 1);
    }
}
