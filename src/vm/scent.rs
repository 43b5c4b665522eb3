//! Scent reaction state
//!
//! Workers react to 8 scent channels (`A`-`H`). Each channel carries a
//! signed priority set by `SWP`. The weight of a neighbouring tile is the
//! integer dot product of its scent levels with the priorities; `SRT`
//! turns towards the open neighbour with the highest weight.
//!
//! Ties prefer the current heading, then right, up, left, down.

use super::register::Heading;
use super::SCENT_CHANNELS;
use serde::{Deserialize, Serialize};

/// Scent levels of one tile, one byte per channel
pub type ScentLevels = [u8; SCENT_CHANNELS];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScentState {
    /// Reaction priority per channel
    pub priorities: [i8; SCENT_CHANNELS],
    /// Channel laid down after each successful move
    pub write_channel: Option<u8>,
    /// Cached neighbour scents, indexed by heading
    pub neighbors: [ScentLevels; 4],
    /// Result of the last `SRT`
    pub preferred: Option<Heading>,
}

impl ScentState {
    pub fn set_priority(&mut self, channel: u8, priority: i8) {
        self.priorities[channel as usize % SCENT_CHANNELS] = priority;
    }

    pub fn set_write_channel(&mut self, channel: Option<u8>) {
        self.write_channel = channel.map(|c| c % SCENT_CHANNELS as u8);
    }

    /// Weighted scent of the neighbour in `heading`
    pub fn weight(&self, heading: Heading) -> i32 {
        self.neighbors[heading.index()]
            .iter()
            .zip(self.priorities.iter())
            .map(|(&level, &priority)| level as i32 * priority as i32)
            .sum()
    }

    /// Pick the best open heading and remember it
    pub fn preferred_heading(&mut self, open: &[bool; 4], current: Heading) -> Option<Heading> {
        let candidates = std::iter::once(current).chain(Heading::ALL);

        let mut best: Option<(Heading, i32)> = None;
        for heading in candidates {
            if !open[heading.index()] {
                continue;
            }
            let weight = self.weight(heading);
            match best {
                Some((_, w)) if w >= weight => {}
                _ => best = Some((heading, weight)),
            }
        }

        self.preferred = best.map(|(heading, _)| heading);
        self.preferred
    }
}

/// Parse a channel letter `A`-`H` (case-insensitive)
pub fn parse_channel(token: &str) -> Option<u8> {
    let mut chars = token.chars();
    let c = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() || !('A'..='H').contains(&c) {
        return None;
    }
    Some(c as u8 - b'A')
}

/// Channel letter for index 0-7
pub fn channel_name(channel: u8) -> char {
    (b'A' + (channel % SCENT_CHANNELS as u8)) as char
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(neighbors: [ScentLevels; 4]) -> ScentState {
        ScentState {
            neighbors,
            ..Default::default()
        }
    }

    #[test]
    fn test_weight_dot_product() {
        let mut state = state_with([[2, 3, 0, 0, 0, 0, 0, 0]; 4]);
        state.set_priority(0, 5);
        state.set_priority(1, -1);
        assert_eq!(state.weight(Heading::Up), 2 * 5 - 3);
    }

    #[test]
    fn test_prefers_strongest_open() {
        let mut neighbors = [[0u8; 8]; 4];
        neighbors[Heading::Left.index()][2] = 10;
        neighbors[Heading::Down.index()][2] = 50;
        let mut state = state_with(neighbors);
        state.set_priority(2, 1);

        let open = [true, true, true, true];
        assert_eq!(state.preferred_heading(&open, Heading::Right), Some(Heading::Down));

        // Strongest tile blocked
        let open = [true, true, true, false];
        assert_eq!(state.preferred_heading(&open, Heading::Right), Some(Heading::Left));
        assert_eq!(state.preferred, Some(Heading::Left));
    }

    #[test]
    fn test_ties_keep_current_heading() {
        let mut state = ScentState::default();
        let open = [true, true, true, true];
        assert_eq!(state.preferred_heading(&open, Heading::Left), Some(Heading::Left));

        let open = [true, true, false, true];
        assert_eq!(state.preferred_heading(&open, Heading::Left), Some(Heading::Right));
    }

    #[test]
    fn test_nothing_open() {
        let mut state = ScentState::default();
        assert_eq!(state.preferred_heading(&[false; 4], Heading::Up), None);
        assert_eq!(state.preferred, None);
    }

    #[test]
    fn test_channel_names() {
        assert_eq!(parse_channel("a"), Some(0));
        assert_eq!(parse_channel("H"), Some(7));
        assert_eq!(parse_channel("I"), None);
        assert_eq!(parse_channel("AB"), None);
        assert_eq!(parse_channel(""), None);
        assert_eq!(channel_name(3), 'D');
    }
}
