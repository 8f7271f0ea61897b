//! crates/loyalty_core/src/progress.rs
//!
//! The punch-card engine: a pure, deterministic view of where a customer
//! stands in the current reward cycle.

use std::num::NonZeroU32;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{ProgressSnapshot, Reward, Visit};

/// The threshold of the standard program. Badges only exist for this target.
pub const CANONICAL_TARGET: u32 = 10;

/// Visits per reward cycle. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressTarget(NonZeroU32);

impl ProgressTarget {
    pub fn new(target: u32) -> Option<Self> {
        NonZeroU32::new(target).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }
}

impl Default for ProgressTarget {
    fn default() -> Self {
        Self(NonZeroU32::MIN.saturating_add(CANONICAL_TARGET - 1))
    }
}

/// Position inside the current cycle. A completed cycle reads as `target`, not 0.
pub fn cycle_position(count: u32, target: ProgressTarget) -> u32 {
    let target = target.get();
    match (count, count % target) {
        (0, _) => 0,
        (_, 0) => target,
        (_, rest) => rest,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Badges {
    pub half_way: bool,
    pub full_reward: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PunchCell {
    pub filled: bool,
    pub visit_id: Option<String>,
    pub visited_at: Option<DateTime<Utc>>,
}

impl PunchCell {
    fn empty() -> Self {
        Self {
            filled: false,
            visit_id: None,
            visited_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub count: u32,
    pub target: u32,
    pub cycle_position: u32,
    pub to_next_reward: u32,
    pub full_cycle_just_completed: bool,
    pub pending: bool,
    /// `None` when the program does not use the canonical target.
    pub badges: Option<Badges>,
    pub cells: Vec<PunchCell>,
}

impl ProgressView {
    /// Derives the view from the complete visit history.
    pub fn compute(visits: &[Visit], target: ProgressTarget) -> Self {
        let mut ordered: Vec<&Visit> = visits.iter().collect();
        ordered.sort_by_key(|v| v.visited_at);

        let size = target.get() as usize;
        let window = &ordered[ordered.len().saturating_sub(size)..];
        let mut cells: Vec<PunchCell> = window
            .iter()
            .map(|v| PunchCell {
                filled: true,
                visit_id: Some(v.id.clone()),
                visited_at: Some(v.visited_at),
            })
            .collect();
        cells.resize(size, PunchCell::empty());

        let count = u32::try_from(visits.len()).unwrap_or(u32::MAX);
        Self::assemble(count, target, cells)
    }

    /// Builds the view from a backend snapshot, which carries no visit details.
    /// A snapshot with a zero target falls back to `fallback`.
    pub fn from_snapshot(snapshot: &ProgressSnapshot, fallback: ProgressTarget) -> Self {
        let target = ProgressTarget::new(snapshot.target).unwrap_or(fallback);
        let size = target.get() as usize;
        let filled = snapshot.count.min(target.get()) as usize;
        let cells = (0..size)
            .map(|i| PunchCell {
                filled: i < filled,
                ..PunchCell::empty()
            })
            .collect();

        let view = Self::assemble(snapshot.count, target, cells);
        Self {
            to_next_reward: snapshot.to_next_reward.unwrap_or(view.to_next_reward),
            pending: snapshot.pending.unwrap_or(false),
            ..view
        }
    }

    /// Marks the view as having an unredeemed reward if any reward is pending.
    pub fn with_rewards(self, rewards: &[Reward]) -> Self {
        Self {
            pending: self.pending || rewards.iter().any(Reward::is_pending),
            ..self
        }
    }

    fn assemble(count: u32, target: ProgressTarget, cells: Vec<PunchCell>) -> Self {
        let position = cycle_position(count, target);
        let t = target.get();
        let badges = (t == CANONICAL_TARGET).then(|| Badges {
            half_way: position >= t / 2,
            full_reward: position >= t,
        });

        Self {
            count,
            target: t,
            cycle_position: position,
            to_next_reward: t - count % t,
            full_cycle_just_completed: count > 0 && count % t == 0,
            pending: false,
            badges,
            cells,
        }
    }
}
