//! Heuristic completion estimation.
//!
//! Pure function blending elapsed time with repository activity. The weights
//! are tunable policy constants; the only hard requirements are that the
//! estimate is bounded by [`MAX_ESTIMATE`] and monotonically non-decreasing
//! in every input. 100 is reserved for confirmed completion and is only ever
//! written by the orchestrator.

use taskforge_core::EffortBucket;

use crate::worktree::RepoActivity;

/// Ceiling for heuristic estimates.
pub const MAX_ESTIMATE: u8 = 95;

/// Ceiling for the time-based component on its own.
const TIME_COMPONENT_CAP: f64 = 90.0;

/// Per-commit contribution, saturating at 100.
const COMMIT_STEP: f64 = 10.0;

/// Per-changed-file contribution, saturating at 100.
const FILE_STEP: f64 = 5.0;

/// Blend weights. Must sum to 1.0.
const WEIGHT_TIME: f64 = 0.30;
const WEIGHT_COMMITS: f64 = 0.40;
const WEIGHT_FILES: f64 = 0.30;

/// Expected wall-clock seconds for an effort bucket.
pub const fn expected_secs(effort: EffortBucket) -> u64 {
    match effort {
        EffortBucket::Xs => 30 * 60,
        EffortBucket::S => 60 * 60,
        EffortBucket::M => 2 * 60 * 60,
        EffortBucket::L => 4 * 60 * 60,
        EffortBucket::Xl => 8 * 60 * 60,
        EffortBucket::Xxl => 16 * 60 * 60,
    }
}

/// Estimate completion percentage for an in-progress task.
///
/// Without activity data (git unavailable, base branch missing) the estimate
/// degrades to the time component alone.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn estimate(
    elapsed_secs: u64,
    effort: EffortBucket,
    activity: Option<RepoActivity>,
) -> u8 {
    let expected = expected_secs(effort) as f64;
    let time_pct = ((elapsed_secs as f64 / expected) * 100.0).min(TIME_COMPONENT_CAP);

    let blended = activity.map_or(time_pct, |a| {
        let commit_pct = (a.commits as f64 * COMMIT_STEP).min(100.0);
        let file_pct = (a.files_changed as f64 * FILE_STEP).min(100.0);
        WEIGHT_TIME.mul_add(
            time_pct,
            WEIGHT_COMMITS.mul_add(commit_pct, WEIGHT_FILES * file_pct),
        )
    });

    (blended.min(f64::from(MAX_ESTIMATE))) as u8
}
