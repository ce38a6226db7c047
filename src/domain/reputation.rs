//! Reputation update rule.
//!
//! Reputation is read as the prior probability (scaled by 1000) that a user
//! sorts correctly. Each verified disposal applies one Bayesian update with
//! fixed likelihoods, then the move is damped so that a single verdict never
//! shifts the value by more than [`MAX_STEP`] points.

pub const MIN_REPUTATION: i32 = 5;
pub const MAX_REPUTATION: i32 = 1000;
pub const DEFAULT_REPUTATION: i32 = 300;

/// Largest undamped move of a single update.
pub const MAX_STEP: f64 = 20.0;

/// P(disposal looks right | reliable user).
const P_RIGHT_RELIABLE: f64 = 0.6;
/// P(disposal looks right | unreliable user).
const P_RIGHT_UNRELIABLE: f64 = 0.3;

const SCALE: f64 = 1000.0;

/// Compute the reputation after one verified disposal.
///
/// `rolling_count` and `ceiling` implement the volume guard: correct
/// disposals beyond the weekly ceiling do not raise reputation.
pub fn evaluate(
    reputation: i32,
    is_correct: bool,
    rolling_count: u32,
    ceiling: u32,
) -> i32 {
    let current = reputation.clamp(0, MAX_REPUTATION);

    if is_correct && rolling_count > ceiling {
        return current.max(MIN_REPUTATION);
    }

    let prior = f64::from(current) / SCALE;
    let (reliable, unreliable) = if is_correct {
        (P_RIGHT_RELIABLE, P_RIGHT_UNRELIABLE)
    } else {
        (1.0 - P_RIGHT_RELIABLE, 1.0 - P_RIGHT_UNRELIABLE)
    };

    let evidence = reliable * prior + unreliable * (1.0 - prior);
    let posterior = (reliable * prior / evidence * SCALE).clamp(1.0, 999.0);

    let raw = posterior - f64::from(current);
    let step = if raw > MAX_STEP {
        MAX_STEP * (SCALE - f64::from(current)) / SCALE
    } else if raw < -MAX_STEP {
        -MAX_STEP * f64::from(current) / SCALE
    } else {
        raw
    };

    (current + step.round() as i32).clamp(MIN_REPUTATION, MAX_REPUTATION)
}
