/// Sample-size planning
///
/// Picks the power-of-two factor the decoder should shrink by. The decoder
/// is told to shrink aggressively, but never so far that either dimension
/// falls below the displayed cell size; the small up-scale at render time is
/// cheaper than the memory of a full-size decode.

use tracing::warn;

use crate::error::PlanError;

/// Largest power-of-two factor that keeps both decoded dimensions at least
/// `target` pixels.
///
/// Returns 1 when the halved source already fits inside `target`.
pub fn plan_checked(original_width: u32, original_height: u32, target: u32) -> Result<u32, PlanError> {
    if target == 0 {
        return Err(PlanError::ZeroTarget);
    }

    let half_width = original_width / 2;
    let half_height = original_height / 2;

    let mut factor: u32 = 1;
    while (half_height / factor) >= target && (half_width / factor) >= target {
        factor *= 2;
    }
    Ok(factor)
}

/// Lenient `plan_checked`: an invalid target means no downsampling
pub fn plan(original_width: u32, original_height: u32, target: u32) -> u32 {
    match plan_checked(original_width, original_height, target) {
        Ok(factor) => factor,
        Err(err) => {
            warn!(original_width, original_height, "{}, decoding at full size", err);
            1
        }
    }
}
