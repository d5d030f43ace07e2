// Rescale - Duration-preserving integer scaling of moment durations

/// Divide every duration by `speed`, rounding so that the results always
/// sum to `round(total / speed)`.
///
/// Each step is the rounded difference of floating cumulative positions.
/// The leftover rounding error is then removed one unit at a time, walking
/// the array in reverse: surplus is taken from durations longer than 1,
/// a deficit is added to the last duration.
pub fn rescale_durations(durations: &[i64], speed: f64) -> Vec<i64> {
    if durations.is_empty() {
        return Vec::new();
    }

    let total: i64 = durations.iter().sum();
    let target = (total as f64 / speed).round() as i64;

    let mut scaled = Vec::with_capacity(durations.len());
    let mut previous = 0.0;
    let mut cumulative = 0.0;
    for &duration in durations {
        cumulative += duration as f64 / speed;
        scaled.push((cumulative.round() - previous) as i64);
        previous = cumulative.round();
    }

    let excess = scaled.iter().sum::<i64>() - target;
    correct_rounding(&mut scaled, excess);
    scaled
}

fn correct_rounding(durations: &mut [i64], mut excess: i64) {
    let last = durations.len() - 1;
    while excess != 0 {
        let mut changed = false;
        for i in (0..durations.len()).rev() {
            if excess > 0 && durations[i] > 1 {
                durations[i] -= 1;
                excess -= 1;
                changed = true;
            } else if excess < 0 {
                durations[last] += 1;
                excess += 1;
                changed = true;
            }
            if excess == 0 {
                break;
            }
        }
        if !changed {
            // Only durations of 0 or 1 remain: let ones drop to zero
            for i in (0..durations.len()).rev() {
                if excess > 0 && durations[i] > 0 {
                    durations[i] -= 1;
                    excess -= 1;
                }
            }
            if excess != 0 {
                break;
            }
        }
    }
}

/// Map each point of an ascending position list onto its rescaled
/// counterpart. The first point stays where it is.
pub fn rescale_positions(positions: &[i64], speed: f64) -> Vec<i64> {
    let Some(&first) = positions.first() else {
        return Vec::new();
    };
    let durations: Vec<i64> = positions.windows(2).map(|w| w[1] - w[0]).collect();

    let mut result = Vec::with_capacity(positions.len());
    result.push(first);
    let mut position = first;
    for step in rescale_durations(&durations, speed) {
        position += step;
        result.push(position);
    }
    result
}
