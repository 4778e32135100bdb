//! Waveform corroboration for points without depth agreement.
//!
//! A queued point survives if any of its other-line neighbours shows a rising
//! edge of its own close to the point's bottom bin. The first supporting
//! neighbour settles the question.

use std::ops::Range;

use crate::config::{CorroborationScope, FilterConfig};
use crate::core::sounding::{Channel, SoundingPoint, NARROW_LEN, SURFACE_GUARD_BIN};

/// Window `[max(20, bin - width), min(len - 1, bin + width))` scanned on a
/// neighbour's channel.
pub fn scan_window(bin: usize, search_width: usize, len: usize) -> Range<usize> {
    let start = bin.saturating_sub(search_width).max(SURFACE_GUARD_BIN);
    let end = bin.saturating_add(search_width).min(len.saturating_sub(1));
    start..end
}

/// True if the samples inside `window` rise `threshold` times without an
/// intervening fall. Flat steps neither count nor reset.
pub fn rise_reaches(samples: &[u8], window: Range<usize>, threshold: usize) -> bool {
    let mut rise = 0;
    for j in window {
        let step = samples[j] as i32 - samples[j - 1] as i32;
        if step > 0 {
            rise += 1;
        } else if step < 0 {
            rise = 0;
        }

        if rise >= threshold {
            return true;
        }
    }
    false
}

fn channel_supports(neighbor: &SoundingPoint, channel: Channel, bin: usize, config: &FilterConfig) -> bool {
    let samples = neighbor.waveform.samples(channel);
    let window = scan_window(bin, config.search_width, samples.len());
    rise_reaches(samples, window, config.rise_threshold)
}

/// True if `neighbor` shows a rising edge near `bin` on the scanned channel(s).
pub fn neighbor_supports(neighbor: &SoundingPoint, channel: Channel, bin: usize, config: &FilterConfig) -> bool {
    match config.corroboration_scope {
        CorroborationScope::Selected => channel_supports(neighbor, channel, bin, config),
        CorroborationScope::Both => {
            let narrow_start = scan_window(bin, config.search_width, NARROW_LEN).start;
            (narrow_start < NARROW_LEN - SURFACE_GUARD_BIN
                && channel_supports(neighbor, Channel::Narrow, bin, config))
                || channel_supports(neighbor, Channel::Wide, bin, config)
        }
    }
}

/// Decide whether any neighbour supports `point`'s bottom detection.
///
/// Bins inside the surface zone cannot be corroborated.
pub fn corroborate<'a, I>(point: &SoundingPoint, neighbors: I, config: &FilterConfig) -> bool
where
    I: IntoIterator<Item = &'a SoundingPoint>,
{
    let bin = point.bottom_bin();
    if bin < SURFACE_GUARD_BIN {
        return false;
    }

    neighbors
        .into_iter()
        .any(|neighbor| neighbor_supports(neighbor, point.channel, bin, config))
}
