// THEORY:
// Several tracks can describe the same physical event: jitter in the detected
// region, or the tracker's many-match policy, leaves duplicates whose boxes
// sit on top of each other. The overlap resolver keeps one track per
// conflicting pair.
//
// Every unordered pair (i, j), i before j in id order, is tested once. When
// their last bounding rects intersect, the pair member with the strictly
// shorter span (`end_frame - start_frame`) is marked; on a tie the later track
// is marked. Marked tracks still take part in later comparisons and removal
// happens once at the end. This is a greedy heuristic, not an optimal
// independent-set selection.

use crate::core_modules::tracker::Track;

/// One flag per track, set when the track loses at least one pairwise conflict.
pub fn conflicting_tracks(tracks: &[Track]) -> Vec<bool> {
    let mut marked = vec![false; tracks.len()];
    for i in 0..tracks.len() {
        for j in (i + 1)..tracks.len() {
            let (first, second) = (&tracks[i], &tracks[j]);
            if !first.last_rect.overlaps(&second.last_rect) {
                continue;
            }
            if first.span() >= second.span() {
                marked[j] = true;
            } else {
                marked[i] = true;
            }
        }
    }
    marked
}

/// Removes every track that lost a pairwise overlap conflict, preserving order.
pub fn remove_overlapping(tracks: Vec<Track>) -> Vec<Track> {
    let marked = conflicting_tracks(&tracks);
    let removed = marked.iter().filter(|&&m| m).count();
    if removed > 0 {
        tracing::debug!("overlap resolution removed {removed} of {} tracks", tracks.len());
    }
    tracks
        .into_iter()
        .zip(marked)
        .filter_map(|(track, marked)| (!marked).then_some(track))
        .collect()
}
