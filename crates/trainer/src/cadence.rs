//! "Every N epochs" triggers. Pure functions of the epoch index so a resumed
//! run fires on exactly the same epochs as an uninterrupted one.

/// True when the epoch at 0-based index `epoch` is the last of a block of
/// `freq` epochs.
pub fn is_due(epoch: u32, freq: u32) -> bool {
    freq > 0 && (u64::from(epoch) + 1) % u64::from(freq) == 0
}

/// Indices in `start..end` on which a trigger with `freq` fires.
pub fn due_epochs(start: u32, end: u32, freq: u32) -> impl Iterator<Item = u32> {
    (start..end).filter(move |&epoch| is_due(epoch, freq))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_on_block_ends() {
        let fired: Vec<u32> = due_epochs(0, 12, 5).collect();
        assert_eq!(fired, vec![4, 9]);
        assert!(due_epochs(0, 3, 1).eq(0..3));
    }

    #[test]
    fn resumed_ranges_fire_on_the_same_epochs() {
        let whole: Vec<u32> = due_epochs(0, 20, 3).collect();
        let mut split: Vec<u32> = due_epochs(0, 7, 3).collect();
        split.extend(due_epochs(7, 20, 3));
        assert_eq!(whole, split);
    }

    #[test]
    fn zero_frequency_never_fires() {
        assert!(!is_due(0, 0));
        assert!(is_due(u32::MAX, 1));
    }
}
