use std::cmp::Ordering;

/// Order two Debian version strings (`[epoch:]upstream[-revision]`) the way
/// dpkg does.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let (left_epoch, left_upstream, left_revision) = split_version(left);
    let (right_epoch, right_upstream, right_revision) = split_version(right);
    left_epoch
        .cmp(&right_epoch)
        .then_with(|| compare_fragment(left_upstream, right_upstream))
        .then_with(|| compare_fragment(left_revision, right_revision))
}

fn split_version(version: &str) -> (u64, &str, &str) {
    let (epoch, rest) = match version.split_once(':') {
        Some((epoch, rest)) if epoch.bytes().all(|byte| byte.is_ascii_digit()) => {
            (epoch.parse().unwrap_or(0), rest)
        }
        _ => (0, version),
    };
    match rest.rsplit_once('-') {
        Some((upstream, revision)) => (epoch, upstream, revision),
        None => (epoch, rest, ""),
    }
}

fn char_weight(byte: Option<u8>) -> i32 {
    match byte {
        None => 0,
        Some(b'~') => -1,
        Some(byte) if byte.is_ascii_digit() => 0,
        Some(byte) if byte.is_ascii_alphabetic() => i32::from(byte),
        Some(byte) => i32::from(byte) + 256,
    }
}

fn compare_fragment(left: &str, right: &str) -> Ordering {
    let (mut left, mut right) = (left.as_bytes(), right.as_bytes());
    while !left.is_empty() || !right.is_empty() {
        while left.first().is_some_and(|byte| !byte.is_ascii_digit())
            || right.first().is_some_and(|byte| !byte.is_ascii_digit())
        {
            let ordering =
                char_weight(left.first().copied()).cmp(&char_weight(right.first().copied()));
            if ordering != Ordering::Equal {
                return ordering;
            }
            left = left.get(1..).unwrap_or_default();
            right = right.get(1..).unwrap_or_default();
        }

        let left_digits = digit_run(left);
        let right_digits = digit_run(right);
        let ordering = compare_numbers(&left[..left_digits], &right[..right_digits]);
        if ordering != Ordering::Equal {
            return ordering;
        }
        left = &left[left_digits..];
        right = &right[right_digits..];
    }
    Ordering::Equal
}

fn digit_run(bytes: &[u8]) -> usize {
    bytes.iter().take_while(|byte| byte.is_ascii_digit()).count()
}

fn compare_numbers(left: &[u8], right: &[u8]) -> Ordering {
    let trim = |digits: &[u8]| -> usize { digits.iter().take_while(|byte| **byte == b'0').count() };
    let left = &left[trim(left)..];
    let right = &right[trim(right)..];
    left.len().cmp(&right.len()).then_with(|| left.cmp(right))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_runs_compare_by_value() {
        assert_eq!(compare_versions("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare_versions("1.010", "1.10"), Ordering::Equal);
        assert_eq!(compare_versions("2.0", "10.0"), Ordering::Less);
    }

    #[test]
    fn tilde_sorts_before_release() {
        assert_eq!(compare_versions("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(compare_versions("1.0~rc1", "1.0~rc2"), Ordering::Less);
    }

    #[test]
    fn epoch_dominates_upstream() {
        assert_eq!(compare_versions("1:0.9", "2.0"), Ordering::Greater);
        assert_eq!(compare_versions("0:2.0", "2.0"), Ordering::Equal);
    }

    #[test]
    fn revision_breaks_ties() {
        assert_eq!(compare_versions("1.2-3", "1.2-10"), Ordering::Less);
        assert_eq!(compare_versions("1.2-1", "1.2"), Ordering::Greater);
    }

    #[test]
    fn letters_sort_before_punctuation() {
        assert_eq!(compare_versions("1.0a", "1.0+"), Ordering::Less);
    }
}
