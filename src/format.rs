//! Formatting helpers for human-readable byte sizes.

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * 1024.0;
const GIB: f64 = MIB * 1024.0;

/// Converts a decimal byte-count string into a K/M/G figure with two decimals.
///
/// aria2 and the drive providers report sizes and speeds as decimal strings,
/// so the input stays a string end to end. Values below 1024 pass through
/// unchanged (callers append a byte-unit suffix themselves); non-numeric input
/// also passes through unchanged since this is display-only data.
#[must_use]
pub fn readable_size(origin: &str) -> String {
    let Ok(n) = origin.trim().parse::<u64>() else {
        return origin.to_string();
    };
    #[allow(clippy::cast_precision_loss)]
    let n = n as f64;
    if n >= GIB {
        format!("{:.2}G", n / GIB)
    } else if n >= MIB {
        format!("{:.2}M", n / MIB)
    } else if n >= KIB {
        format!("{:.2}K", n / KIB)
    } else {
        origin.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn readable_size_units() {
        assert_eq!(readable_size("512"), "512");
        assert_eq!(readable_size("1536"), "1.50K");
        assert_eq!(readable_size("1048576"), "1.00M");
        assert_eq!(readable_size("2147483648"), "2.00G");
    }

    #[test]
    fn readable_size_boundary_ties_take_larger_unit() {
        assert_eq!(readable_size("1024"), "1.00K");
        assert_eq!(readable_size("1048576"), "1.00M");
        assert_eq!(readable_size("1073741824"), "1.00G");
    }

    #[test]
    fn readable_size_below_threshold_passes_through() {
        assert_eq!(readable_size("0"), "0");
        assert_eq!(readable_size("1023"), "1023");
    }

    #[test]
    fn readable_size_non_numeric_passes_through() {
        assert_eq!(readable_size("n/a"), "n/a");
        assert_eq!(readable_size(""), "");
    }

    #[test]
    fn readable_size_two_decimals_once_suffixed() {
        for raw in ["1024", "999999", "123456789", "98765432100"] {
            let out = readable_size(raw);
            if let Some(stripped) = out
                .strip_suffix('K')
                .or_else(|| out.strip_suffix('M'))
                .or_else(|| out.strip_suffix('G'))
            {
                let (_, frac) = stripped.split_once('.').expect("decimal point");
                assert_eq!(frac.len(), 2, "expected two decimals in {out}");
            }
        }
    }

    #[test]
    fn readable_size_bucket_is_monotonic() {
        let bucket = |s: &str| match readable_size(s).chars().last() {
            Some('G') => 3,
            Some('M') => 2,
            Some('K') => 1,
            _ => 0,
        };
        let samples = ["12", "1024", "524288", "1048576", "805306368", "1073741824"];
        for pair in samples.windows(2) {
            assert!(bucket(pair[0]) <= bucket(pair[1]));
        }
    }
}
