//! Small UI helpers: human-readable sizes, truncation.

pub fn human(b: u64) -> String {
    const K: f64 = 1024.0;
    let b = b as f64;
    if b < K { return format!("{b:.0}B"); }
    let kb = b / K;
    if kb < K { return format!("{kb:.1}KB"); }
    let mb = kb / K;
    if mb < K { return format!("{mb:.1}MB"); }
    let gb = mb / K;
    if gb < K { return format!("{gb:.1}GB"); }
    let tb = gb / K;
    format!("{tb:.2}TB")
}

// Counts chars, not bytes, so task names with multibyte chars never split.
pub fn truncate_middle(s: &str, max: usize) -> String {
    let len = s.chars().count();
    if len <= max { return s.to_string(); }
    if max <= 3 { return "...".into(); }
    let keep = max - 3;
    let left = keep / 2;
    let right = keep - left;
    let head: String = s.chars().take(left).collect();
    let tail: String = s.chars().skip(len - right).collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_units() {
        assert_eq!(human(512), "512B");
        assert_eq!(human(2048), "2.0KB");
        assert_eq!(human(5 * 1024 * 1024), "5.0MB");
    }

    #[test]
    fn truncate_keeps_both_ends() {
        assert_eq!(truncate_middle("short", 10), "short");
        assert_eq!(truncate_middle("abcdefghij", 7), "ab...ij");
        assert_eq!(truncate_middle("ääääääää", 5), "ä...ä");
    }
}
