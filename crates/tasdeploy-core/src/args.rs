//! Helpers for editing container command-line argument lists
//!
//! All setters are idempotent: applying the same flag twice leaves the list
//! exactly as applying it once. A flag matches both its bare form (`--flag`)
//! and its valued form (`--flag=value`).

fn matches_flag(arg: &str, flag: &str) -> bool {
    arg == flag
        || arg
            .strip_prefix(flag)
            .is_some_and(|rest| rest.starts_with('='))
}

/// Whether `flag` appears in `args`, bare or with a value
pub fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| matches_flag(a, flag))
}

/// Value of `--flag=value`, if present
pub fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter().find_map(|a| {
        a.strip_prefix(flag)
            .and_then(|rest| rest.strip_prefix('='))
    })
}

/// Append a boolean flag unless it is already present
pub fn set_flag(args: &mut Vec<String>, flag: &str) {
    if !has_flag(args, flag) {
        args.push(flag.to_string());
    }
}

/// Set `--flag=value`, replacing any previous occurrence in place
pub fn set_flag_value(args: &mut Vec<String>, flag: &str, value: &str) {
    let rendered = format!("{}={}", flag, value);
    match args.iter().position(|a| matches_flag(a, flag)) {
        Some(idx) => {
            args[idx] = rendered;
            // drop later duplicates so the flag appears exactly once
            let mut seen = 0usize;
            args.retain(|a| {
                if matches_flag(a, flag) {
                    seen += 1;
                    seen == 1
                } else {
                    true
                }
            });
        }
        None => args.push(rendered),
    }
}

/// Remove every occurrence of `flag`
pub fn unset_flag(args: &mut Vec<String>, flag: &str) {
    args.retain(|a| !matches_flag(a, flag));
}

/// Enable or disable a boolean flag
pub fn toggle_flag(args: &mut Vec<String>, flag: &str, enabled: bool) {
    if enabled {
        set_flag(args, flag);
    } else {
        unset_flag(args, flag);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_set_flag_is_idempotent() {
        let mut once = args(&["--v=2"]);
        set_flag(&mut once, "--pods-fingerprint");

        let mut twice = once.clone();
        set_flag(&mut twice, "--pods-fingerprint");

        assert_eq!(once, twice);
        assert_eq!(once, args(&["--v=2", "--pods-fingerprint"]));
    }

    #[test]
    fn test_set_flag_respects_valued_form() {
        let mut a = args(&["--pods-fingerprint=true"]);
        set_flag(&mut a, "--pods-fingerprint");
        assert_eq!(a, args(&["--pods-fingerprint=true"]));
    }

    #[test]
    fn test_prefix_is_not_a_match() {
        let a = args(&["--verbose"]);
        assert!(!has_flag(&a, "--v"));
        assert!(has_flag(&a, "--verbose"));
    }

    #[test]
    fn test_set_flag_value_replaces_in_place() {
        let mut a = args(&["--a", "--v=1", "--b", "--v=5"]);
        set_flag_value(&mut a, "--v", "4");
        assert_eq!(a, args(&["--a", "--v=4", "--b"]));

        let snapshot = a.clone();
        set_flag_value(&mut a, "--v", "4");
        assert_eq!(a, snapshot);
    }

    #[test]
    fn test_set_flag_value_appends_when_missing() {
        let mut a = args(&["--a"]);
        set_flag_value(&mut a, "-sleep-interval", "60s");
        insta::assert_snapshot!(a.join(" "), @"--a -sleep-interval=60s");
    }

    #[test]
    fn test_flag_value() {
        let a = args(&["--notify-file=/run/rte/notify", "--x"]);
        assert_eq!(flag_value(&a, "--notify-file"), Some("/run/rte/notify"));
        assert_eq!(flag_value(&a, "--x"), None);
        assert_eq!(flag_value(&a, "--missing"), None);
    }

    #[test]
    fn test_toggle_flag() {
        let mut a = args(&["--pods-fingerprint", "--x"]);
        toggle_flag(&mut a, "--pods-fingerprint", false);
        assert_eq!(a, args(&["--x"]));
        toggle_flag(&mut a, "--pods-fingerprint", true);
        toggle_flag(&mut a, "--pods-fingerprint", true);
        assert_eq!(a, args(&["--x", "--pods-fingerprint"]));
    }
}
