//! Process-wide switch for the hardware-counter source.
//!
//! The switch comes from one environment variable, read at most once. The
//! answer is stored in a single-assignment cell, so concurrent first callers
//! either compute it or wait for whoever does, and all of them see the same
//! value.

use std::sync::OnceLock;

/// Default environment variable consulted by [`FeatureToggle::from_env`].
pub const DEFAULT_TOGGLE_VAR: &str = "USE_HARDWARE_COUNTERS";

type Lookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lazily resolved boolean gate.
pub struct FeatureToggle {
    var: String,
    lookup: Lookup,
    resolved: OnceLock<bool>,
}

impl FeatureToggle {
    /// Toggle backed by the process environment. A value that is not
    /// valid UTF-8 counts as unset.
    pub fn from_env(var: impl Into<String>) -> Self {
        Self::with_lookup(var, |name| std::env::var(name).ok())
    }

    /// Toggle backed by a custom variable reader.
    pub fn with_lookup<F>(var: impl Into<String>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            var: var.into(),
            lookup: Box::new(lookup),
            resolved: OnceLock::new(),
        }
    }

    /// Toggle resolved up front. Never reads the environment.
    pub fn preset(enabled: bool) -> Self {
        let toggle = Self::with_lookup(DEFAULT_TOGGLE_VAR, |_| None);
        let _ = toggle.resolved.set(enabled);
        toggle
    }

    /// Resolve on first call, then return the cached answer.
    pub fn resolve(&self) -> bool {
        *self.resolved.get_or_init(|| {
            let raw = (self.lookup)(&self.var);
            let enabled = raw.as_deref().is_some_and(parse_toggle_value);
            log::debug!("{} = {:?} -> hardware counters {}", self.var, raw, enabled);
            enabled
        })
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    pub fn var_name(&self) -> &str {
        &self.var
    }
}

impl std::fmt::Debug for FeatureToggle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureToggle")
            .field("var", &self.var)
            .field("resolved", &self.resolved.get())
            .finish()
    }
}

/// `T`/`Y`/`O` (any case) as the first character means on. Anything else is
/// read as a leading decimal integer, C `atoi` style, and is on when `> 0`.
pub fn parse_toggle_value(value: &str) -> bool {
    match value.chars().next() {
        Some('T' | 't' | 'Y' | 'y' | 'O' | 'o') => true,
        _ => leading_int(value) > 0,
    }
}

fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let mut n: i64 = 0;
    for b in digits.bytes().take_while(u8::is_ascii_digit) {
        n = n.saturating_mul(10).saturating_add(i64::from(b - b'0'));
    }
    if negative { -n } else { n }
}
