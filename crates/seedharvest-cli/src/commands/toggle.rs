use std::env::VarError;

use seedharvest_core::{DEFAULT_TOGGLE_VAR, parse_toggle_value};

pub fn run(var: Option<&str>) {
    let var = var.unwrap_or(DEFAULT_TOGGLE_VAR);
    let raw = std::env::var(var);
    match &raw {
        Ok(value) => println!("{var}={value}"),
        Err(VarError::NotPresent) => println!("{var} is not set"),
        Err(VarError::NotUnicode(v)) => println!(
            "{var}={} is not valid UTF-8, treated as unset",
            v.to_string_lossy()
        ),
    }

    if toggle_enabled(&raw) {
        println!("Hardware counters: enabled (fallback PRNG not used)");
    } else {
        println!("Hardware counters: disabled (fallback PRNG runs instead)");
    }
}

/// Same decision the library toggle makes for an environment lookup.
fn toggle_enabled(raw: &Result<String, VarError>) -> bool {
    raw.as_deref().is_ok_and(parse_toggle_value)
}
